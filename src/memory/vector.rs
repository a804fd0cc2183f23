//! Flat Embedding Store
//!
//! Append-only list of embedded texts with FIFO eviction at capacity,
//! linear cosine search and atomic JSON persistence.
//!
//! Every mutation runs evict-check, embed, append and persist under one
//! lock, so the file on disk is always a complete snapshot and insertion
//! order is well defined. Reads take the same lock.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::embedder::embed_or_none;
use super::entry::{Metadata, SearchHit, StoreEntry, StoreStats};
use super::similarity::{cosine_similarity, round_score};
use super::{EmbeddingProvider, MemoryError};
use crate::config::StoreConfig;
use crate::utils::{char_len, truncate_owned};

/// Upper bound on results per search
pub const MAX_TOP_K: usize = 50;

#[derive(Serialize)]
struct PersistedRef<'a> {
    entries: &'a VecDeque<StoreEntry>,
    count: usize,
}

#[derive(Deserialize)]
struct Persisted {
    entries: Vec<StoreEntry>,
}

pub struct VectorStore {
    config: StoreConfig,
    embedder: Arc<dyn EmbeddingProvider>,
    entries: Mutex<VecDeque<StoreEntry>>,
}

impl VectorStore {
    /// Open the store at `config.path`, loading any prior state.
    ///
    /// A missing, unreadable or malformed file yields an empty store.
    /// A capacity of zero is raised to one.
    pub async fn open(mut config: StoreConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        if config.max_entries == 0 {
            warn!("Vector store capacity of 0 is unusable, using 1");
            config.max_entries = 1;
        }
        let entries = Self::load(&config).await;
        Self {
            config,
            embedder,
            entries: Mutex::new(entries),
        }
    }

    async fn load(config: &StoreConfig) -> VecDeque<StoreEntry> {
        let bytes = match fs::read(&config.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No vector store at {:?}, starting empty", config.path);
                return VecDeque::new();
            }
            Err(e) => {
                warn!("Failed to read vector store {:?}, starting empty: {}", config.path, e);
                return VecDeque::new();
            }
        };

        let persisted: Persisted = match serde_json::from_slice(&bytes) {
            Ok(p) => p,
            Err(e) => {
                warn!("Corrupt vector store {:?}, starting empty: {}", config.path, e);
                return VecDeque::new();
            }
        };

        let mut entries: VecDeque<StoreEntry> = persisted.entries.into();
        if entries.len() > config.max_entries {
            let excess = entries.len() - config.max_entries;
            warn!("Vector store holds {} entries over capacity, dropping oldest", excess);
            entries.drain(..excess);
        }
        info!("Loaded {} entries from {:?}", entries.len(), config.path);
        entries
    }

    /// Embed and store `text`, returning the new entry id.
    ///
    /// Blank text and provider failures are rejected without touching the
    /// store. At capacity the oldest entry is evicted first.
    pub async fn index(&self, text: &str, metadata: Metadata) -> Result<String, MemoryError> {
        if text.trim().is_empty() {
            return Err(MemoryError::EmptyText);
        }

        let stored = truncate_owned(text, self.config.max_text_chars);
        let mut entries = self.entries.lock().await;

        let embedding = embed_or_none(self.embedder.as_ref(), &stored, self.config.max_text_chars)
            .await
            .ok_or(MemoryError::EmbeddingUnavailable)?;

        let mut evicted = Vec::new();
        while entries.len() >= self.config.max_entries {
            match entries.pop_front() {
                Some(oldest) => evicted.push(oldest),
                None => break,
            }
        }
        if !evicted.is_empty() {
            warn!(
                "Vector store full ({} max), evicted {} oldest",
                self.config.max_entries,
                evicted.len()
            );
        }

        let timestamp = Utc::now();
        let id = StoreEntry::derive_id(text, &timestamp);
        entries.push_back(StoreEntry {
            id: id.clone(),
            text: stored,
            embedding,
            metadata,
            timestamp,
            text_length: char_len(text),
        });

        if let Err(e) = Self::write_snapshot(&self.config.path, &entries).await {
            error!("Failed to persist vector store, rolling back insert: {}", e);
            entries.pop_back();
            for entry in evicted.into_iter().rev() {
                entries.push_front(entry);
            }
            return Err(e);
        }

        debug!("Indexed entry {} ({} entries)", id, entries.len());
        Ok(id)
    }

    /// Rank stored entries against `query`, best first.
    ///
    /// `top_k` is clamped to `1..=50`. A provider failure yields no results.
    pub async fn search(&self, query: &str, top_k: usize) -> Vec<SearchHit> {
        let top_k = top_k.clamp(1, MAX_TOP_K);
        let Some(query_embedding) =
            embed_or_none(self.embedder.as_ref(), query, self.config.max_text_chars).await
        else {
            return Vec::new();
        };

        let entries = self.entries.lock().await;
        let mut hits: Vec<SearchHit> = entries
            .iter()
            .filter(|e| !e.embedding.is_empty())
            .map(|e| SearchHit {
                id: e.id.clone(),
                text: truncate_owned(&e.text, self.config.display_chars),
                score: round_score(cosine_similarity(&query_embedding, &e.embedding)),
                metadata: e.metadata.clone(),
                timestamp: e.timestamp,
            })
            .collect();
        drop(entries);

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(top_k);
        hits
    }

    pub async fn stats(&self) -> StoreStats {
        let entries = self.entries.lock().await;
        StoreStats {
            total_entries: entries.len(),
            max_entries: self.config.max_entries,
            embed_model: self.embedder.model_name().to_string(),
            store_path: self.config.path.clone(),
            total_text_chars: entries.iter().map(|e| e.text_length).sum(),
            oldest: entries.front().map(|e| e.timestamp),
            newest: entries.back().map(|e| e.timestamp),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Write the current entries to disk.
    pub async fn persist(&self) -> Result<(), MemoryError> {
        let entries = self.entries.lock().await;
        Self::write_snapshot(&self.config.path, &entries).await
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Serialize to `<path>.tmp`, then rename over `path`.
    async fn write_snapshot(
        path: &Path,
        entries: &VecDeque<StoreEntry>,
    ) -> Result<(), MemoryError> {
        let bytes = serde_json::to_vec(&PersistedRef {
            entries,
            count: entries.len(),
        })?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }

        let tmp_path = tmp_path_for(path);
        fs::write(&tmp_path, bytes).await?;
        fs::rename(&tmp_path, path).await?;
        Ok(())
    }
}

fn tmp_path_for(path: &Path) -> PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    PathBuf::from(tmp)
}
