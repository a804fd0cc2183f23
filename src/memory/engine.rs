//! Semantic memory facade
//!
//! One store and one fractal index sharing an embedding provider, with the
//! result envelopes handed to collaborators. Constructed explicitly and
//! passed around; there is no process-wide instance.

use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

use super::entry::{Metadata, SearchHit, StoreStats};
use super::fractal::{FractalHit, FractalMemory, IngestReport, TreeSummary};
use super::vector::VectorStore;
use super::{EmbeddingProvider, MemoryError};
use crate::config::{FractalConfig, StoreConfig};

/// Why `store_index` refused a text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    EmptyText,
    EmbeddingUnavailable,
    Storage,
}

impl From<&MemoryError> for RejectReason {
    fn from(err: &MemoryError) -> Self {
        match err {
            MemoryError::EmptyText => RejectReason::EmptyText,
            MemoryError::EmbeddingUnavailable => RejectReason::EmbeddingUnavailable,
            MemoryError::Persist(_) | MemoryError::Serialize(_) => RejectReason::Storage,
        }
    }
}

/// Result of `store_index`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(untagged)]
pub enum IndexResponse {
    Indexed {
        id: String,
        status: String,
    },
    Rejected {
        error: String,
        #[serde(skip)]
        reason: RejectReason,
    },
}

impl IndexResponse {
    pub fn id(&self) -> Option<&str> {
        match self {
            IndexResponse::Indexed { id, .. } => Some(id),
            IndexResponse::Rejected { .. } => None,
        }
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            IndexResponse::Indexed { .. } => None,
            IndexResponse::Rejected { reason, .. } => Some(*reason),
        }
    }
}

impl From<Result<String, MemoryError>> for IndexResponse {
    fn from(result: Result<String, MemoryError>) -> Self {
        match result {
            Ok(id) => IndexResponse::Indexed {
                id,
                status: "indexed".to_string(),
            },
            Err(e) => IndexResponse::Rejected {
                reason: RejectReason::from(&e),
                error: e.to_string(),
            },
        }
    }
}

/// Result of `store_search`
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchResponse {
    pub results: Vec<SearchHit>,
    pub count: usize,
}

pub struct SemanticMemory {
    store: Arc<VectorStore>,
    fractal: Arc<FractalMemory>,
}

impl SemanticMemory {
    pub fn new(store: Arc<VectorStore>, fractal: Arc<FractalMemory>) -> Self {
        Self { store, fractal }
    }

    /// Open the store and create an empty fractal index over `embedder`.
    pub async fn open(
        store_config: StoreConfig,
        fractal_config: FractalConfig,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Self {
        let store = VectorStore::open(store_config, embedder.clone()).await;
        let fractal = FractalMemory::new(embedder, fractal_config);
        Self::new(Arc::new(store), Arc::new(fractal))
    }

    pub fn store(&self) -> &Arc<VectorStore> {
        &self.store
    }

    pub fn fractal(&self) -> &Arc<FractalMemory> {
        &self.fractal
    }

    pub async fn store_index(&self, text: &str, metadata: Metadata) -> IndexResponse {
        let result = self.store.index(text, metadata).await;
        if let Err(e) = &result {
            debug!("store_index rejected: {}", e);
        }
        result.into()
    }

    pub async fn store_search(&self, query: &str, top_k: usize) -> SearchResponse {
        let results = self.store.search(query, top_k).await;
        SearchResponse {
            count: results.len(),
            results,
        }
    }

    pub async fn store_stats(&self) -> StoreStats {
        self.store.stats().await
    }

    pub async fn fractal_ingest(&self, session_id: &str, text: &str) -> IngestReport {
        self.fractal.ingest(session_id, text).await
    }

    /// `top_k` defaults to the configured value when absent.
    pub async fn fractal_query(
        &self,
        session_id: &str,
        query: &str,
        top_k: Option<usize>,
    ) -> Vec<FractalHit> {
        let top_k = top_k.unwrap_or(self.fractal.config().top_k);
        self.fractal.query(session_id, query, top_k).await
    }

    pub async fn fractal_has_tree(&self, session_id: &str) -> bool {
        self.fractal.has_tree(session_id).await
    }

    pub async fn fractal_describe(&self, session_id: &str) -> Option<TreeSummary> {
        self.fractal.describe(session_id).await
    }
}
