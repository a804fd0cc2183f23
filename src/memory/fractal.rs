//! Fractal Index
//!
//! Multi-resolution chunk tree over one document per session. The text is
//! cut into overlapping windows of 987 characters, each window is re-cut
//! into 610-character windows, and so on down to 144-character leaves.
//! Only leaves are embedded; every internal node carries the centroid of
//! its children. Queries descend the tree with a fixed-width beam.
//!
//! Nodes live in an arena and refer to their children by index, so build,
//! embedding and search are all iterative.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::embedder::embed_or_none;
use super::similarity::{centroid, cosine_similarity, round_score};
use super::EmbeddingProvider;
use crate::config::FractalConfig;
use crate::utils::{char_len, truncate_owned};

/// Window size per level, outermost first
pub const WINDOW_SIZES: [usize; 5] = [987, 610, 377, 233, 144];
/// Overlap between consecutive windows per level
pub const WINDOW_OVERLAPS: [usize; 5] = [89, 61, 37, 23, 14];
pub const NUM_LEVELS: usize = WINDOW_SIZES.len();

/// Level of the synthetic node above the outermost windows
pub const ROOT_LEVEL: i8 = -1;

pub type NodeId = usize;

/// Sliding-window spans over `len` characters.
///
/// Windows advance by `size - overlap` (at least 1); the last window may be
/// shorter and ends exactly at `len`.
pub fn chunk_spans(len: usize, size: usize, overlap: usize) -> Vec<(usize, usize)> {
    let step = size.saturating_sub(overlap).max(1);
    let mut spans = Vec::new();
    let mut start = 0;
    while start < len {
        let end = (start + size).min(len);
        spans.push((start, end));
        if end >= len {
            break;
        }
        start += step;
    }
    spans
}

#[derive(Debug, Clone)]
pub struct FractalNode {
    /// 0..=4, or [`ROOT_LEVEL`]
    pub level: i8,
    /// Character offsets `[start, end)` into the ingested text
    pub start: usize,
    pub end: usize,
    pub text: String,
    /// Set on embedded leaves only
    pub embedding: Option<Vec<f32>>,
    /// Set on internal nodes with at least one embedded descendant
    pub centroid: Option<Vec<f32>>,
    pub children: Vec<NodeId>,
}

impl FractalNode {
    fn new(level: i8, start: usize, end: usize, text: String) -> Self {
        Self {
            level,
            start,
            end,
            text,
            embedding: None,
            centroid: None,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Vector used to score this node: its centroid, else its embedding.
    pub fn vector(&self) -> Option<&[f32]> {
        self.centroid.as_deref().or(self.embedding.as_deref())
    }
}

/// One ranked span returned by a fractal query
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FractalHit {
    pub text: String,
    pub score: f32,
    pub level: i8,
    pub start: usize,
    pub end: usize,
}

/// Shape of a session tree
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TreeSummary {
    pub total_nodes: usize,
    pub leaf_count: usize,
    pub embedded_leaves: usize,
    pub centroid_nodes: usize,
    pub text_length: usize,
    pub nodes_per_level: BTreeMap<i8, usize>,
}

/// Outcome of an ingest, tagged by `status`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum IngestReport {
    #[serde(rename_all = "camelCase")]
    Indexed {
        session_id: String,
        total_nodes: usize,
        leaf_count: usize,
        embeddings_generated: usize,
    },
    Error { message: String },
}

impl IngestReport {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IngestReport::Indexed { .. })
    }
}

#[derive(Debug, Clone)]
pub struct FractalTree {
    nodes: Vec<FractalNode>,
    root: NodeId,
}

impl FractalTree {
    /// Chunk `text` into a tree. Returns `None` for empty text.
    ///
    /// Text shorter than the smallest window becomes a single level-0 leaf.
    pub fn build(text: &str) -> Option<Self> {
        if text.is_empty() {
            return None;
        }

        // Byte offset of every char, plus the end of the string.
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let len = offsets.len() - 1;
        let slice = |start: usize, end: usize| text[offsets[start]..offsets[end]].to_string();

        if len < WINDOW_SIZES[NUM_LEVELS - 1] {
            return Some(Self {
                nodes: vec![FractalNode::new(0, 0, len, text.to_string())],
                root: 0,
            });
        }

        let mut nodes = vec![FractalNode::new(ROOT_LEVEL, 0, len, String::new())];
        // (parent, level of the parent's children)
        let mut pending: Vec<(NodeId, usize)> = vec![(0, 0)];

        while let Some((parent, level)) = pending.pop() {
            let (parent_start, parent_end) = (nodes[parent].start, nodes[parent].end);
            let spans = chunk_spans(
                parent_end - parent_start,
                WINDOW_SIZES[level],
                WINDOW_OVERLAPS[level],
            );

            let mut children = Vec::with_capacity(spans.len());
            for (s, e) in spans {
                let (start, end) = (parent_start + s, parent_start + e);
                let id = nodes.len();
                nodes.push(FractalNode::new(level as i8, start, end, slice(start, end)));
                children.push(id);
                if level + 1 < NUM_LEVELS {
                    pending.push((id, level + 1));
                }
            }
            nodes[parent].children = children;
        }

        Some(Self { nodes, root: 0 })
    }

    pub fn root(&self) -> &FractalNode {
        &self.nodes[self.root]
    }

    pub fn node(&self, id: NodeId) -> &FractalNode {
        &self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn leaves(&self) -> impl Iterator<Item = &FractalNode> {
        self.nodes.iter().filter(|n| n.is_leaf())
    }

    /// Node ids with every child listed before its parent.
    pub fn post_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![(self.root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            for &child in self.nodes[id].children.iter().rev() {
                stack.push((child, false));
            }
        }
        order
    }

    /// Embed the leaves and fill in centroids bottom-up.
    ///
    /// Leaves shorter than `config.min_leaf_chars` and leaves the provider
    /// fails on stay unembedded. Returns the number of embeddings generated.
    pub async fn embed(
        &mut self,
        provider: &dyn EmbeddingProvider,
        config: &FractalConfig,
    ) -> usize {
        let mut generated = 0;

        for id in self.post_order() {
            if self.nodes[id].is_leaf() {
                let text = &self.nodes[id].text;
                if char_len(text) < config.min_leaf_chars {
                    debug!("Skipping short leaf {}..{}", self.nodes[id].start, self.nodes[id].end);
                    continue;
                }
                let embedding = embed_or_none(provider, text, config.max_text_chars).await;
                if embedding.is_some() {
                    generated += 1;
                }
                self.nodes[id].embedding = embedding;
            } else {
                let nodes = &self.nodes;
                let mean = centroid(nodes[id].children.iter().filter_map(|&c| {
                    let child = &nodes[c];
                    child.embedding.as_deref().or(child.centroid.as_deref())
                }));
                self.nodes[id].centroid = mean;
            }
        }

        generated
    }

    fn score(&self, id: NodeId, query: &[f32]) -> f32 {
        self.nodes[id]
            .vector()
            .map(|v| cosine_similarity(query, v))
            .unwrap_or(0.0)
    }

    fn hit(&self, id: NodeId, score: f32, preview_chars: Option<usize>) -> FractalHit {
        let node = &self.nodes[id];
        let text = match preview_chars {
            Some(max) => truncate_owned(&node.text, max),
            None => node.text.clone(),
        };
        FractalHit {
            text,
            score: round_score(score),
            level: node.level,
            start: node.start,
            end: node.end,
        }
    }

    /// Beam-guided descent from the root's children.
    ///
    /// Each step keeps the `beam_width` best nodes; kept leaves become
    /// results and kept internal nodes expand into the next beam. Results
    /// are returned best first, at most `top_k`.
    pub fn beam_search(
        &self,
        query: &[f32],
        beam_width: usize,
        top_k: usize,
        preview_chars: usize,
    ) -> Vec<FractalHit> {
        let beam_width = beam_width.max(1);
        let root = self.root();

        if root.is_leaf() {
            let mut hits: Vec<FractalHit> = root
                .embedding
                .as_deref()
                .map(|e| vec![self.hit(self.root, cosine_similarity(query, e), None)])
                .unwrap_or_default();
            hits.truncate(top_k);
            return hits;
        }

        let mut results = Vec::new();
        let mut beam: Vec<NodeId> = root.children.clone();

        while !beam.is_empty() {
            let mut scored: Vec<(f32, NodeId)> =
                beam.iter().map(|&id| (self.score(id, query), id)).collect();
            scored.sort_by(|a, b| b.0.total_cmp(&a.0));
            scored.truncate(beam_width);

            let mut next_beam = Vec::new();
            for &(score, id) in &scored {
                let node = &self.nodes[id];
                if node.is_leaf() {
                    results.push(self.hit(id, score, None));
                } else {
                    next_beam.extend_from_slice(&node.children);
                }
            }

            if next_beam.is_empty() {
                for &(score, id) in &scored {
                    if !self.nodes[id].is_leaf() {
                        results.push(self.hit(id, score, Some(preview_chars)));
                    }
                }
                break;
            }
            beam = next_beam;
        }

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        results
    }

    pub fn summary(&self) -> TreeSummary {
        let mut nodes_per_level = BTreeMap::new();
        for node in &self.nodes {
            *nodes_per_level.entry(node.level).or_insert(0) += 1;
        }
        TreeSummary {
            total_nodes: self.nodes.len(),
            leaf_count: self.leaves().count(),
            embedded_leaves: self.leaves().filter(|n| n.embedding.is_some()).count(),
            centroid_nodes: self.nodes.iter().filter(|n| n.centroid.is_some()).count(),
            text_length: self.root().end,
            nodes_per_level,
        }
    }
}

/// Per-session fractal trees sharing one embedding provider.
///
/// Trees are built and embedded off to the side, then swapped in whole, so
/// a concurrent query sees either the previous tree or the new one. Ingests
/// for the same session run one at a time.
pub struct FractalMemory {
    embedder: Arc<dyn EmbeddingProvider>,
    config: FractalConfig,
    trees: RwLock<HashMap<String, Arc<FractalTree>>>,
    ingest_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl FractalMemory {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, config: FractalConfig) -> Self {
        Self {
            embedder,
            config,
            trees: RwLock::new(HashMap::new()),
            ingest_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &FractalConfig {
        &self.config
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.ingest_locks.lock().await;
        locks.entry(session_id.to_string()).or_default().clone()
    }

    /// Forget the session's lock once no other ingest holds or awaits it.
    async fn release_session_lock(&self, session_id: &str) {
        let mut locks = self.ingest_locks.lock().await;
        if locks.get(session_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(session_id);
        }
    }

    /// Build, embed and install the tree for `session_id`, replacing any
    /// previous one.
    pub async fn ingest(&self, session_id: &str, text: &str) -> IngestReport {
        let Some(mut tree) = FractalTree::build(text) else {
            return IngestReport::Error {
                message: "text is empty".to_string(),
            };
        };

        let lock = self.session_lock(session_id).await;
        let guard = lock.lock().await;

        let embeddings_generated = tree.embed(self.embedder.as_ref(), &self.config).await;
        let total_nodes = tree.len();
        let leaf_count = tree.leaves().count();

        self.trees
            .write()
            .await
            .insert(session_id.to_string(), Arc::new(tree));

        drop(guard);
        drop(lock);
        self.release_session_lock(session_id).await;

        info!(
            "Fractal ingest for session {}: {} nodes, {} leaves, {} embeddings",
            session_id, total_nodes, leaf_count, embeddings_generated
        );

        IngestReport::Indexed {
            session_id: session_id.to_string(),
            total_nodes,
            leaf_count,
            embeddings_generated,
        }
    }

    /// Rank spans of the session's tree against `query`.
    ///
    /// Unknown sessions and provider failures yield no results.
    pub async fn query(&self, session_id: &str, query: &str, top_k: usize) -> Vec<FractalHit> {
        let Some(tree) = self.tree(session_id).await else {
            return Vec::new();
        };

        let Some(query_embedding) =
            embed_or_none(self.embedder.as_ref(), query, self.config.max_text_chars).await
        else {
            return Vec::new();
        };

        tree.beam_search(
            &query_embedding,
            self.config.beam_width,
            top_k,
            self.config.preview_chars,
        )
    }

    pub async fn has_tree(&self, session_id: &str) -> bool {
        self.trees.read().await.contains_key(session_id)
    }

    pub async fn tree(&self, session_id: &str) -> Option<Arc<FractalTree>> {
        self.trees.read().await.get(session_id).cloned()
    }

    pub async fn describe(&self, session_id: &str) -> Option<TreeSummary> {
        self.tree(session_id).await.map(|t| t.summary())
    }

    pub async fn session_count(&self) -> usize {
        self.trees.read().await.len()
    }

    #[cfg(test)]
    async fn pending_lock_count(&self) -> usize {
        self.ingest_locks.lock().await.len()
    }
}
