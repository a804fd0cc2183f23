//! Memory System Module
//!
//! Semantic memory for agent output: a flat, capacity-bounded embedding
//! store with linear search, plus a per-session multi-resolution chunk
//! index searched by beam descent.

pub mod embedder;
pub mod engine;
pub mod entry;
pub mod error;
pub mod fractal;
pub mod similarity;
pub mod vector;

pub use embedder::OllamaEmbedder;
pub use engine::{IndexResponse, RejectReason, SearchResponse, SemanticMemory};
pub use entry::{Metadata, SearchHit, StoreEntry, StoreStats};
pub use error::MemoryError;
pub use fractal::{FractalHit, FractalMemory, FractalTree, IngestReport, TreeSummary};
pub use vector::VectorStore;

use anyhow::Result;
use async_trait::async_trait;

/// Source of embedding vectors.
///
/// Implementations may be slow or time out; callers inside this crate go
/// through [`embedder::embed_or_none`] so that a failure never escapes as an
/// error from the public store and index operations.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Name of the underlying model, reported in store statistics
    fn model_name(&self) -> &str;

    /// Embed a single text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}
