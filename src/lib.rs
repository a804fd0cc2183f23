//! Semantic Memory Engine
//!
//! Vector memory for a multi-agent platform:
//! - Flat embedding store with FIFO capacity and atomic JSON persistence
//! - Fractal index: nested chunk windows with centroid summaries and beam search
//! - Pluggable embedding provider (Ollama over HTTP by default)
//! - Thin HTTP adapter for collaborators

pub mod config;
pub mod memory;
pub mod services;
pub mod utils;

// Re-exports for convenience
pub use memory::{EmbeddingProvider, FractalMemory, SemanticMemory, VectorStore};
