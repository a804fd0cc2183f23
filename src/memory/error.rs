use thiserror::Error;

/// Reasons a store mutation is rejected.
///
/// None of these leave the store partially mutated.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("text is empty")]
    EmptyText,

    #[error("embedding provider returned no vector")]
    EmbeddingUnavailable,

    #[error("failed to persist store: {0}")]
    Persist(#[from] std::io::Error),

    #[error("failed to serialize store: {0}")]
    Serialize(#[from] serde_json::Error),
}
