use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("No embedding backend available: {0}")]
    ProviderUnavailable(String),

    #[error("Vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Vector index is corrupt: {0}")]
    IndexCorrupt(String),

    #[error("Vector index has not been built")]
    IndexNotBuilt,

    #[error("Conversation storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl RagError {
    /// True when the failure is a transient backend outage worth retrying
    /// later, as opposed to a condition that requires operator action.
    #[inline]
    pub fn is_retriable(&self) -> bool {
        matches!(self, RagError::ProviderUnavailable(_))
    }

    /// True when the only remedy is a full index rebuild.
    #[inline]
    pub fn requires_rebuild(&self) -> bool {
        matches!(
            self,
            RagError::DimensionMismatch { .. }
                | RagError::IndexCorrupt(_)
                | RagError::IndexNotBuilt
        )
    }
}

pub mod api;
pub mod commands;
pub mod config;
pub mod conversations;
pub mod corpus;
pub mod embeddings;
pub mod index;
pub mod query;
