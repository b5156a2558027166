//! Error taxonomy for the knowledge base
//!
//! Malformed FTS query syntax is deliberately *not* represented here: it is
//! recovered inside keyword search as an empty result set. Everything below
//! is fatal to the call that produced it and must reach the caller.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KbError {
    /// The embedding backend failed. No ingestion or semantic query can
    /// proceed without a vector, so this always surfaces.
    #[error("embedding backend failure: {0}")]
    Embedding(#[source] anyhow::Error),

    /// Query or stored vector width disagrees with the store's pinned
    /// dimension. Indicates a model/version inconsistency.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("metadata serialization error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, KbError>;
