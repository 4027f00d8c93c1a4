//! Error types for the storage layer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Object not found. Point lookups return `Ok(None)` instead; this is
    /// reserved for operations that require the object to exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A file exists at the expected path but does not parse as the
    /// expected document.
    #[error("corrupt document at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Write attempted against a read-only store.
    #[error("store is read-only")]
    ReadOnly,

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model-level error (bad identifier embedded in a document).
    #[error("invalid data: {0}")]
    InvalidData(#[from] civet_types::ModelError),

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
