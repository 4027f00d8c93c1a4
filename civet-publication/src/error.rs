//! Error types for the publication service.

use thiserror::Error;

/// Result type for publication operations.
pub type PublishResult<T> = Result<T, PublishError>;

/// Errors that can occur when publishing mutations.
#[derive(Debug, Error)]
pub enum PublishError {
    /// The object breaks a model invariant. Nothing was written.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The object an operation requires does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A create collided with an existing object.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A relationship endpoint does not resolve to a stored entity.
    #[error("dangling reference: {0}")]
    DanglingReference(String),

    /// Error from the underlying store.
    #[error(transparent)]
    Store(#[from] civet_store::StoreError),
}

impl From<civet_types::ModelError> for PublishError {
    fn from(err: civet_types::ModelError) -> Self {
        PublishError::Validation(err.to_string())
    }
}
