//! Error types for model construction and validation.

use thiserror::Error;

/// Errors produced while building or validating model types.
#[derive(Debug, Error)]
pub enum ModelError {
    /// An identifier string does not follow the expected format.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A model invariant is violated.
    #[error("validation failed: {0}")]
    Validation(String),
}
