//! Error types for the migration orchestrator.
//!
//! Script-level failures never surface here; they are captured in a
//! [`crate::MigrationResult`] with `Failed` status. This enum covers
//! orchestration failures: bad migration layout, git trouble, IO.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// Two migration directories claim the same numeric prefix.
    #[error("duplicate migration prefix {prefix:03}: {first} and {second}")]
    DuplicatePrefix {
        prefix: u32,
        first: String,
        second: String,
    },

    /// A migration directory exists on disk but no script is registered
    /// for it.
    #[error("no script registered for migration {0}")]
    Unregistered(String),

    /// A script is registered but its migration directory is missing.
    #[error("no migration directory for registered script {0}")]
    MissingDirectory(String),

    /// The requested migration does not exist.
    #[error("migration not found: {0}")]
    NotFound(String),

    /// The migration name does not form a valid author identifier.
    #[error("cannot derive author id for migration {name}: {source}")]
    InvalidAuthor {
        name: String,
        #[source]
        source: civet_types::ModelError,
    },

    /// A git subprocess exited non-zero.
    #[error("git {command} failed: {stderr}")]
    Git { command: String, stderr: String },

    /// A git subprocess overran its timeout.
    #[error("git {command} timed out after {timeout:?}")]
    GitTimeout { command: String, timeout: Duration },

    /// IO error (file system).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
