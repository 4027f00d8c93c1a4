//! Migration orchestrator for the civet registry dataset.
//!
//! Migrations are directories named `NNN-kebab-name` paired with
//! registered [`MigrationScript`] implementations. The dataset lives in
//! a git repository, and git doubles as the applied-state record: a
//! migration has run iff a commit subject reads `Migration: NNN-name`
//! (optionally with a `(Batch i/N)` suffix for large snapshots). Re-runs
//! are therefore idempotent without any side table.
//!
//! The [`MigrationRunner`] executes pending units in prefix order, hands
//! each script a [`MigrationContext`] that routes every mutation through
//! the publication service, commits the resulting snapshot, and resets
//! the working copy when a script fails.

mod context;
mod error;
mod git;
mod manager;
mod model;
mod runner;
mod script;

pub use context::MigrationContext;
pub use error::MigrationError;
pub use git::{GitCli, VersionControl};
pub use manager::MigrationManager;
pub use model::{Migration, MigrationResult, MigrationStats, MigrationStatus, ScriptMetadata};
pub use runner::{MigrationRunner, RunnerConfig, RunnerOptions};
pub use script::{MigrationScript, ScriptRegistry};
