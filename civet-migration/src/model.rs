//! Migration descriptors and run outcomes.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// A migration unit discovered on disk: a `NNN-kebab-name` directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Migration {
    /// Numeric prefix that fixes execution order.
    pub prefix: u32,
    /// The kebab-case name following the prefix.
    pub name: String,
    /// Absolute path of the migration directory.
    pub dir: PathBuf,
}

impl Migration {
    /// The canonical `NNN-name` form used in commit subjects and the
    /// script registry.
    pub fn full_name(&self) -> String {
        format!("{:03}-{}", self.prefix, self.name)
    }
}

/// Static description a script provides about itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptMetadata {
    pub author: String,
    pub date: NaiveDate,
    pub description: String,
}

/// Lifecycle state of one migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MigrationStatus {
    Running,
    Completed,
    Failed,
    Skipped,
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStatus::Running => "running",
            MigrationStatus::Completed => "completed",
            MigrationStatus::Failed => "failed",
            MigrationStatus::Skipped => "skipped",
        };
        f.write_str(s)
    }
}

/// Mutation counters accumulated through the context's service wrappers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStats {
    pub entities_created: u64,
    pub entities_updated: u64,
    pub relationships_created: u64,
    pub relationships_updated: u64,
}

impl MigrationStats {
    pub fn total(&self) -> u64 {
        self.entities_created
            + self.entities_updated
            + self.relationships_created
            + self.relationships_updated
    }
}

/// Outcome of running (or skipping) one migration.
#[derive(Debug, Clone)]
pub struct MigrationResult {
    /// Full `NNN-name` of the migration.
    pub migration: String,
    pub status: MigrationStatus,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub stats: MigrationStats,
    /// Message of the failure when `status` is `Failed`.
    pub error: Option<String>,
    /// Messages the script emitted through the context log.
    pub logs: Vec<String>,
    /// Shas of the commits this run produced, in order.
    pub commits: Vec<String>,
}

impl MigrationResult {
    pub fn skipped(migration: String, started_at: DateTime<Utc>) -> Self {
        Self {
            migration,
            status: MigrationStatus::Skipped,
            started_at,
            duration: Duration::ZERO,
            stats: MigrationStats::default(),
            error: None,
            logs: Vec::new(),
            commits: Vec::new(),
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(
            self.status,
            MigrationStatus::Completed | MigrationStatus::Skipped
        )
    }
}

impl fmt::Display for MigrationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.migration, self.status)?;
        match self.status {
            MigrationStatus::Completed => {
                write!(
                    f,
                    " in {:.2}s ({} created, {} updated entities; {} created, {} updated relationships)",
                    self.duration.as_secs_f64(),
                    self.stats.entities_created,
                    self.stats.entities_updated,
                    self.stats.relationships_created,
                    self.stats.relationships_updated,
                )?;
                if !self.commits.is_empty() {
                    write!(f, ", {} commit(s)", self.commits.len())?;
                }
            }
            MigrationStatus::Failed => {
                if let Some(error) = &self.error {
                    write!(f, ": {error}")?;
                }
            }
            MigrationStatus::Skipped | MigrationStatus::Running => {}
        }
        Ok(())
    }
}
