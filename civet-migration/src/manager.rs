//! Migration discovery and the applied-state oracle.

use crate::error::MigrationError;
use crate::git::VersionControl;
use crate::model::Migration;
use crate::script::ScriptRegistry;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Commit subject prefix that marks a migration as applied.
pub(crate) const COMMIT_SUBJECT_PREFIX: &str = "Migration: ";

/// Extracts the migration full name from a commit subject, if the
/// subject is a migration marker. Batch suffixes (`(Batch 2/5)`) are
/// stripped so any batch counts as applied.
pub(crate) fn applied_name(subject: &str) -> Option<&str> {
    let rest = subject.strip_prefix(COMMIT_SUBJECT_PREFIX)?;
    let name = match rest.rfind(" (Batch ") {
        Some(idx) if rest.ends_with(')') => &rest[..idx],
        _ => rest,
    };
    let name = name.trim();
    (!name.is_empty()).then_some(name)
}

/// Discovers migration directories and answers "has this run already?"
/// from the dataset repository's commit history.
///
/// The applied set is cached per manager instance; the runner clears it
/// after committing.
pub struct MigrationManager {
    migrations_dir: PathBuf,
    registry: ScriptRegistry,
    vc: Arc<dyn VersionControl>,
    applied: Mutex<Option<HashSet<String>>>,
}

impl MigrationManager {
    pub fn new(
        migrations_dir: impl Into<PathBuf>,
        registry: ScriptRegistry,
        vc: Arc<dyn VersionControl>,
    ) -> Self {
        Self {
            migrations_dir: migrations_dir.into(),
            registry,
            vc,
            applied: Mutex::new(None),
        }
    }

    pub fn registry(&self) -> &ScriptRegistry {
        &self.registry
    }

    /// Scans the migrations directory for `NNN-kebab-name` folders and
    /// returns them in prefix order.
    ///
    /// Fails fast on a layout the runner could not execute faithfully:
    /// duplicate prefixes, a folder with no registered script, or a
    /// registered script with no folder.
    pub async fn discover(&self) -> Result<Vec<Migration>, MigrationError> {
        let mut migrations: Vec<Migration> = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let dir_name = entry.file_name();
            let Some(dir_name) = dir_name.to_str() else {
                continue;
            };
            let Some((prefix, name)) = parse_dir_name(dir_name) else {
                debug!(dir = dir_name, "ignoring non-migration directory");
                continue;
            };
            migrations.push(Migration {
                prefix,
                name: name.to_owned(),
                dir: entry.path(),
            });
        }
        migrations.sort_by_key(|m| m.prefix);

        for pair in migrations.windows(2) {
            if pair[0].prefix == pair[1].prefix {
                return Err(MigrationError::DuplicatePrefix {
                    prefix: pair[0].prefix,
                    first: pair[0].full_name(),
                    second: pair[1].full_name(),
                });
            }
        }
        for migration in &migrations {
            if !self.registry.contains(&migration.full_name()) {
                return Err(MigrationError::Unregistered(migration.full_name()));
            }
        }
        let on_disk: HashSet<String> = migrations.iter().map(Migration::full_name).collect();
        for registered in self.registry.names() {
            if !on_disk.contains(registered) {
                return Err(MigrationError::MissingDirectory(registered.to_owned()));
            }
        }
        Ok(migrations)
    }

    /// True when a commit in the dataset repository marks `full_name` as
    /// applied.
    pub async fn is_applied(&self, full_name: &str) -> Result<bool, MigrationError> {
        let mut applied = self.applied.lock().await;
        if applied.is_none() {
            let subjects = self.vc.log_subjects(COMMIT_SUBJECT_PREFIX.trim_end()).await?;
            let set: HashSet<String> = subjects
                .iter()
                .filter_map(|s| applied_name(s))
                .map(str::to_owned)
                .collect();
            debug!(applied = set.len(), "loaded applied-migration set");
            *applied = Some(set);
        }
        Ok(applied
            .as_ref()
            .is_some_and(|set| set.contains(full_name)))
    }

    /// Drops the cached applied set so the next check re-reads history.
    pub async fn clear_cache(&self) {
        *self.applied.lock().await = None;
    }
}

/// Parses `003-load-parties` into `(3, "load-parties")`. The prefix must
/// be exactly three digits and the name kebab-case.
fn parse_dir_name(dir_name: &str) -> Option<(u32, &str)> {
    let (prefix, name) = dir_name.split_at_checked(3)?;
    if !prefix.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let name = name.strip_prefix('-')?;
    if !civet_types::is_valid_slug(name) {
        return None;
    }
    Some((prefix.parse().ok()?, name))
}
