//! The migration runner: executes units in order, commits their output,
//! and keeps re-runs idempotent via the commit history.

use crate::context::MigrationContext;
use crate::error::MigrationError;
use crate::git::VersionControl;
use crate::manager::{COMMIT_SUBJECT_PREFIX, MigrationManager};
use crate::model::{Migration, MigrationResult, MigrationStats, MigrationStatus, ScriptMetadata};
use chrono::Utc;
use civet_publication::PublicationService;
use civet_search::SearchService;
use civet_types::{Author, AuthorId, AuthorKind};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Fixed operating parameters for the runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Above this many changed files, the snapshot is committed in
    /// fixed-size batches instead of one commit.
    pub commit_batch_size: usize,
    /// Timeout for the post-run push; dataset pushes can be large.
    pub push_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            commit_batch_size: 1000,
            push_timeout: Duration::from_secs(30 * 60),
        }
    }
}

/// Per-invocation switches.
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    /// Execute the script but skip commit and push. Written files stay
    /// in the working copy for inspection.
    pub dry_run: bool,
    /// Commit and push after a successful run. Disabling leaves the
    /// working copy dirty and the migration unapplied.
    pub auto_commit: bool,
    /// Run even when the commit history says the migration is applied.
    pub force: bool,
    /// In [`MigrationRunner::run_all`], keep going past a failed unit.
    pub continue_on_failure: bool,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            auto_commit: true,
            force: false,
            continue_on_failure: false,
        }
    }
}

pub struct MigrationRunner {
    manager: MigrationManager,
    publication: Arc<PublicationService>,
    search: Arc<SearchService>,
    vc: Arc<dyn VersionControl>,
    config: RunnerConfig,
}

impl MigrationRunner {
    pub fn new(
        manager: MigrationManager,
        publication: Arc<PublicationService>,
        search: Arc<SearchService>,
        vc: Arc<dyn VersionControl>,
        config: RunnerConfig,
    ) -> Self {
        Self {
            manager,
            publication,
            search,
            vc,
            config,
        }
    }

    pub fn manager(&self) -> &MigrationManager {
        &self.manager
    }

    /// Runs a single migration by full name.
    pub async fn run(
        &self,
        full_name: &str,
        options: &RunnerOptions,
    ) -> Result<MigrationResult, MigrationError> {
        let migration = self
            .manager
            .discover()
            .await?
            .into_iter()
            .find(|m| m.full_name() == full_name)
            .ok_or_else(|| MigrationError::NotFound(full_name.to_owned()))?;
        self.run_one(&migration, options).await
    }

    /// Runs every pending migration in prefix order. Stops after the
    /// first failure unless `continue_on_failure` is set; the failed
    /// result is always included.
    pub async fn run_all(
        &self,
        options: &RunnerOptions,
    ) -> Result<Vec<MigrationResult>, MigrationError> {
        let migrations = self.manager.discover().await?;
        let mut results = Vec::with_capacity(migrations.len());
        for migration in &migrations {
            let result = self.run_one(migration, options).await?;
            let failed = result.status == MigrationStatus::Failed;
            results.push(result);
            if failed && !options.continue_on_failure {
                break;
            }
        }
        Ok(results)
    }

    async fn run_one(
        &self,
        migration: &Migration,
        options: &RunnerOptions,
    ) -> Result<MigrationResult, MigrationError> {
        let full_name = migration.full_name();
        let started_at = Utc::now();

        if !options.force && self.manager.is_applied(&full_name).await? {
            info!(migration = %full_name, "already applied, skipping");
            return Ok(MigrationResult::skipped(full_name, started_at));
        }

        let script = self
            .manager
            .registry()
            .get(&full_name)
            .ok_or_else(|| MigrationError::Unregistered(full_name.clone()))?;
        let metadata = script.metadata();

        let author_id = self.migration_author(&full_name, &metadata).await?;
        let ctx = MigrationContext::new(
            full_name.clone(),
            &migration.dir,
            author_id,
            Arc::clone(&self.publication),
            Arc::clone(&self.search),
        );

        info!(migration = %full_name, "running migration");
        let clock = Instant::now();
        let outcome = script.run(&ctx).await;
        let duration = clock.elapsed();
        let stats = ctx.stats();
        let logs = ctx.take_logs();

        match outcome {
            Ok(()) => {
                let commits = if options.dry_run {
                    info!(migration = %full_name, "dry run, skipping commit");
                    Vec::new()
                } else if options.auto_commit {
                    self.commit_migration(&full_name, &metadata, &stats, duration)
                        .await?
                } else {
                    Vec::new()
                };
                info!(
                    migration = %full_name,
                    mutations = stats.total(),
                    commits = commits.len(),
                    "migration completed"
                );
                Ok(MigrationResult {
                    migration: full_name,
                    status: MigrationStatus::Completed,
                    started_at,
                    duration,
                    stats,
                    error: None,
                    logs,
                    commits,
                })
            }
            Err(err) => {
                error!(migration = %full_name, error = %err, "migration failed");
                if !options.dry_run {
                    // Drop the partial snapshot so a later run starts clean.
                    if let Err(reset_err) = self.vc.reset_working_copy().await {
                        warn!(error = %reset_err, "failed to reset working copy");
                    }
                }
                Ok(MigrationResult {
                    migration: full_name,
                    status: MigrationStatus::Failed,
                    started_at,
                    duration,
                    stats,
                    error: Some(format!("{err:#}")),
                    logs,
                    commits: Vec::new(),
                })
            }
        }
    }

    /// Ensures the migration's author record exists with migration
    /// provenance before any mutation references it.
    async fn migration_author(
        &self,
        full_name: &str,
        metadata: &ScriptMetadata,
    ) -> Result<AuthorId, MigrationError> {
        let author_id =
            AuthorId::new(full_name).map_err(|source| MigrationError::InvalidAuthor {
                name: full_name.to_owned(),
                source,
            })?;
        let store = self.publication.store();
        match store.get_author(&author_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let mut author = Author::from_id(&author_id, AuthorKind::Migration);
                author.display_name = Some(metadata.author.clone());
                if let Err(e) = store.put_author(&author).await {
                    warn!(error = %e, "failed to pre-create migration author");
                }
            }
            Err(e) => warn!(error = %e, "failed to read migration author"),
        }
        Ok(author_id)
    }

    async fn commit_migration(
        &self,
        full_name: &str,
        metadata: &ScriptMetadata,
        stats: &MigrationStats,
        duration: Duration,
    ) -> Result<Vec<String>, MigrationError> {
        let changed = self.vc.changed_files().await?;
        if changed.is_empty() {
            info!(migration = %full_name, "no changes to commit");
            return Ok(Vec::new());
        }

        let body = commit_body(metadata, stats, duration);
        let mut commits = Vec::new();
        if changed.len() <= self.config.commit_batch_size {
            self.vc.stage_all().await?;
            let message = format!("{COMMIT_SUBJECT_PREFIX}{full_name}\n\n{body}");
            commits.push(self.vc.commit(&message).await?);
        } else {
            let total = changed.len().div_ceil(self.config.commit_batch_size);
            for (index, chunk) in changed.chunks(self.config.commit_batch_size).enumerate() {
                self.vc.stage(chunk).await?;
                let message = format!(
                    "{COMMIT_SUBJECT_PREFIX}{full_name} (Batch {}/{total})\n\n{body}",
                    index + 1
                );
                commits.push(self.vc.commit(&message).await?);
            }
        }
        info!(
            migration = %full_name,
            files = changed.len(),
            commits = commits.len(),
            "committed migration snapshot"
        );

        if self.vc.push(self.config.push_timeout).await? {
            info!(migration = %full_name, "pushed to remote");
        }
        self.manager.clear_cache().await;
        Ok(commits)
    }
}

fn commit_body(metadata: &ScriptMetadata, stats: &MigrationStats, duration: Duration) -> String {
    format!(
        "{}\n\n\
         Author: {}\n\
         Date: {}\n\
         Entities created: {}\n\
         Entities updated: {}\n\
         Relationships created: {}\n\
         Relationships updated: {}\n\
         Duration: {:.2}s",
        metadata.description,
        metadata.author,
        metadata.date,
        stats.entities_created,
        stats.entities_updated,
        stats.relationships_created,
        stats.relationships_updated,
        duration.as_secs_f64(),
    )
}
