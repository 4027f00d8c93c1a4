//! Version-control seam for the dataset repository.
//!
//! The orchestrator treats git as the record of which migrations have
//! run: a migration is applied iff a commit subject names it. [`GitCli`]
//! shells out to the `git` binary; tests substitute a fake.

use crate::error::MigrationError;
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

/// Operations the orchestrator needs from the dataset repository.
#[async_trait]
pub trait VersionControl: Send + Sync {
    /// Subject lines of commits whose message contains `grep`, newest
    /// first.
    async fn log_subjects(&self, grep: &str) -> Result<Vec<String>, MigrationError>;

    /// Paths that differ from HEAD: modified, staged, and untracked.
    async fn changed_files(&self) -> Result<Vec<String>, MigrationError>;

    async fn stage(&self, paths: &[String]) -> Result<(), MigrationError>;

    async fn stage_all(&self) -> Result<(), MigrationError>;

    /// Commits staged changes, returning the new commit sha.
    async fn commit(&self, message: &str) -> Result<String, MigrationError>;

    /// Pushes to the default remote. Returns `false` without error when
    /// the repository has no remote configured.
    async fn push(&self, timeout: Duration) -> Result<bool, MigrationError>;

    async fn head_sha(&self) -> Result<String, MigrationError>;

    /// Discards uncommitted changes and untracked files, restoring the
    /// working copy to HEAD.
    async fn reset_working_copy(&self) -> Result<(), MigrationError>;
}

/// [`VersionControl`] backed by the `git` command-line tool.
pub struct GitCli {
    repo: PathBuf,
    /// Timeout for ordinary commands; pushes get their own.
    command_timeout: Duration,
}

impl GitCli {
    pub fn new(repo: impl Into<PathBuf>) -> Self {
        Self {
            repo: repo.into(),
            command_timeout: Duration::from_secs(60),
        }
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    async fn run(&self, args: &[&str], timeout: Duration) -> Result<String, MigrationError> {
        let command_name = args.first().copied().unwrap_or("git");
        debug!(?args, "running git");
        let child = Command::new("git")
            .args(args)
            .current_dir(&self.repo)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(timeout, child)
            .await
            .map_err(|_| MigrationError::GitTimeout {
                command: command_name.to_owned(),
                timeout,
            })??;
        if !output.status.success() {
            return Err(MigrationError::Git {
                command: command_name.to_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn run_default(&self, args: &[&str]) -> Result<String, MigrationError> {
        self.run(args, self.command_timeout).await
    }
}

#[async_trait]
impl VersionControl for GitCli {
    async fn log_subjects(&self, grep: &str) -> Result<Vec<String>, MigrationError> {
        let grep_arg = format!("--grep={grep}");
        let out = match self
            .run_default(&["log", "--pretty=format:%s", "--fixed-strings", &grep_arg])
            .await
        {
            Ok(out) => out,
            // A repository with no commits yet has nothing applied.
            Err(MigrationError::Git { stderr, .. })
                if stderr.contains("does not have any commits") =>
            {
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        Ok(out.lines().map(str::to_owned).collect())
    }

    async fn changed_files(&self) -> Result<Vec<String>, MigrationError> {
        let out = self.run_default(&["status", "--porcelain"]).await?;
        Ok(out
            .lines()
            .filter(|line| line.len() > 3)
            .map(|line| {
                // Renames list as "old -> new"; keep the new path.
                let path = &line[3..];
                match path.rsplit_once(" -> ") {
                    Some((_, new)) => new.to_owned(),
                    None => path.to_owned(),
                }
            })
            .collect())
    }

    async fn stage(&self, paths: &[String]) -> Result<(), MigrationError> {
        if paths.is_empty() {
            return Ok(());
        }
        let mut args = vec!["add", "--"];
        args.extend(paths.iter().map(String::as_str));
        self.run_default(&args).await?;
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), MigrationError> {
        self.run_default(&["add", "-A"]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, MigrationError> {
        self.run_default(&["commit", "-m", message]).await?;
        self.head_sha().await
    }

    async fn push(&self, timeout: Duration) -> Result<bool, MigrationError> {
        let remotes = self.run_default(&["remote"]).await?;
        if remotes.trim().is_empty() {
            debug!("no remote configured, skipping push");
            return Ok(false);
        }
        self.run(&["push"], timeout).await?;
        Ok(true)
    }

    async fn head_sha(&self) -> Result<String, MigrationError> {
        Ok(self.run_default(&["rev-parse", "HEAD"]).await?.trim().to_owned())
    }

    async fn reset_working_copy(&self) -> Result<(), MigrationError> {
        warn!("resetting working copy to HEAD");
        self.run_default(&["checkout", "--", "."]).await?;
        self.run_default(&["clean", "-fd"]).await?;
        Ok(())
    }
}
