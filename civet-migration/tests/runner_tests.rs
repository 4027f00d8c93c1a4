use async_trait::async_trait;
use chrono::NaiveDate;
use civet_migration::{
    MigrationContext, MigrationError, MigrationManager, MigrationRunner, MigrationScript,
    MigrationStatus, RunnerConfig, RunnerOptions, ScriptMetadata, ScriptRegistry, VersionControl,
};
use civet_publication::{NewEntity, PublicationService};
use civet_search::SearchService;
use civet_store::{EntityStore, FileStore, FileStoreOptions};
use civet_types::{EntityId, EntityType, Name, NameParts};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

// ── Fake version control ──────────────────────────────────────────

/// In-memory stand-in for the git seam. "Committed" files are tracked
/// by relative path; anything on disk but not committed is a change.
struct FakeVc {
    root: PathBuf,
    has_remote: bool,
    committed: Mutex<HashSet<String>>,
    staged: Mutex<Vec<String>>,
    commits: Mutex<Vec<String>>,
    pushes: AtomicUsize,
    resets: AtomicUsize,
}

impl FakeVc {
    fn new(root: PathBuf, has_remote: bool) -> Self {
        Self {
            root,
            has_remote,
            committed: Mutex::new(HashSet::new()),
            staged: Mutex::new(Vec::new()),
            commits: Mutex::new(Vec::new()),
            pushes: AtomicUsize::new(0),
            resets: AtomicUsize::new(0),
        }
    }

    fn commit_messages(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }

    fn commit_subjects(&self) -> Vec<String> {
        self.commit_messages()
            .iter()
            .map(|m| m.lines().next().unwrap_or("").to_owned())
            .collect()
    }

    fn walk(&self) -> Vec<String> {
        fn visit(root: &Path, dir: &Path, out: &mut Vec<String>) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                return;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.is_dir() {
                    visit(root, &path, out);
                } else if let Ok(rel) = path.strip_prefix(root) {
                    out.push(rel.to_string_lossy().into_owned());
                }
            }
        }
        let mut out = Vec::new();
        visit(&self.root, &self.root, &mut out);
        out.sort();
        out
    }

    fn dirty(&self) -> Vec<String> {
        let committed = self.committed.lock().unwrap();
        self.walk()
            .into_iter()
            .filter(|f| !committed.contains(f))
            .collect()
    }
}

#[async_trait]
impl VersionControl for FakeVc {
    async fn log_subjects(&self, grep: &str) -> Result<Vec<String>, MigrationError> {
        Ok(self
            .commit_subjects()
            .into_iter()
            .rev()
            .filter(|s| s.contains(grep))
            .collect())
    }

    async fn changed_files(&self) -> Result<Vec<String>, MigrationError> {
        Ok(self.dirty())
    }

    async fn stage(&self, paths: &[String]) -> Result<(), MigrationError> {
        self.staged.lock().unwrap().extend_from_slice(paths);
        Ok(())
    }

    async fn stage_all(&self) -> Result<(), MigrationError> {
        let dirty = self.dirty();
        *self.staged.lock().unwrap() = dirty;
        Ok(())
    }

    async fn commit(&self, message: &str) -> Result<String, MigrationError> {
        let staged: Vec<String> = self.staged.lock().unwrap().drain(..).collect();
        self.committed.lock().unwrap().extend(staged);
        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_owned());
        Ok(format!("sha{}", commits.len()))
    }

    async fn push(&self, _timeout: Duration) -> Result<bool, MigrationError> {
        if !self.has_remote {
            return Ok(false);
        }
        self.pushes.fetch_add(1, Ordering::SeqCst);
        Ok(true)
    }

    async fn head_sha(&self) -> Result<String, MigrationError> {
        let commits = self.commits.lock().unwrap();
        Ok(format!("sha{}", commits.len()))
    }

    async fn reset_working_copy(&self) -> Result<(), MigrationError> {
        self.resets.fetch_add(1, Ordering::SeqCst);
        for file in self.dirty() {
            let _ = std::fs::remove_file(self.root.join(file));
        }
        Ok(())
    }
}

// ── Test scripts ──────────────────────────────────────────────────

fn metadata(description: &str) -> ScriptMetadata {
    ScriptMetadata {
        author: "Data Team".into(),
        date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        description: description.into(),
    }
}

fn party_id(slug: &str) -> EntityId {
    EntityId::new(EntityType::Organization, Some("political_party"), slug).unwrap()
}

/// Creates `count` parties, skipping ones that already exist.
struct SeedParties {
    count: usize,
}

#[async_trait]
impl MigrationScript for SeedParties {
    fn metadata(&self) -> ScriptMetadata {
        metadata("Seed political parties")
    }

    async fn run(&self, ctx: &MigrationContext) -> anyhow::Result<()> {
        for i in 0..self.count {
            let slug = format!("party-{i}");
            if ctx.get_entity(&party_id(&slug)).await?.is_some() {
                continue;
            }
            let draft = NewEntity::new(
                EntityType::Organization,
                &slug,
                vec![Name::primary(NameParts::full(format!("Party {i}")))],
            )
            .with_sub_type("political_party");
            ctx.create_entity(draft, "seed party").await?;
        }
        ctx.log(format!("seeded {} parties", self.count));
        Ok(())
    }
}

/// Writes one entity, then fails.
struct FailsHalfway;

#[async_trait]
impl MigrationScript for FailsHalfway {
    fn metadata(&self) -> ScriptMetadata {
        metadata("Never finishes")
    }

    async fn run(&self, ctx: &MigrationContext) -> anyhow::Result<()> {
        let draft = NewEntity::new(
            EntityType::Person,
            "half-done",
            vec![Name::primary(NameParts::full("Half Done"))],
        );
        ctx.create_entity(draft, "partial work").await?;
        anyhow::bail!("source file missing a column")
    }
}

/// Loads people from the unit's `people.csv`.
struct LoadFromCsv;

#[derive(Deserialize)]
struct PersonRow {
    slug: String,
    name: String,
}

#[async_trait]
impl MigrationScript for LoadFromCsv {
    fn metadata(&self) -> ScriptMetadata {
        metadata("Load people from CSV")
    }

    async fn run(&self, ctx: &MigrationContext) -> anyhow::Result<()> {
        let rows: Vec<PersonRow> = ctx.read_csv("people.csv").await?;
        for row in rows {
            let draft = NewEntity::new(
                EntityType::Person,
                &row.slug,
                vec![Name::primary(NameParts::full(row.name))],
            );
            ctx.create_entity(draft, "csv import").await?;
        }
        Ok(())
    }
}

/// Tries to read outside its own directory.
struct EscapesSandbox;

#[async_trait]
impl MigrationScript for EscapesSandbox {
    fn metadata(&self) -> ScriptMetadata {
        metadata("Reads where it should not")
    }

    async fn run(&self, ctx: &MigrationContext) -> anyhow::Result<()> {
        ctx.read_to_string("../../etc/passwd").await?;
        Ok(())
    }
}

// ── Harness ───────────────────────────────────────────────────────

struct Harness {
    _dir: TempDir,
    runner: MigrationRunner,
    vc: Arc<FakeVc>,
    store: Arc<dyn EntityStore>,
    migrations_dir: PathBuf,
}

async fn harness(
    scripts: Vec<(&str, Arc<dyn MigrationScript>)>,
    batch_size: usize,
    has_remote: bool,
) -> Harness {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let dir = TempDir::new().unwrap();
    let repo = dir.path().join("dataset");
    let migrations_dir = dir.path().join("migrations");
    std::fs::create_dir_all(&migrations_dir).unwrap();

    let mut registry = ScriptRegistry::new();
    for (name, script) in scripts {
        std::fs::create_dir_all(migrations_dir.join(name)).unwrap();
        registry.register(name, script);
    }

    let store: Arc<dyn EntityStore> = Arc::new(
        FileStore::open(&repo, FileStoreOptions::default())
            .await
            .unwrap(),
    );
    let publication = Arc::new(PublicationService::new(Arc::clone(&store)));
    let search = Arc::new(SearchService::new(Arc::clone(&store)));
    let vc = Arc::new(FakeVc::new(repo, has_remote));

    let manager = MigrationManager::new(
        &migrations_dir,
        registry,
        Arc::clone(&vc) as Arc<dyn VersionControl>,
    );
    let runner = MigrationRunner::new(
        manager,
        publication,
        search,
        Arc::clone(&vc) as Arc<dyn VersionControl>,
        RunnerConfig {
            commit_batch_size: batch_size,
            push_timeout: Duration::from_secs(1),
        },
    );
    Harness {
        _dir: dir,
        runner,
        vc,
        store,
        migrations_dir,
    }
}

fn seed(count: usize) -> Arc<dyn MigrationScript> {
    Arc::new(SeedParties { count })
}

// ── Idempotency ───────────────────────────────────────────────────

#[tokio::test]
async fn second_run_is_skipped() {
    let h = harness(vec![("001-seed-parties", seed(3))], 1000, true).await;

    let first = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].status, MigrationStatus::Completed);
    assert_eq!(first[0].stats.entities_created, 3);
    assert_eq!(first[0].commits, vec!["sha1"]);
    assert!(first[0].logs.iter().any(|l| l.contains("seeded 3 parties")));
    assert_eq!(
        h.vc.commit_subjects(),
        vec!["Migration: 001-seed-parties".to_owned()]
    );
    assert_eq!(h.vc.pushes.load(Ordering::SeqCst), 1);

    let second = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].status, MigrationStatus::Skipped);
    // No new commits, no new pushes.
    assert_eq!(h.vc.commit_messages().len(), 1);
    assert_eq!(h.vc.pushes.load(Ordering::SeqCst), 1);

    assert!(h.store.get_entity(&party_id("party-0")).await.unwrap().is_some());
}

#[tokio::test]
async fn force_reruns_an_applied_migration() {
    let h = harness(vec![("001-seed-parties", seed(2))], 1000, true).await;
    h.runner.run_all(&RunnerOptions::default()).await.unwrap();

    let options = RunnerOptions {
        force: true,
        ..RunnerOptions::default()
    };
    let result = h.runner.run("001-seed-parties", &options).await.unwrap();
    assert_eq!(result.status, MigrationStatus::Completed);
    // The script is idempotent, so nothing changed and nothing committed.
    assert_eq!(result.stats.entities_created, 0);
    assert!(result.commits.is_empty());
    assert_eq!(h.vc.commit_messages().len(), 1);
}

// ── Commit batching ───────────────────────────────────────────────

#[tokio::test]
async fn large_snapshots_commit_in_batches() {
    let h = harness(vec![("001-seed-parties", seed(4))], 3, true).await;

    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Completed);

    let subjects = h.vc.commit_subjects();
    // 4 entities + 4 version records + 1 author = 9 files, 3 per batch.
    assert_eq!(subjects.len(), 3);
    for (i, subject) in subjects.iter().enumerate() {
        assert_eq!(
            subject,
            &format!("Migration: 001-seed-parties (Batch {}/3)", i + 1)
        );
    }
    assert_eq!(results[0].commits.len(), 3);
    // Batched commits are pushed once at the end.
    assert_eq!(h.vc.pushes.load(Ordering::SeqCst), 1);

    // Batch-suffixed subjects still mark the migration applied.
    let again = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(again[0].status, MigrationStatus::Skipped);
}

// ── Failure handling ──────────────────────────────────────────────

#[tokio::test]
async fn failure_resets_working_copy_and_commits_nothing() {
    let h = harness(vec![("001-never-finishes", Arc::new(FailsHalfway))], 1000, true).await;

    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Failed);
    assert!(
        results[0]
            .error
            .as_deref()
            .unwrap()
            .contains("source file missing a column")
    );
    assert!(h.vc.commit_messages().is_empty());
    assert_eq!(h.vc.resets.load(Ordering::SeqCst), 1);

    // The partial entity write was wiped with the working copy.
    let id = EntityId::new(EntityType::Person, None, "half-done").unwrap();
    assert!(h.store.get_entity(&id).await.unwrap().is_none());

    // A later run still sees the migration as pending.
    let again = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(again[0].status, MigrationStatus::Failed);
}

#[tokio::test]
async fn run_all_stops_at_first_failure() {
    let h = harness(
        vec![
            ("001-seed-parties", seed(1)),
            ("002-never-finishes", Arc::new(FailsHalfway)),
            ("003-more-parties", seed(2)),
        ],
        1000,
        true,
    )
    .await;

    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, MigrationStatus::Completed);
    assert_eq!(results[1].status, MigrationStatus::Failed);
}

#[tokio::test]
async fn run_all_can_continue_past_failures() {
    let h = harness(
        vec![
            ("001-never-finishes", Arc::new(FailsHalfway)),
            ("002-seed-parties", seed(1)),
        ],
        1000,
        true,
    )
    .await;

    let options = RunnerOptions {
        continue_on_failure: true,
        ..RunnerOptions::default()
    };
    let results = h.runner.run_all(&options).await.unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].status, MigrationStatus::Failed);
    assert_eq!(results[1].status, MigrationStatus::Completed);
}

// ── Dry run / no remote ───────────────────────────────────────────

#[tokio::test]
async fn dry_run_commits_nothing() {
    let h = harness(vec![("001-seed-parties", seed(2))], 1000, true).await;
    let options = RunnerOptions {
        dry_run: true,
        ..RunnerOptions::default()
    };
    let results = h.runner.run_all(&options).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Completed);
    assert_eq!(results[0].stats.entities_created, 2);
    assert!(results[0].commits.is_empty());
    assert!(h.vc.commit_messages().is_empty());
    assert_eq!(h.vc.resets.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn missing_remote_is_not_an_error() {
    let h = harness(vec![("001-seed-parties", seed(1))], 1000, false).await;
    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Completed);
    assert_eq!(h.vc.commit_messages().len(), 1);
    assert_eq!(h.vc.pushes.load(Ordering::SeqCst), 0);
}

// ── Discovery errors ──────────────────────────────────────────────

#[tokio::test]
async fn duplicate_prefix_rejected() {
    let h = harness(
        vec![("001-seed-parties", seed(1)), ("001-other-seed", seed(1))],
        1000,
        true,
    )
    .await;
    let err = h.runner.run_all(&RunnerOptions::default()).await.unwrap_err();
    assert!(matches!(err, MigrationError::DuplicatePrefix { prefix: 1, .. }));
}

#[tokio::test]
async fn unregistered_directory_rejected() {
    let h = harness(vec![("001-seed-parties", seed(1))], 1000, true).await;
    std::fs::create_dir_all(h.migrations_dir.join("002-mystery")).unwrap();
    let err = h.runner.run_all(&RunnerOptions::default()).await.unwrap_err();
    match err {
        MigrationError::Unregistered(name) => assert_eq!(name, "002-mystery"),
        other => panic!("expected Unregistered, got {other}"),
    }
}

#[tokio::test]
async fn registration_without_directory_rejected() {
    let h = harness(vec![("001-seed-parties", seed(1))], 1000, true).await;
    std::fs::remove_dir(h.migrations_dir.join("001-seed-parties")).unwrap();
    let err = h.runner.run_all(&RunnerOptions::default()).await.unwrap_err();
    assert!(matches!(err, MigrationError::MissingDirectory(_)));
}

#[tokio::test]
async fn unknown_migration_name_rejected() {
    let h = harness(vec![("001-seed-parties", seed(1))], 1000, true).await;
    let err = h
        .runner
        .run("999-missing", &RunnerOptions::default())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrationError::NotFound(_)));
}

// ── Context data files ────────────────────────────────────────────

#[tokio::test]
async fn script_reads_csv_from_its_directory() {
    let h = harness(vec![("001-load-people", Arc::new(LoadFromCsv))], 1000, true).await;
    std::fs::write(
        h.migrations_dir.join("001-load-people/people.csv"),
        "slug,name\nram-chandra-poudel,Ram Chandra Poudel\nbishnu-poudel,Bishnu Poudel\n",
    )
    .unwrap();

    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Completed);
    assert_eq!(results[0].stats.entities_created, 2);

    let id = EntityId::new(EntityType::Person, None, "ram-chandra-poudel").unwrap();
    let entity = h.store.get_entity(&id).await.unwrap().unwrap();
    assert_eq!(entity.version.author.slug, "001-load-people");
}

#[tokio::test]
async fn path_traversal_fails_the_migration() {
    let h = harness(vec![("001-escape", Arc::new(EscapesSandbox))], 1000, true).await;
    let results = h.runner.run_all(&RunnerOptions::default()).await.unwrap();
    assert_eq!(results[0].status, MigrationStatus::Failed);
    assert!(results[0].error.as_deref().unwrap().contains("escapes"));
}
