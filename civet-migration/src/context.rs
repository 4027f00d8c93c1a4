//! Execution context handed to migration scripts.
//!
//! Scripts never touch the store or the services directly: every
//! mutation goes through the wrappers here, which attribute the change
//! to the migration's author and keep the run statistics that end up in
//! the commit message and the [`crate::MigrationResult`].

use crate::model::MigrationStats;
use anyhow::{Context as _, bail};
use civet_publication::{NewEntity, NewRelationship, PublicationService, PublishResult};
use civet_search::SearchService;
use civet_types::{AuthorId, Entity, EntityId, Relationship, RelationshipId};
use serde::de::DeserializeOwned;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::info;

pub struct MigrationContext {
    full_name: String,
    dir: PathBuf,
    author_id: AuthorId,
    publication: Arc<PublicationService>,
    search: Arc<SearchService>,
    entities_created: AtomicU64,
    entities_updated: AtomicU64,
    relationships_created: AtomicU64,
    relationships_updated: AtomicU64,
    logs: Mutex<Vec<String>>,
}

impl MigrationContext {
    pub fn new(
        full_name: impl Into<String>,
        dir: impl Into<PathBuf>,
        author_id: AuthorId,
        publication: Arc<PublicationService>,
        search: Arc<SearchService>,
    ) -> Self {
        Self {
            full_name: full_name.into(),
            dir: dir.into(),
            author_id,
            publication,
            search,
            entities_created: AtomicU64::new(0),
            entities_updated: AtomicU64::new(0),
            relationships_created: AtomicU64::new(0),
            relationships_updated: AtomicU64::new(0),
            logs: Mutex::new(Vec::new()),
        }
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn author_id(&self) -> &AuthorId {
        &self.author_id
    }

    /// Read-only queries for scripts that need to look things up.
    pub fn search(&self) -> &SearchService {
        &self.search
    }

    /// Records a message into the run log (also emitted via tracing).
    pub fn log(&self, message: impl Into<String>) {
        let message = message.into();
        info!(migration = %self.full_name, "{message}");
        self.logs
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }

    pub(crate) fn take_logs(&self) -> Vec<String> {
        std::mem::take(&mut *self.logs.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn stats(&self) -> MigrationStats {
        MigrationStats {
            entities_created: self.entities_created.load(Ordering::Relaxed),
            entities_updated: self.entities_updated.load(Ordering::Relaxed),
            relationships_created: self.relationships_created.load(Ordering::Relaxed),
            relationships_updated: self.relationships_updated.load(Ordering::Relaxed),
        }
    }

    // ── Mutations (counted) ───────────────────────────────────────

    pub async fn create_entity(
        &self,
        draft: NewEntity,
        change_description: &str,
    ) -> PublishResult<Entity> {
        let entity = self
            .publication
            .create_entity(draft, &self.author_id, change_description)
            .await?;
        self.entities_created.fetch_add(1, Ordering::Relaxed);
        Ok(entity)
    }

    pub async fn update_entity(
        &self,
        entity: Entity,
        change_description: &str,
    ) -> PublishResult<Entity> {
        let entity = self
            .publication
            .update_entity(entity, &self.author_id, change_description)
            .await?;
        self.entities_updated.fetch_add(1, Ordering::Relaxed);
        Ok(entity)
    }

    pub async fn create_relationship(
        &self,
        draft: NewRelationship,
        change_description: &str,
    ) -> PublishResult<Relationship> {
        let relationship = self
            .publication
            .create_relationship(draft, &self.author_id, change_description)
            .await?;
        self.relationships_created.fetch_add(1, Ordering::Relaxed);
        Ok(relationship)
    }

    pub async fn update_relationship(
        &self,
        relationship: Relationship,
        change_description: &str,
    ) -> PublishResult<Relationship> {
        let relationship = self
            .publication
            .update_relationship(relationship, &self.author_id, change_description)
            .await?;
        self.relationships_updated.fetch_add(1, Ordering::Relaxed);
        Ok(relationship)
    }

    pub async fn update_entity_with_relationships(
        &self,
        entity: Entity,
        relationships: Vec<NewRelationship>,
        change_description: &str,
    ) -> PublishResult<(Entity, Vec<Relationship>)> {
        let (entity, relationships) = self
            .publication
            .update_entity_with_relationships(
                entity,
                relationships,
                &self.author_id,
                change_description,
            )
            .await?;
        self.entities_updated.fetch_add(1, Ordering::Relaxed);
        self.relationships_created
            .fetch_add(relationships.len() as u64, Ordering::Relaxed);
        Ok((entity, relationships))
    }

    pub async fn batch_create_entities(
        &self,
        drafts: Vec<NewEntity>,
        change_description: &str,
    ) -> PublishResult<Vec<Entity>> {
        let entities = self
            .publication
            .batch_create_entities(drafts, &self.author_id, change_description)
            .await?;
        self.entities_created
            .fetch_add(entities.len() as u64, Ordering::Relaxed);
        Ok(entities)
    }

    pub async fn get_entity(&self, id: &EntityId) -> PublishResult<Option<Entity>> {
        self.publication.get_entity(id).await
    }

    pub async fn get_relationship(
        &self,
        id: &RelationshipId,
    ) -> PublishResult<Option<Relationship>> {
        self.publication.get_relationship(id).await
    }

    // ── Data files ────────────────────────────────────────────────

    /// Resolves a path inside the migration directory, rejecting
    /// absolute paths and traversal outside it.
    pub fn data_path(&self, relative: impl AsRef<Path>) -> anyhow::Result<PathBuf> {
        let relative = relative.as_ref();
        if relative.is_absolute() {
            bail!("data path must be relative: {}", relative.display());
        }
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            bail!(
                "data path escapes the migration directory: {}",
                relative.display()
            );
        }
        Ok(self.dir.join(relative))
    }

    pub async fn read_to_string(&self, relative: impl AsRef<Path>) -> anyhow::Result<String> {
        let path = self.data_path(relative)?;
        tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))
    }

    pub async fn read_json<T: DeserializeOwned>(
        &self,
        relative: impl AsRef<Path>,
    ) -> anyhow::Result<T> {
        let path = self.data_path(relative)?;
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_slice(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// Reads a CSV file with a header row into typed records.
    pub async fn read_csv<T: DeserializeOwned>(
        &self,
        relative: impl AsRef<Path>,
    ) -> anyhow::Result<Vec<T>> {
        let path = self.data_path(relative)?;
        let content = tokio::fs::read(&path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let mut reader = csv::Reader::from_reader(content.as_slice());
        let mut records = Vec::new();
        for record in reader.deserialize() {
            records.push(record.with_context(|| format!("parsing {}", path.display()))?);
        }
        Ok(records)
    }
}
