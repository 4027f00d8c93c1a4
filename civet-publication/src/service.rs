//! The publication service: the only component that writes to the store.

use crate::draft::{NewEntity, NewRelationship};
use crate::error::{PublishError, PublishResult};
use chrono::Utc;
use civet_store::EntityStore;
use civet_types::{
    Author, AuthorId, AuthorKind, Entity, EntityId, OwnerId, Relationship, RelationshipId,
    Version, VersionSummary,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Serializes mutations per object id and mints version records.
///
/// Writes to one id are strictly ordered by an id-keyed async lock, so
/// version numbers stay gapless under concurrency; writes to distinct ids
/// proceed in parallel. Every mutation persists the object first and its
/// version record second; if the version write fails the object write is
/// rolled back best-effort, so an object without its version record never
/// survives a clean failure path.
pub struct PublicationService {
    store: Arc<dyn EntityStore>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl PublicationService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // An entry only the map still references is idle; dropping it here
        // keeps the map bounded by the number of in-flight writes instead
        // of one entry per id ever written.
        locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(locks.entry(key.to_owned()).or_default())
    }

    /// Resolves the author, creating a system author record on first
    /// reference. Any well-formed author id is accepted.
    pub async fn get_or_create_author(&self, id: &AuthorId) -> PublishResult<Author> {
        if let Some(author) = self.store.get_author(id).await? {
            return Ok(author);
        }
        let author = Author::from_id(id, AuthorKind::System);
        self.store.put_author(&author).await?;
        info!(author = %id, "created author record");
        Ok(author)
    }

    fn summary(
        &self,
        owner: OwnerId,
        version_number: u32,
        author: Author,
        change_description: &str,
    ) -> VersionSummary {
        VersionSummary {
            owner,
            version_number,
            author,
            change_description: change_description.to_owned(),
            created_at: Utc::now(),
        }
    }

    // ── Entities ──────────────────────────────────────────────────

    pub async fn create_entity(
        &self,
        draft: NewEntity,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<Entity> {
        let id = draft.id()?;
        let author = self.get_or_create_author(author_id).await?;

        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;

        if self.store.get_entity(&id).await?.is_some() {
            return Err(PublishError::AlreadyExists(id.to_string()));
        }

        let owner = OwnerId::Entity(id.clone());
        // Version numbers continue across delete/recreate cycles, so the
        // number comes from the persisted history rather than starting at 1.
        let next = self.store.latest_version_number(&owner).await? + 1;
        let summary = self.summary(owner, next, author, change_description);
        let entity = Entity {
            slug: draft.slug,
            entity_type: draft.entity_type,
            sub_type: draft.sub_type,
            names: draft.names,
            attributes: draft.attributes,
            identifiers: draft.identifiers,
            tags: draft.tags,
            created_at: summary.created_at,
            version: summary,
        };
        entity.validate()?;

        self.store.put_entity(&entity).await?;
        self.write_version_or_undo_entity(&entity, None).await?;
        info!(entity = %id, version = next, "created entity");
        Ok(entity)
    }

    pub async fn update_entity(
        &self,
        entity: Entity,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<Entity> {
        let id = entity.id()?;
        entity.validate()?;
        let author = self.get_or_create_author(author_id).await?;

        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;

        let prior = self
            .store
            .get_entity(&id)
            .await?
            .ok_or_else(|| PublishError::NotFound(id.to_string()))?;

        let owner = OwnerId::Entity(id.clone());
        let next = self.store.latest_version_number(&owner).await? + 1;
        let mut updated = entity;
        updated.version = self.summary(owner, next, author, change_description);
        updated.created_at = prior.created_at;

        self.store.put_entity(&updated).await?;
        self.write_version_or_undo_entity(&updated, Some(&prior))
            .await?;
        info!(entity = %id, version = next, "updated entity");
        Ok(updated)
    }

    /// Removes the current object. Version history is retained, and the
    /// delete itself mints no version record. Returns `false` when the
    /// entity was already absent.
    pub async fn delete_entity(&self, id: &EntityId) -> PublishResult<bool> {
        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;
        let removed = self.store.delete_entity(id).await?;
        if removed {
            info!(entity = %id, "deleted entity");
        }
        Ok(removed)
    }

    pub async fn get_entity(&self, id: &EntityId) -> PublishResult<Option<Entity>> {
        Ok(self.store.get_entity(id).await?)
    }

    /// Creates entities one after another, stopping at the first failure.
    /// Entities created before the failure stay created.
    pub async fn batch_create_entities(
        &self,
        drafts: Vec<NewEntity>,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<Vec<Entity>> {
        let mut created = Vec::with_capacity(drafts.len());
        for draft in drafts {
            created.push(
                self.create_entity(draft, author_id, change_description)
                    .await?,
            );
        }
        Ok(created)
    }

    /// Persists the version record for `entity`; on failure rolls the
    /// object write back (restore `prior`, or delete when this was a
    /// create) and surfaces the version-write error.
    async fn write_version_or_undo_entity(
        &self,
        entity: &Entity,
        prior: Option<&Entity>,
    ) -> PublishResult<()> {
        let version = Version {
            summary: entity.version.clone(),
            snapshot: serde_json::to_value(entity).map_err(civet_store::StoreError::from)?,
        };
        if let Err(err) = self.store.put_version(&version).await {
            warn!(version = %version.id(), error = %err, "version write failed, undoing object write");
            let undo = match (prior, entity.id()) {
                (Some(prior), _) => self.store.put_entity(prior).await.map(|_| ()),
                (None, Ok(id)) => self.store.delete_entity(&id).await.map(|_| ()),
                (None, Err(_)) => Ok(()),
            };
            if let Err(undo_err) = undo {
                warn!(error = %undo_err, "rollback of object write failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    // ── Relationships ─────────────────────────────────────────────

    /// Fails with [`PublishError::DanglingReference`] naming whichever
    /// endpoint does not resolve; both endpoints are always checked.
    async fn check_endpoints(
        &self,
        source: &EntityId,
        target: &EntityId,
    ) -> PublishResult<()> {
        let mut missing = Vec::new();
        if self.store.get_entity(source).await?.is_none() {
            missing.push(source.to_string());
        }
        if self.store.get_entity(target).await?.is_none() {
            missing.push(target.to_string());
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(PublishError::DanglingReference(missing.join(", ")))
        }
    }

    pub async fn create_relationship(
        &self,
        draft: NewRelationship,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<Relationship> {
        let id = draft.id()?;
        self.check_endpoints(&draft.source, &draft.target).await?;
        let author = self.get_or_create_author(author_id).await?;

        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;

        if self.store.get_relationship(&id).await?.is_some() {
            return Err(PublishError::AlreadyExists(id.to_string()));
        }

        let owner = OwnerId::Relationship(id.clone());
        let next = self.store.latest_version_number(&owner).await? + 1;
        let summary = self.summary(owner, next, author, change_description);
        let relationship = Relationship {
            source: draft.source,
            target: draft.target,
            kind: draft.kind,
            start_date: draft.start_date,
            end_date: draft.end_date,
            attributes: draft.attributes,
            created_at: summary.created_at,
            version: summary,
        };
        relationship.validate()?;

        self.store.put_relationship(&relationship).await?;
        self.write_version_or_undo_relationship(&relationship, None)
            .await?;
        info!(relationship = %id, version = next, "created relationship");
        Ok(relationship)
    }

    pub async fn update_relationship(
        &self,
        relationship: Relationship,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<Relationship> {
        let id = relationship.id()?;
        relationship.validate()?;
        self.check_endpoints(&relationship.source, &relationship.target)
            .await?;
        let author = self.get_or_create_author(author_id).await?;

        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;

        let prior = self
            .store
            .get_relationship(&id)
            .await?
            .ok_or_else(|| PublishError::NotFound(id.to_string()))?;

        let owner = OwnerId::Relationship(id.clone());
        let next = self.store.latest_version_number(&owner).await? + 1;
        let mut updated = relationship;
        updated.version = self.summary(owner, next, author, change_description);
        updated.created_at = prior.created_at;

        self.store.put_relationship(&updated).await?;
        self.write_version_or_undo_relationship(&updated, Some(&prior))
            .await?;
        info!(relationship = %id, version = next, "updated relationship");
        Ok(updated)
    }

    pub async fn delete_relationship(&self, id: &RelationshipId) -> PublishResult<bool> {
        let lock = self.lock_for(&id.to_string());
        let _guard = lock.lock().await;
        let removed = self.store.delete_relationship(id).await?;
        if removed {
            info!(relationship = %id, "deleted relationship");
        }
        Ok(removed)
    }

    pub async fn get_relationship(
        &self,
        id: &RelationshipId,
    ) -> PublishResult<Option<Relationship>> {
        Ok(self.store.get_relationship(id).await?)
    }

    async fn write_version_or_undo_relationship(
        &self,
        relationship: &Relationship,
        prior: Option<&Relationship>,
    ) -> PublishResult<()> {
        let version = Version {
            summary: relationship.version.clone(),
            snapshot: serde_json::to_value(relationship)
                .map_err(civet_store::StoreError::from)?,
        };
        if let Err(err) = self.store.put_version(&version).await {
            warn!(version = %version.id(), error = %err, "version write failed, undoing object write");
            let undo = match (prior, relationship.id()) {
                (Some(prior), _) => self.store.put_relationship(prior).await.map(|_| ()),
                (None, Ok(id)) => self.store.delete_relationship(&id).await.map(|_| ()),
                (None, Err(_)) => Ok(()),
            };
            if let Err(undo_err) = undo {
                warn!(error = %undo_err, "rollback of object write failed");
            }
            return Err(err.into());
        }
        Ok(())
    }

    // ── Composite operations ──────────────────────────────────────

    /// Updates the entity and then creates the given relationships in
    /// order. On any failure the prior entity object is restored and the
    /// relationships created so far are deleted, best-effort, and the
    /// original error is returned. Version records minted before the
    /// failure remain; this path is not crash-safe.
    pub async fn update_entity_with_relationships(
        &self,
        entity: Entity,
        relationships: Vec<NewRelationship>,
        author_id: &AuthorId,
        change_description: &str,
    ) -> PublishResult<(Entity, Vec<Relationship>)> {
        let id = entity.id()?;
        let prior = self
            .store
            .get_entity(&id)
            .await?
            .ok_or_else(|| PublishError::NotFound(id.to_string()))?;

        let updated = self
            .update_entity(entity, author_id, change_description)
            .await?;

        let mut created: Vec<Relationship> = Vec::with_capacity(relationships.len());
        for draft in relationships {
            match self
                .create_relationship(draft, author_id, change_description)
                .await
            {
                Ok(relationship) => created.push(relationship),
                Err(err) => {
                    warn!(entity = %id, error = %err, "composite update failed, compensating");
                    if let Err(undo_err) = self.store.put_entity(&prior).await {
                        warn!(error = %undo_err, "failed to restore prior entity");
                    }
                    for relationship in &created {
                        match relationship.id() {
                            Ok(rel_id) => {
                                if let Err(undo_err) =
                                    self.store.delete_relationship(&rel_id).await
                                {
                                    warn!(error = %undo_err, "failed to delete compensated relationship");
                                }
                            }
                            Err(undo_err) => {
                                warn!(error = %undo_err, "failed to derive relationship id during compensation");
                            }
                        }
                    }
                    return Err(err);
                }
            }
        }
        debug!(entity = %id, relationships = created.len(), "composite update complete");
        Ok((updated, created))
    }
}
