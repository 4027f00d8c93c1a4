//! Read-only in-memory replica, loaded once from a [`FileStore`].

use crate::error::{StoreError, StoreResult};
use crate::file::FileStore;
use crate::store::EntityStore;
use async_trait::async_trait;
use civet_types::{
    Author, AuthorId, Entity, EntityId, EntityType, OwnerId, Relationship, RelationshipId,
    Version, VersionId,
};
use std::collections::HashMap;
use tracing::info;

/// Serves entity and relationship reads from maps warmed at construction.
///
/// Version and author lookups are rare enough that they delegate to the
/// underlying file store instead of being preloaded. Every write fails
/// with [`StoreError::ReadOnly`].
pub struct MemoryStore {
    entities: HashMap<EntityId, Entity>,
    relationships: HashMap<RelationshipId, Relationship>,
    inner: FileStore,
}

impl MemoryStore {
    /// Loads every entity and relationship from `store`. Corrupt files are
    /// skipped by the underlying listing, same as any scan.
    pub async fn load(store: FileStore) -> StoreResult<Self> {
        let mut entities = HashMap::new();
        for entity in store.list_entities(None, None).await? {
            entities.insert(entity.id()?, entity);
        }
        let mut relationships = HashMap::new();
        for relationship in store.list_relationships().await? {
            relationships.insert(relationship.id()?, relationship);
        }
        info!(
            entities = entities.len(),
            relationships = relationships.len(),
            "loaded in-memory store"
        );
        Ok(Self {
            entities,
            relationships,
            inner: store,
        })
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }
}

#[async_trait]
impl EntityStore for MemoryStore {
    async fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>> {
        Ok(self.entities.get(id).cloned())
    }

    async fn put_entity(&self, _entity: &Entity) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    async fn delete_entity(&self, _id: &EntityId) -> StoreResult<bool> {
        Err(StoreError::ReadOnly)
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        sub_type: Option<&str>,
    ) -> StoreResult<Vec<Entity>> {
        let mut matches: Vec<Entity> = self
            .entities
            .values()
            .filter(|e| entity_type.is_none_or(|ty| e.entity_type == ty))
            .filter(|e| sub_type.is_none_or(|st| e.sub_type.as_deref() == Some(st)))
            .cloned()
            .collect();
        matches.sort_by_key(|e| e.slug.clone());
        Ok(matches)
    }

    async fn batch_get_entities(
        &self,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, Entity>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.entities.get(id).map(|e| (id.clone(), e.clone())))
            .collect())
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StoreResult<Option<Relationship>> {
        Ok(self.relationships.get(id).cloned())
    }

    async fn put_relationship(&self, _relationship: &Relationship) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    async fn delete_relationship(&self, _id: &RelationshipId) -> StoreResult<bool> {
        Err(StoreError::ReadOnly)
    }

    async fn list_relationships(&self) -> StoreResult<Vec<Relationship>> {
        let mut all: Vec<Relationship> = self.relationships.values().cloned().collect();
        all.sort_by_key(|r| r.id().map(|id| id.to_string()).unwrap_or_default());
        Ok(all)
    }

    async fn get_version(&self, id: &VersionId) -> StoreResult<Option<Version>> {
        self.inner.get_version(id).await
    }

    async fn put_version(&self, _version: &Version) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }

    async fn list_versions(&self, owner: &OwnerId) -> StoreResult<Vec<Version>> {
        self.inner.list_versions(owner).await
    }

    async fn latest_version_number(&self, owner: &OwnerId) -> StoreResult<u32> {
        self.inner.latest_version_number(owner).await
    }

    async fn get_author(&self, id: &AuthorId) -> StoreResult<Option<Author>> {
        self.inner.get_author(id).await
    }

    async fn put_author(&self, _author: &Author) -> StoreResult<()> {
        Err(StoreError::ReadOnly)
    }
}
