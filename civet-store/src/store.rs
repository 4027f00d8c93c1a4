//! The storage contract shared by all backends.

use crate::error::StoreResult;
use async_trait::async_trait;
use civet_types::{
    Author, AuthorId, Entity, EntityId, EntityType, OwnerId, Relationship, RelationshipId,
    Version, VersionId,
};
use std::collections::HashMap;

/// Abstract document store for registry objects.
///
/// Point lookups return `Ok(None)` for missing objects; deletes report
/// whether anything was removed. List operations skip unreadable files
/// after logging them, so one corrupt document cannot take down a scan.
#[async_trait]
pub trait EntityStore: Send + Sync {
    // Entities

    async fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>>;

    async fn put_entity(&self, entity: &Entity) -> StoreResult<()>;

    async fn delete_entity(&self, id: &EntityId) -> StoreResult<bool>;

    /// Lists entities, optionally narrowed to a type and sub-type
    /// partition. `sub_type` is only meaningful together with a type.
    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        sub_type: Option<&str>,
    ) -> StoreResult<Vec<Entity>>;

    /// Fetches many entities at once. Missing ids are simply absent from
    /// the result map; partial results are not an error.
    async fn batch_get_entities(
        &self,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, Entity>>;

    // Relationships

    async fn get_relationship(&self, id: &RelationshipId) -> StoreResult<Option<Relationship>>;

    async fn put_relationship(&self, relationship: &Relationship) -> StoreResult<()>;

    async fn delete_relationship(&self, id: &RelationshipId) -> StoreResult<bool>;

    async fn list_relationships(&self) -> StoreResult<Vec<Relationship>>;

    // Versions

    async fn get_version(&self, id: &VersionId) -> StoreResult<Option<Version>>;

    async fn put_version(&self, version: &Version) -> StoreResult<()>;

    /// All version records for an owner, ascending by version number.
    async fn list_versions(&self, owner: &OwnerId) -> StoreResult<Vec<Version>>;

    /// Highest persisted version number for an owner, 0 when none exist.
    /// Derived from the version directory listing, so it stays correct
    /// even if an individual record fails to parse.
    async fn latest_version_number(&self, owner: &OwnerId) -> StoreResult<u32>;

    // Authors

    async fn get_author(&self, id: &AuthorId) -> StoreResult<Option<Author>>;

    async fn put_author(&self, author: &Author) -> StoreResult<()>;
}
