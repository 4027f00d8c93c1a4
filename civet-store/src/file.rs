//! Direct-to-disk store: one JSON file per object under a root directory,
//! laid out by the id-derived paths from `civet_types`.

use crate::cache::{CacheStats, TtlCache};
use crate::error::{StoreError, StoreResult};
use crate::store::EntityStore;
use async_trait::async_trait;
use civet_types::{
    Author, AuthorId, Entity, EntityId, EntityType, OwnerId, Relationship, RelationshipId,
    Version, VersionId,
};
use futures::future::join_all;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

/// Tuning knobs for [`FileStore`].
#[derive(Debug, Clone)]
pub struct FileStoreOptions {
    /// TTL for the read cache; `None` disables caching entirely.
    pub cache_ttl: Option<Duration>,
    /// Maximum cached objects per object kind.
    pub cache_capacity: usize,
    /// Upper bound on concurrent file reads during batch operations.
    pub read_concurrency: usize,
}

impl Default for FileStoreOptions {
    fn default() -> Self {
        Self {
            cache_ttl: Some(Duration::from_secs(300)),
            cache_capacity: 10_000,
            read_concurrency: 32,
        }
    }
}

/// File-backed document store.
///
/// Writes are atomic per object: content goes to a `.tmp` sibling which is
/// then renamed over the destination, so a concurrent reader sees either
/// the old document or the new one, never a torn file.
pub struct FileStore {
    root: PathBuf,
    entity_cache: Option<TtlCache<Entity>>,
    relationship_cache: Option<TtlCache<Relationship>>,
    read_permits: Semaphore,
}

impl FileStore {
    /// Opens a store rooted at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>, options: FileStoreOptions) -> StoreResult<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self {
            root,
            entity_cache: options
                .cache_ttl
                .map(|ttl| TtlCache::new(ttl, options.cache_capacity)),
            relationship_cache: options
                .cache_ttl
                .map(|ttl| TtlCache::new(ttl, options.cache_capacity)),
            read_permits: Semaphore::new(options.read_concurrency.max(1)),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Combined statistics for the entity and relationship caches, `None`
    /// when caching is disabled.
    pub fn cache_stats(&self) -> Option<(CacheStats, CacheStats)> {
        match (&self.entity_cache, &self.relationship_cache) {
            (Some(e), Some(r)) => Some((e.stats(), r.stats())),
            _ => None,
        }
    }

    pub fn clear_caches(&self) {
        if let Some(cache) = &self.entity_cache {
            cache.clear();
        }
        if let Some(cache) = &self.relationship_cache {
            cache.clear();
        }
    }

    /// Drops expired cache entries, returning how many were removed.
    pub fn sweep_caches(&self) -> usize {
        let mut dropped = 0;
        if let Some(cache) = &self.entity_cache {
            dropped += cache.sweep_expired();
        }
        if let Some(cache) = &self.relationship_cache {
            dropped += cache.sweep_expired();
        }
        dropped
    }

    // ── File plumbing ─────────────────────────────────────────────

    async fn read_doc_at<T: DeserializeOwned>(path: &Path) -> StoreResult<Option<T>> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|source| StoreError::Corrupt {
                    path: path.to_owned(),
                    source,
                }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_doc<T: DeserializeOwned>(&self, rel: &Path) -> StoreResult<Option<T>> {
        Self::read_doc_at(&self.root.join(rel)).await
    }

    async fn write_doc<T: Serialize>(&self, rel: &Path, doc: &T) -> StoreResult<()> {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Round-tripping through Value sorts object keys, which keeps the
        // files diffable under version control.
        let value = serde_json::to_value(doc)?;
        let mut bytes = serde_json::to_vec_pretty(&value)?;
        bytes.push(b'\n');
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &path).await?;
        debug!(path = %path.display(), "wrote document");
        Ok(())
    }

    async fn delete_doc(&self, rel: &Path) -> StoreResult<bool> {
        let path = self.root.join(rel);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!(path = %path.display(), "deleted document");
                Ok(true)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All `.json` files under `dir`, recursively, in stable (sorted) order.
    /// A missing directory is an empty partition, not an error.
    async fn collect_json_files(dir: PathBuf) -> StoreResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut stack = vec![dir];
        while let Some(dir) = stack.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    stack.push(path);
                } else if path.extension().is_some_and(|ext| ext == "json") {
                    files.push(path);
                }
            }
        }
        files.sort();
        Ok(files)
    }

    /// Reads and parses every file in `files`, logging and skipping any
    /// that fail to parse.
    async fn read_all_lenient<T: DeserializeOwned>(files: Vec<PathBuf>) -> StoreResult<Vec<T>> {
        let mut docs = Vec::with_capacity(files.len());
        for path in files {
            match Self::read_doc_at(&path).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(StoreError::Corrupt { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping corrupt document");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl EntityStore for FileStore {
    async fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>> {
        let key = id.to_string();
        if let Some(cache) = &self.entity_cache
            && let Some(hit) = cache.get(&key)
        {
            return Ok(Some(hit));
        }
        // Capture the generation before touching disk: a write that lands
        // during the read invalidates the key, and filling past that would
        // pin the pre-write document for a full TTL.
        let generation = self.entity_cache.as_ref().map(TtlCache::generation);
        let entity: Option<Entity> = self.read_doc(&id.storage_path()).await?;
        if let (Some(cache), Some(entity), Some(generation)) =
            (&self.entity_cache, &entity, generation)
        {
            cache.insert_if_fresh(&key, entity.clone(), generation);
        }
        Ok(entity)
    }

    async fn put_entity(&self, entity: &Entity) -> StoreResult<()> {
        let id = entity.id()?;
        self.write_doc(&id.storage_path(), entity).await?;
        if let Some(cache) = &self.entity_cache {
            cache.invalidate(&id.to_string());
        }
        Ok(())
    }

    async fn delete_entity(&self, id: &EntityId) -> StoreResult<bool> {
        let removed = self.delete_doc(&id.storage_path()).await?;
        if let Some(cache) = &self.entity_cache {
            cache.invalidate(&id.to_string());
        }
        Ok(removed)
    }

    async fn list_entities(
        &self,
        entity_type: Option<EntityType>,
        sub_type: Option<&str>,
    ) -> StoreResult<Vec<Entity>> {
        let mut dir = self.root.join("entity");
        if let Some(ty) = entity_type {
            dir.push(ty.as_str());
            if let Some(st) = sub_type {
                dir.push(st);
            }
        }
        let files = Self::collect_json_files(dir).await?;
        Self::read_all_lenient(files).await
    }

    async fn batch_get_entities(
        &self,
        ids: &[EntityId],
    ) -> StoreResult<HashMap<EntityId, Entity>> {
        let reads = ids.iter().map(|id| async move {
            // The semaphore is never closed; acquire cannot fail in practice.
            let _permit = self.read_permits.acquire().await.ok();
            (id.clone(), self.get_entity(id).await)
        });
        let mut out = HashMap::with_capacity(ids.len());
        for (id, result) in join_all(reads).await {
            match result {
                Ok(Some(entity)) => {
                    out.insert(id, entity);
                }
                Ok(None) => {}
                Err(StoreError::Corrupt { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping corrupt entity in batch");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }

    async fn get_relationship(&self, id: &RelationshipId) -> StoreResult<Option<Relationship>> {
        let key = id.to_string();
        if let Some(cache) = &self.relationship_cache
            && let Some(hit) = cache.get(&key)
        {
            return Ok(Some(hit));
        }
        let generation = self.relationship_cache.as_ref().map(TtlCache::generation);
        let relationship: Option<Relationship> = self.read_doc(&id.storage_path()).await?;
        if let (Some(cache), Some(rel), Some(generation)) =
            (&self.relationship_cache, &relationship, generation)
        {
            cache.insert_if_fresh(&key, rel.clone(), generation);
        }
        Ok(relationship)
    }

    async fn put_relationship(&self, relationship: &Relationship) -> StoreResult<()> {
        let id = relationship.id()?;
        self.write_doc(&id.storage_path(), relationship).await?;
        if let Some(cache) = &self.relationship_cache {
            cache.invalidate(&id.to_string());
        }
        Ok(())
    }

    async fn delete_relationship(&self, id: &RelationshipId) -> StoreResult<bool> {
        let removed = self.delete_doc(&id.storage_path()).await?;
        if let Some(cache) = &self.relationship_cache {
            cache.invalidate(&id.to_string());
        }
        Ok(removed)
    }

    async fn list_relationships(&self) -> StoreResult<Vec<Relationship>> {
        let files = Self::collect_json_files(self.root.join("relationship")).await?;
        Self::read_all_lenient(files).await
    }

    async fn get_version(&self, id: &VersionId) -> StoreResult<Option<Version>> {
        self.read_doc(&id.storage_path()).await
    }

    async fn put_version(&self, version: &Version) -> StoreResult<()> {
        self.write_doc(&version.id().storage_path(), version).await
    }

    async fn list_versions(&self, owner: &OwnerId) -> StoreResult<Vec<Version>> {
        let dir = self.root.join(owner.version_dir());
        let mut numbered: Vec<(u32, PathBuf)> = Self::collect_json_files(dir)
            .await?
            .into_iter()
            .filter_map(|path| {
                let n: u32 = path.file_stem()?.to_str()?.parse().ok()?;
                Some((n, path))
            })
            .collect();
        numbered.sort_by_key(|(n, _)| *n);
        let mut versions = Vec::with_capacity(numbered.len());
        for (_, path) in numbered {
            match Self::read_doc_at(&path).await {
                Ok(Some(version)) => versions.push(version),
                Ok(None) => {}
                Err(StoreError::Corrupt { path, source }) => {
                    warn!(path = %path.display(), error = %source, "skipping corrupt version record");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(versions)
    }

    async fn latest_version_number(&self, owner: &OwnerId) -> StoreResult<u32> {
        let dir = self.root.join(owner.version_dir());
        let latest = Self::collect_json_files(dir)
            .await?
            .into_iter()
            .filter_map(|path| path.file_stem()?.to_str()?.parse::<u32>().ok())
            .max()
            .unwrap_or(0);
        Ok(latest)
    }

    async fn get_author(&self, id: &AuthorId) -> StoreResult<Option<Author>> {
        self.read_doc(&id.storage_path()).await
    }

    async fn put_author(&self, author: &Author) -> StoreResult<()> {
        let id = author.id()?;
        self.write_doc(&id.storage_path(), author).await
    }
}
