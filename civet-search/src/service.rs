//! Search service and relevance scoring.

use crate::query::{EntityQuery, RelationshipQuery};
use civet_store::{EntityStore, StoreResult};
use civet_types::{Entity, EntityId, Name, NameKind, Relationship, RelationshipId, Version};
use std::sync::Arc;
use tracing::debug;

// Relevance weights. An exact full-name match dominates everything; the
// bonus keeps PRIMARY names ahead of aliases at equal match quality.
const SCORE_FULL_EXACT: u32 = 100;
const SCORE_FULL_CONTAINS: u32 = 50;
const SCORE_PART_EXACT: u32 = 75;
const SCORE_PART_CONTAINS: u32 = 25;
const BONUS_PRIMARY: u32 = 20;
const BONUS_OTHER: u32 = 10;

/// Score for matching `query` (already lowercased) against one name.
/// Zero means no match.
fn score_name(name: &Name, query: &str) -> u32 {
    let mut best = 0u32;
    for parts in name.languages() {
        let full = parts.full.to_lowercase();
        if full == query {
            best = best.max(SCORE_FULL_EXACT);
        } else if full.contains(query) {
            best = best.max(SCORE_FULL_CONTAINS);
        }
        for field in parts.fields().skip(1) {
            let field = field.to_lowercase();
            if field == query {
                best = best.max(SCORE_PART_EXACT);
            } else if field.contains(query) {
                best = best.max(SCORE_PART_CONTAINS);
            }
        }
    }
    if best == 0 {
        0
    } else if name.kind == NameKind::Primary {
        best + BONUS_PRIMARY
    } else {
        best + BONUS_OTHER
    }
}

/// Best score across all of an entity's names, zero when nothing matches.
fn relevance(entity: &Entity, query: &str) -> u32 {
    entity
        .names
        .iter()
        .map(|name| score_name(name, query))
        .max()
        .unwrap_or(0)
}

/// Read-only queries over a store. Works identically against a
/// [`civet_store::FileStore`] or a [`civet_store::MemoryStore`].
pub struct SearchService {
    store: Arc<dyn EntityStore>,
}

impl SearchService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Returns the matching page and the total number of matches before
    /// pagination. Ordering is relevance descending, then id ascending,
    /// so repeated queries page deterministically.
    pub async fn search_entities(
        &self,
        query: &EntityQuery,
    ) -> StoreResult<(Vec<Entity>, usize)> {
        let candidates = self
            .store
            .list_entities(query.entity_type, query.sub_type.as_deref())
            .await?;

        let needle = query
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut scored: Vec<(u32, String, Entity)> = Vec::new();
        for entity in candidates {
            if !attributes_match(&entity, &query.attributes) {
                continue;
            }
            let score = match &needle {
                Some(needle) => {
                    let score = relevance(&entity, needle);
                    if score == 0 {
                        continue;
                    }
                    score
                }
                None => 0,
            };
            let id = entity.id().map(|id| id.to_string()).unwrap_or_default();
            scored.push((score, id, entity));
        }

        scored.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
        let total = scored.len();
        debug!(total, query = ?query.name, "entity search");

        let page = scored
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, _, entity)| entity)
            .collect();
        Ok((page, total))
    }

    pub async fn search_relationships(
        &self,
        query: &RelationshipQuery,
    ) -> StoreResult<(Vec<Relationship>, usize)> {
        let mut matches: Vec<(String, Relationship)> = Vec::new();
        for relationship in self.store.list_relationships().await? {
            if let Some(source) = &query.source
                && &relationship.source != source
            {
                continue;
            }
            if let Some(target) = &query.target
                && &relationship.target != target
            {
                continue;
            }
            if let Some(kind) = &query.kind
                && &relationship.kind != kind
            {
                continue;
            }
            if let Some(date) = query.active_on
                && !relationship.active_on(date)
            {
                continue;
            }
            if let Some(active) = query.currently_active
                && relationship.currently_active() != active
            {
                continue;
            }
            let id = relationship
                .id()
                .map(|id| id.to_string())
                .unwrap_or_default();
            matches.push((id, relationship));
        }

        matches.sort_by(|a, b| a.0.cmp(&b.0));
        let total = matches.len();
        let page = matches
            .into_iter()
            .skip(query.offset)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|(_, relationship)| relationship)
            .collect();
        Ok((page, total))
    }

    pub async fn get_entity(&self, id: &EntityId) -> StoreResult<Option<Entity>> {
        self.store.get_entity(id).await
    }

    /// Full history for an entity, ascending by version number.
    pub async fn get_entity_versions(&self, id: &EntityId) -> StoreResult<Vec<Version>> {
        self.store.list_versions(&id.clone().into()).await
    }

    /// Full history for a relationship, ascending by version number.
    pub async fn get_relationship_versions(
        &self,
        id: &RelationshipId,
    ) -> StoreResult<Vec<Version>> {
        self.store.list_versions(&id.clone().into()).await
    }
}

fn attributes_match(
    entity: &Entity,
    filters: &serde_json::Map<String, serde_json::Value>,
) -> bool {
    filters
        .iter()
        .all(|(key, expected)| entity.attributes.get(key) == Some(expected))
}
