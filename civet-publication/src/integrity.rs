//! Consistency checks over the relationship graph.
//!
//! Relationship ids are derived from (source, target, kind), so the store
//! cannot hold two files for the same edge through the service. These
//! checks cover the states that can still go wrong: entities deleted out
//! from under their edges, hierarchy edges that loop, and hand-edited
//! files whose content disagrees with the path they sit at.

use crate::error::PublishResult;
use civet_store::EntityStore;
use civet_types::{EntityId, Relationship, RelationshipId};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::warn;

/// Relationship kinds that form hierarchies and must stay acyclic.
pub const DEFAULT_HIERARCHICAL_KINDS: [&str; 3] = ["SUPERVISES", "PARENT_OF", "CHILD_OF"];

/// Read-only validation of the stored relationship graph.
pub struct IntegrityChecker {
    store: Arc<dyn EntityStore>,
    hierarchical_kinds: HashSet<String>,
}

impl IntegrityChecker {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self::with_hierarchical_kinds(store, DEFAULT_HIERARCHICAL_KINDS.map(str::to_owned))
    }

    /// Overrides which kinds count as hierarchical for the cycle checks.
    pub fn with_hierarchical_kinds(
        store: Arc<dyn EntityStore>,
        kinds: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            store,
            hierarchical_kinds: kinds.into_iter().collect(),
        }
    }

    /// True when adding `source -> target` of a hierarchical `kind` would
    /// close a loop. Non-hierarchical kinds never count as cycles; a
    /// self-reference always does.
    pub async fn would_create_cycle(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
    ) -> PublishResult<bool> {
        if !self.hierarchical_kinds.contains(kind) {
            return Ok(false);
        }
        if source == target {
            return Ok(true);
        }
        let relationships = self.store.list_relationships().await?;
        let adjacency = adjacency_of_kind(&relationships, kind);
        Ok(reaches(&adjacency, target, source))
    }

    /// True when the edge is already stored. Ids are derived, so this is
    /// a point read rather than a scan.
    pub async fn relationship_exists(
        &self,
        source: &EntityId,
        target: &EntityId,
        kind: &str,
    ) -> PublishResult<bool> {
        let id = RelationshipId::new(source.clone(), target.clone(), kind)?;
        Ok(self.store.get_relationship(&id).await?.is_some())
    }

    /// Relationships whose source or target entity no longer exists.
    /// Endpoint checks hold at write time only, so an entity delete can
    /// leave edges behind; this finds them for a corrective migration.
    pub async fn find_orphaned_relationships(&self) -> PublishResult<Vec<Relationship>> {
        let relationships = self.store.list_relationships().await?;
        let mut endpoints: Vec<EntityId> = Vec::with_capacity(relationships.len() * 2);
        for rel in &relationships {
            endpoints.push(rel.source.clone());
            endpoints.push(rel.target.clone());
        }
        endpoints.sort_by_key(ToString::to_string);
        endpoints.dedup();

        let existing = self.store.batch_get_entities(&endpoints).await?;
        let orphaned: Vec<Relationship> = relationships
            .into_iter()
            .filter(|rel| {
                !existing.contains_key(&rel.source) || !existing.contains_key(&rel.target)
            })
            .collect();
        if !orphaned.is_empty() {
            warn!(count = orphaned.len(), "found orphaned relationships");
        }
        Ok(orphaned)
    }

    /// All cycles among edges of `kind`, or among the configured
    /// hierarchical kinds when `None`. Each cycle is reported as the chain
    /// of relationships that closes it, and every relationship appears in
    /// at most one reported cycle.
    pub async fn find_cycles(&self, kind: Option<&str>) -> PublishResult<Vec<Vec<Relationship>>> {
        let all = self.store.list_relationships().await?;
        let candidates: Vec<&Relationship> = all
            .iter()
            .filter(|rel| match kind {
                Some(k) => rel.kind == k,
                None => self.hierarchical_kinds.contains(&rel.kind),
            })
            .collect();

        let mut cycles = Vec::new();
        let mut processed: HashSet<String> = HashSet::new();
        for rel in candidates {
            let Ok(rel_id) = rel.id() else { continue };
            if processed.contains(&rel_id.to_string()) {
                continue;
            }
            let adjacency = adjacency_of_kind(&all, &rel.kind);
            let mut visited = HashSet::new();
            let mut path = Vec::new();
            if close_cycle(&adjacency, &rel.target, &rel.source, &mut visited, &mut path) {
                let mut cycle = vec![rel.clone()];
                cycle.extend(path.into_iter().cloned());
                for member in &cycle {
                    if let Ok(id) = member.id() {
                        processed.insert(id.to_string());
                    }
                }
                cycles.push(cycle);
            }
        }
        Ok(cycles)
    }

    /// Groups of relationship documents sharing (source, target, kind).
    /// Under derived ids these only arise when a file's content disagrees
    /// with its path, e.g. after a hand edit in the data repository.
    pub async fn find_duplicate_relationships(&self) -> PublishResult<Vec<Vec<Relationship>>> {
        let relationships = self.store.list_relationships().await?;
        let mut groups: BTreeMap<String, Vec<Relationship>> = BTreeMap::new();
        for rel in relationships {
            let key = match rel.id() {
                Ok(id) => id.to_string(),
                Err(_) => format!("{}:{}:{}", rel.source, rel.target, rel.kind),
            };
            groups.entry(key).or_default().push(rel);
        }
        Ok(groups
            .into_values()
            .filter(|group| group.len() > 1)
            .collect())
    }
}

fn adjacency_of_kind<'a>(
    relationships: &'a [Relationship],
    kind: &str,
) -> HashMap<&'a EntityId, Vec<&'a Relationship>> {
    let mut adjacency: HashMap<&EntityId, Vec<&Relationship>> = HashMap::new();
    for rel in relationships.iter().filter(|rel| rel.kind == kind) {
        adjacency.entry(&rel.source).or_default().push(rel);
    }
    adjacency
}

/// Whether `to` is reachable from `from` along the adjacency edges.
fn reaches(
    adjacency: &HashMap<&EntityId, Vec<&Relationship>>,
    from: &EntityId,
    to: &EntityId,
) -> bool {
    let mut visited: HashSet<EntityId> = HashSet::from([from.clone()]);
    let mut queue = VecDeque::from([from.clone()]);
    while let Some(current) = queue.pop_front() {
        if current == *to {
            return true;
        }
        let Some(edges) = adjacency.get(&current) else {
            continue;
        };
        for rel in edges {
            if visited.insert(rel.target.clone()) {
                queue.push_back(rel.target.clone());
            }
        }
    }
    false
}

/// Depth-first walk from `current` looking for `target`; on success `path`
/// holds the relationships taken.
fn close_cycle<'a>(
    adjacency: &HashMap<&'a EntityId, Vec<&'a Relationship>>,
    current: &EntityId,
    target: &EntityId,
    visited: &mut HashSet<EntityId>,
    path: &mut Vec<&'a Relationship>,
) -> bool {
    if current == target {
        return true;
    }
    if !visited.insert(current.clone()) {
        return false;
    }
    let Some(edges) = adjacency.get(current) else {
        return false;
    };
    for &rel in edges {
        path.push(rel);
        if close_cycle(adjacency, &rel.target, target, visited, path) {
            return true;
        }
        path.pop();
    }
    false
}
