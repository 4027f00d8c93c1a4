//! Read-only traversal and rendering of the relationship graph.

use crate::error::PublishResult;
use civet_store::EntityStore;
use civet_types::{Entity, EntityId, Relationship};
use serde_json::json;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;

/// Which edges to follow from an entity during traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// Output format for [`GraphService::render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphFormat {
    Dot,
    Mermaid,
    Json,
}

/// A relationship discovered during traversal, tagged with how many hops
/// from the start entity it was found at (1 for direct edges).
#[derive(Debug, Clone, PartialEq)]
pub struct TraversedRelationship {
    pub relationship: Relationship,
    pub depth: u32,
}

/// Read-only queries over the relationship graph.
///
/// Each call materializes the graph from one full relationship listing,
/// so it sees a single consistent snapshot of the store and never issues
/// per-hop reads.
pub struct GraphService {
    store: Arc<dyn EntityStore>,
}

impl GraphService {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self { store }
    }

    /// Breadth-first traversal from `start`, up to `depth` hops (`None`
    /// for unbounded). Each relationship appears once, at the shallowest
    /// depth it is reachable.
    pub async fn traverse(
        &self,
        start: &EntityId,
        direction: Direction,
        depth: Option<u32>,
    ) -> PublishResult<Vec<TraversedRelationship>> {
        let relationships = self.store.list_relationships().await?;
        let by_source = index_by(&relationships, |r| &r.source);
        let by_target = index_by(&relationships, |r| &r.target);

        let mut visited_entities: HashSet<EntityId> = HashSet::from([start.clone()]);
        let mut visited_edges: HashSet<String> = HashSet::new();
        let mut results = Vec::new();
        let mut queue = VecDeque::from([(start.clone(), 0u32)]);

        while let Some((current, at)) = queue.pop_front() {
            if depth.is_some_and(|limit| at >= limit) {
                continue;
            }
            let mut edges: Vec<&Relationship> = Vec::new();
            if direction != Direction::Incoming
                && let Some(out) = by_source.get(&current)
            {
                edges.extend(out.iter().copied());
            }
            if direction != Direction::Outgoing
                && let Some(inc) = by_target.get(&current)
            {
                edges.extend(inc.iter().copied());
            }
            for rel in edges {
                let Ok(rel_id) = rel.id() else { continue };
                if !visited_edges.insert(rel_id.to_string()) {
                    continue;
                }
                results.push(TraversedRelationship {
                    relationship: (*rel).clone(),
                    depth: at + 1,
                });
                let next = if rel.source == current {
                    rel.target.clone()
                } else {
                    rel.source.clone()
                };
                if visited_entities.insert(next.clone()) {
                    queue.push_back((next, at + 1));
                }
            }
        }
        debug!(start = %start, edges = results.len(), "graph traversal complete");
        Ok(results)
    }

    /// Shortest relationship path from `source` to `target`, following
    /// outgoing edges only. `Ok(Some(vec![]))` when the two are the same
    /// entity, `Ok(None)` when no path exists within `max_depth`.
    pub async fn find_path(
        &self,
        source: &EntityId,
        target: &EntityId,
        max_depth: Option<u32>,
    ) -> PublishResult<Option<Vec<Relationship>>> {
        if source == target {
            return Ok(Some(Vec::new()));
        }
        let relationships = self.store.list_relationships().await?;
        let by_source = index_by(&relationships, |r| &r.source);

        let mut visited: HashSet<EntityId> = HashSet::from([source.clone()]);
        let mut queue: VecDeque<(EntityId, Vec<Relationship>, u32)> =
            VecDeque::from([(source.clone(), Vec::new(), 0)]);

        while let Some((current, path, at)) = queue.pop_front() {
            if max_depth.is_some_and(|limit| at >= limit) {
                continue;
            }
            let Some(edges) = by_source.get(&current) else {
                continue;
            };
            for &rel in edges {
                let mut next_path = path.clone();
                next_path.push((*rel).clone());
                if rel.target == *target {
                    return Ok(Some(next_path));
                }
                if visited.insert(rel.target.clone()) {
                    queue.push_back((rel.target.clone(), next_path, at + 1));
                }
            }
        }
        Ok(None)
    }

    /// Renders the neighborhood of `start` (both directions, depth-bounded)
    /// as a DOT digraph, a Mermaid diagram, or a JSON node/edge document.
    /// Nodes whose entity no longer resolves are labeled by their id.
    pub async fn render(
        &self,
        start: &EntityId,
        format: GraphFormat,
        depth: Option<u32>,
    ) -> PublishResult<String> {
        let edges = self.traverse(start, Direction::Both, depth).await?;

        let mut ids: Vec<EntityId> = vec![start.clone()];
        for edge in &edges {
            ids.push(edge.relationship.source.clone());
            ids.push(edge.relationship.target.clone());
        }
        ids.sort_by_key(|id| id.to_string());
        ids.dedup();

        let entities = self.store.batch_get_entities(&ids).await?;
        let nodes: Vec<(EntityId, String)> = ids
            .into_iter()
            .map(|id| {
                let label = entities.get(&id).map_or_else(|| id.to_string(), display_name);
                (id, label)
            })
            .collect();

        match format {
            GraphFormat::Dot => Ok(render_dot(&nodes, &edges)),
            GraphFormat::Mermaid => Ok(render_mermaid(&nodes, &edges)),
            GraphFormat::Json => render_json(&nodes, &entities, &edges),
        }
    }
}

fn index_by<'a>(
    relationships: &'a [Relationship],
    key: impl Fn(&'a Relationship) -> &'a EntityId,
) -> HashMap<&'a EntityId, Vec<&'a Relationship>> {
    let mut index: HashMap<&EntityId, Vec<&Relationship>> = HashMap::new();
    for rel in relationships {
        index.entry(key(rel)).or_default().push(rel);
    }
    index
}

/// Label for a graph node: the PRIMARY name's English text, falling back
/// to Devanagari, then to the slug.
fn display_name(entity: &Entity) -> String {
    entity
        .primary_name()
        .or_else(|| entity.names.first())
        .and_then(|name| name.languages().next())
        .map_or_else(|| entity.slug.clone(), |parts| parts.full.clone())
}

fn render_dot(nodes: &[(EntityId, String)], edges: &[TraversedRelationship]) -> String {
    let mut lines = vec![
        "digraph G {".to_owned(),
        "  rankdir=LR;".to_owned(),
        "  node [shape=box];".to_owned(),
        String::new(),
    ];
    for (id, label) in nodes {
        let label = label.replace('"', "\\\"");
        lines.push(format!("  \"{id}\" [label=\"{label}\"];"));
    }
    lines.push(String::new());
    for edge in edges {
        let rel = &edge.relationship;
        lines.push(format!(
            "  \"{}\" -> \"{}\" [label=\"{}\"];",
            rel.source, rel.target, rel.kind
        ));
    }
    lines.push("}".to_owned());
    lines.join("\n")
}

fn render_mermaid(nodes: &[(EntityId, String)], edges: &[TraversedRelationship]) -> String {
    let mut lines = vec!["graph LR".to_owned()];
    // Mermaid node names cannot carry the ':' and '/' from entity ids.
    let mut aliases: HashMap<&EntityId, String> = HashMap::new();
    for (i, (id, label)) in nodes.iter().enumerate() {
        let alias = format!("N{i}");
        lines.push(format!("  {alias}[\"{label}\"]"));
        aliases.insert(id, alias);
    }
    for edge in edges {
        let rel = &edge.relationship;
        if let (Some(source), Some(target)) =
            (aliases.get(&rel.source), aliases.get(&rel.target))
        {
            lines.push(format!("  {source} -->|{}| {target}", rel.kind));
        }
    }
    lines.join("\n")
}

fn render_json(
    nodes: &[(EntityId, String)],
    entities: &HashMap<EntityId, Entity>,
    edges: &[TraversedRelationship],
) -> PublishResult<String> {
    let nodes_json: Vec<serde_json::Value> = nodes
        .iter()
        .map(|(id, label)| {
            let mut node = json!({ "id": id.to_string(), "name": label });
            if let Some(entity) = entities.get(id) {
                node["type"] = json!(entity.entity_type);
                node["sub_type"] = json!(entity.sub_type);
            }
            node
        })
        .collect();
    let edges_json: Vec<serde_json::Value> = edges
        .iter()
        .map(|edge| {
            let rel = &edge.relationship;
            json!({
                "source": rel.source.to_string(),
                "target": rel.target.to_string(),
                "kind": rel.kind,
                "start_date": rel.start_date,
                "end_date": rel.end_date,
            })
        })
        .collect();
    let doc = json!({ "nodes": nodes_json, "edges": edges_json });
    Ok(serde_json::to_string_pretty(&doc).map_err(civet_store::StoreError::from)?)
}
