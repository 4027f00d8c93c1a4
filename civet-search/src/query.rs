//! Query parameter objects.

use chrono::NaiveDate;
use civet_types::{EntityId, EntityType};

/// Parameters for an entity search. All filters are optional and
/// AND-combined.
#[derive(Debug, Clone, Default)]
pub struct EntityQuery {
    /// Substring matched case-insensitively against every name field in
    /// every language; drives relevance ranking.
    pub name: Option<String>,
    pub entity_type: Option<EntityType>,
    pub sub_type: Option<String>,
    /// Exact-match attribute filters, all of which must hold.
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub offset: usize,
    pub limit: Option<usize>,
}

impl EntityQuery {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }
}

/// Parameters for a relationship search.
#[derive(Debug, Clone, Default)]
pub struct RelationshipQuery {
    pub source: Option<EntityId>,
    pub target: Option<EntityId>,
    pub kind: Option<String>,
    /// Keep only relationships active on this date (open start/end dates
    /// are treated as unbounded).
    pub active_on: Option<NaiveDate>,
    /// `Some(true)` keeps open-ended relationships only, `Some(false)`
    /// keeps ended ones only.
    pub currently_active: Option<bool>,
    pub offset: usize,
    pub limit: Option<usize>,
}
