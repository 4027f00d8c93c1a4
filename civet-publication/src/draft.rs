//! Draft objects submitted to the publication service. They carry the
//! caller-supplied fields only; version attribution and timestamps are
//! filled in by the service.

use civet_types::{
    EntityId, EntityType, ExternalIdentifier, ModelError, Name, RelationshipId,
};
use chrono::NaiveDate;

/// A new entity as submitted by a caller.
#[derive(Debug, Clone)]
pub struct NewEntity {
    pub slug: String,
    pub entity_type: EntityType,
    pub sub_type: Option<String>,
    pub names: Vec<Name>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub identifiers: Vec<ExternalIdentifier>,
    pub tags: Option<Vec<String>>,
}

impl NewEntity {
    pub fn new(entity_type: EntityType, slug: impl Into<String>, names: Vec<Name>) -> Self {
        Self {
            slug: slug.into(),
            entity_type,
            sub_type: None,
            names,
            attributes: serde_json::Map::new(),
            identifiers: Vec::new(),
            tags: None,
        }
    }

    pub fn with_sub_type(mut self, sub_type: impl Into<String>) -> Self {
        self.sub_type = Some(sub_type.into());
        self
    }

    pub fn id(&self) -> Result<EntityId, ModelError> {
        EntityId::new(self.entity_type, self.sub_type.as_deref(), &self.slug)
    }
}

/// A new relationship as submitted by a caller. The id is derived from
/// source, target, and kind.
#[derive(Debug, Clone)]
pub struct NewRelationship {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: String,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl NewRelationship {
    pub fn new(source: EntityId, target: EntityId, kind: impl Into<String>) -> Self {
        Self {
            source,
            target,
            kind: kind.into(),
            start_date: None,
            end_date: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn id(&self) -> Result<RelationshipId, ModelError> {
        RelationshipId::new(self.source.clone(), self.target.clone(), &self.kind)
    }
}
