//! The entity model: a person, organization, or location record with
//! multilingual names and open-ended attributes.

use crate::error::ModelError;
use crate::ids::{EntityId, EntityType, is_valid_slug};
use crate::name::{Name, NameKind};
use crate::version::VersionSummary;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An external identifier for an entity, e.g. a wikidata QID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalIdentifier {
    pub scheme: String,
    pub value: String,
}

/// A civic entity. Invariants (enforced by [`Entity::validate`], called by
/// the publication service before every persist):
///
/// - exactly one name with kind PRIMARY,
/// - kebab-case slug, unique per (type, sub_type) by construction of the id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub slug: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_type: Option<String>,
    pub names: Vec<Name>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<ExternalIdentifier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    pub version: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Entity {
    pub fn id(&self) -> Result<EntityId, ModelError> {
        EntityId::new(self.entity_type, self.sub_type.as_deref(), &self.slug)
    }

    /// The single PRIMARY name, if the entity is valid.
    pub fn primary_name(&self) -> Option<&Name> {
        self.names.iter().find(|n| n.kind == NameKind::Primary)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if !is_valid_slug(&self.slug) {
            return Err(ModelError::Validation(format!(
                "invalid slug: {:?}",
                self.slug
            )));
        }
        let primary_count = self
            .names
            .iter()
            .filter(|n| n.kind == NameKind::Primary)
            .count();
        if primary_count != 1 {
            return Err(ModelError::Validation(format!(
                "entity must have exactly one PRIMARY name, found {primary_count}"
            )));
        }
        for name in &self.names {
            name.validate()?;
        }
        Ok(())
    }
}
