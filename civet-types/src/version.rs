//! Version records and author attribution.
//!
//! A version is an immutable, sequentially numbered snapshot of an entity or
//! relationship. Numbers start at 1 and are strictly increasing with no gaps;
//! a written version record is never mutated.

use crate::ids::{AuthorId, OwnerId, VersionId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Origin of an author record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    Human,
    #[default]
    System,
    Migration,
}

/// The attributed originator of a mutation. Created lazily on first
/// reference; any well-formed id is accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    pub slug: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default)]
    pub kind: AuthorKind,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl Author {
    pub fn new(slug: impl Into<String>, kind: AuthorKind) -> Self {
        Self {
            slug: slug.into(),
            display_name: None,
            kind,
            metadata: serde_json::Map::new(),
        }
    }

    pub fn from_id(id: &AuthorId, kind: AuthorKind) -> Self {
        Self::new(id.slug(), kind)
    }

    /// Fails when the slug is malformed (possible for hand-edited files).
    pub fn id(&self) -> Result<AuthorId, crate::error::ModelError> {
        AuthorId::new(&self.slug)
    }
}

/// Summary of the latest version of an entity or relationship, embedded in
/// the owning object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionSummary {
    pub owner: OwnerId,
    pub version_number: u32,
    pub author: Author,
    pub change_description: String,
    pub created_at: DateTime<Utc>,
}

impl VersionSummary {
    pub fn id(&self) -> VersionId {
        VersionId::new(self.owner.clone(), self.version_number)
    }
}

/// A full version record: the summary plus the serialized snapshot of the
/// owning object exactly as of the mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Version {
    #[serde(flatten)]
    pub summary: VersionSummary,
    pub snapshot: serde_json::Value,
}

impl Version {
    pub fn id(&self) -> VersionId {
        self.summary.id()
    }

    pub fn version_number(&self) -> u32 {
        self.summary.version_number
    }
}
