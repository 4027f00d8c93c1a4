//! The relationship model: a typed, optionally time-bounded edge between
//! two entities.

use crate::error::ModelError;
use crate::ids::{EntityId, RelationshipId};
use crate::version::VersionSummary;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A directed edge between two entities. The kind is a free-form tag
/// (`MEMBER_OF`, `LOCATED_IN`, ...). Both endpoints must resolve to existing
/// entities at write time; the publication service enforces that.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    pub source: EntityId,
    pub target: EntityId,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
    pub version: VersionSummary,
    pub created_at: DateTime<Utc>,
}

impl Relationship {
    pub fn id(&self) -> Result<RelationshipId, ModelError> {
        RelationshipId::new(self.source.clone(), self.target.clone(), &self.kind)
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.kind.is_empty() {
            return Err(ModelError::Validation(
                "relationship kind must not be empty".into(),
            ));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date)
            && end < start
        {
            return Err(ModelError::Validation(format!(
                "end_date {end} precedes start_date {start}"
            )));
        }
        Ok(())
    }

    /// True when the relationship was active on the given date. Open ends
    /// are treated as unbounded.
    pub fn active_on(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start_date
            && start > date
        {
            return false;
        }
        if let Some(end) = self.end_date
            && end < date
        {
            return false;
        }
        true
    }

    /// True when the relationship has no end date.
    pub fn currently_active(&self) -> bool {
        self.end_date.is_none()
    }
}
