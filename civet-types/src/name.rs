//! Multilingual name records.

use crate::error::ModelError;
use serde::{Deserialize, Serialize};

/// Classification of a name record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NameKind {
    #[serde(rename = "PRIMARY")]
    Primary,
    #[serde(rename = "ALIAS")]
    Alias,
    #[serde(rename = "ALTERNATE")]
    Alternate,
    #[serde(rename = "BIRTH")]
    Birth,
    #[serde(rename = "OFFICIAL")]
    Official,
}

/// Component parts of a name in one language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameParts {
    pub full: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub middle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
}

impl NameParts {
    pub fn full(full: impl Into<String>) -> Self {
        Self {
            full: full.into(),
            given: None,
            middle: None,
            family: None,
        }
    }

    /// All populated fields, for text matching.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        [
            Some(self.full.as_str()),
            self.given.as_deref(),
            self.middle.as_deref(),
            self.family.as_deref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// A name with per-language parts. `en` holds English or romanized text,
/// `ne` holds Devanagari.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name {
    pub kind: NameKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub en: Option<NameParts>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<NameParts>,
}

impl Name {
    pub fn primary(en: NameParts) -> Self {
        Self {
            kind: NameKind::Primary,
            en: Some(en),
            ne: None,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.en.is_none() && self.ne.is_none() {
            return Err(ModelError::Validation(
                "name must have at least one of en or ne".into(),
            ));
        }
        Ok(())
    }

    /// Parts across all languages that carry text.
    pub fn languages(&self) -> impl Iterator<Item = &NameParts> {
        [self.en.as_ref(), self.ne.as_ref()].into_iter().flatten()
    }
}
