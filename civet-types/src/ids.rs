//! Identifier types used throughout the civet core.
//!
//! Every identifier has a canonical string form with a namespace prefix
//! (`entity:`, `relationship:`, `author:`, `version:`) and maps onto the
//! store's directory layout by replacing `:` with `/` and appending `.json`.

use crate::error::ModelError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Returns true if `s` is a valid kebab-case slug (`ram-chandra-poudel`).
pub fn is_valid_slug(s: &str) -> bool {
    if s.is_empty() || s.len() > 100 {
        return false;
    }
    let mut prev_dash = true; // disallow leading dash
    for c in s.chars() {
        match c {
            'a'..='z' | '0'..='9' => prev_dash = false,
            '-' if !prev_dash => prev_dash = true,
            _ => return false,
        }
    }
    !prev_dash // disallow trailing dash
}

fn is_valid_sub_type(s: &str) -> bool {
    if s.is_empty() || s.len() > 50 {
        return false;
    }
    s.chars().all(|c| matches!(c, 'a'..='z' | '0'..='9' | '_'))
}

/// Maps an identifier string onto its storage path relative to the store root.
fn id_to_rel_path(id: &str) -> PathBuf {
    PathBuf::from(format!("{}.json", id.replace(':', "/")))
}

/// Top-level classification of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Person,
    Organization,
    Location,
}

impl EntityType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            EntityType::Person => "person",
            EntityType::Organization => "organization",
            EntityType::Location => "location",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "person" => Ok(EntityType::Person),
            "organization" => Ok(EntityType::Organization),
            "location" => Ok(EntityType::Location),
            other => Err(ModelError::InvalidId(format!(
                "unknown entity type: {other}"
            ))),
        }
    }
}

/// Identifier for an entity: `entity:{type}/{sub_type?}/{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityId {
    entity_type: EntityType,
    sub_type: Option<String>,
    slug: String,
}

impl EntityId {
    /// Builds an entity id, validating the slug and sub_type shapes.
    pub fn new(
        entity_type: EntityType,
        sub_type: Option<&str>,
        slug: &str,
    ) -> Result<Self, ModelError> {
        if !is_valid_slug(slug) {
            return Err(ModelError::InvalidId(format!("invalid slug: {slug:?}")));
        }
        if let Some(st) = sub_type
            && !is_valid_sub_type(st)
        {
            return Err(ModelError::InvalidId(format!("invalid sub_type: {st:?}")));
        }
        Ok(Self {
            entity_type,
            sub_type: sub_type.map(str::to_owned),
            slug: slug.to_owned(),
        })
    }

    pub fn entity_type(&self) -> EntityType {
        self.entity_type
    }

    pub fn sub_type(&self) -> Option<&str> {
        self.sub_type.as_deref()
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// The id without the `entity:` prefix, e.g. `person/ram-chandra-poudel`.
    pub fn core(&self) -> String {
        match &self.sub_type {
            Some(st) => format!("{}/{}/{}", self.entity_type, st, self.slug),
            None => format!("{}/{}", self.entity_type, self.slug),
        }
    }

    /// Storage path relative to the store root.
    pub fn storage_path(&self) -> PathBuf {
        id_to_rel_path(&self.to_string())
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "entity:{}", self.core())
    }
}

impl FromStr for EntityId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let core = s
            .strip_prefix("entity:")
            .ok_or_else(|| ModelError::InvalidId(format!("not an entity id: {s}")))?;
        Self::parse_core(core)
    }
}

impl EntityId {
    /// Parses the prefix-less form (`person/slug` or `organization/sub/slug`).
    pub fn parse_core(core: &str) -> Result<Self, ModelError> {
        let parts: Vec<&str> = core.split('/').collect();
        match parts.as_slice() {
            [ty, slug] => Self::new(ty.parse()?, None, slug),
            [ty, sub, slug] => Self::new(ty.parse()?, Some(sub), slug),
            _ => Err(ModelError::InvalidId(format!("invalid entity id: {core}"))),
        }
    }
}

/// Identifier for a relationship, derived from its endpoints and kind:
/// `relationship:{source-core}:{target-core}:{KIND}`.
///
/// Deriving the id from the edge's content makes re-creation of the same
/// edge land on the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RelationshipId {
    source: EntityId,
    target: EntityId,
    kind: String,
}

impl RelationshipId {
    pub fn new(source: EntityId, target: EntityId, kind: &str) -> Result<Self, ModelError> {
        if kind.is_empty() || kind.contains(':') || kind.contains('/') {
            return Err(ModelError::InvalidId(format!(
                "invalid relationship kind: {kind:?}"
            )));
        }
        Ok(Self {
            source,
            target,
            kind: kind.to_owned(),
        })
    }

    pub fn source(&self) -> &EntityId {
        &self.source
    }

    pub fn target(&self) -> &EntityId {
        &self.target
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn storage_path(&self) -> PathBuf {
        id_to_rel_path(&self.to_string())
    }
}

impl fmt::Display for RelationshipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "relationship:{}:{}:{}",
            self.source.core(),
            self.target.core(),
            self.kind
        )
    }
}

impl FromStr for RelationshipId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("relationship:")
            .ok_or_else(|| ModelError::InvalidId(format!("not a relationship id: {s}")))?;
        let parts: Vec<&str> = rest.split(':').collect();
        let [source, target, kind] = parts.as_slice() else {
            return Err(ModelError::InvalidId(format!(
                "invalid relationship id: {s}"
            )));
        };
        Self::new(EntityId::parse_core(source)?, EntityId::parse_core(target)?, kind)
    }
}

/// Identifier for an author: `author:{slug}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuthorId {
    slug: String,
}

impl AuthorId {
    pub fn new(slug: &str) -> Result<Self, ModelError> {
        if !is_valid_slug(slug) {
            return Err(ModelError::InvalidId(format!(
                "invalid author slug: {slug:?}"
            )));
        }
        Ok(Self {
            slug: slug.to_owned(),
        })
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    pub fn storage_path(&self) -> PathBuf {
        id_to_rel_path(&self.to_string())
    }
}

impl fmt::Display for AuthorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "author:{}", self.slug)
    }
}

impl FromStr for AuthorId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let slug = s
            .strip_prefix("author:")
            .ok_or_else(|| ModelError::InvalidId(format!("not an author id: {s}")))?;
        Self::new(slug)
    }
}

/// The owner of a version record: an entity or a relationship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OwnerId {
    Entity(EntityId),
    Relationship(RelationshipId),
}

impl OwnerId {
    /// Directory holding this owner's version files, relative to the root.
    pub fn version_dir(&self) -> PathBuf {
        PathBuf::from(format!("version/{}", self.to_string().replace(':', "/")))
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OwnerId::Entity(id) => id.fmt(f),
            OwnerId::Relationship(id) => id.fmt(f),
        }
    }
}

impl FromStr for OwnerId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.starts_with("entity:") {
            Ok(OwnerId::Entity(s.parse()?))
        } else if s.starts_with("relationship:") {
            Ok(OwnerId::Relationship(s.parse()?))
        } else {
            Err(ModelError::InvalidId(format!("not an owner id: {s}")))
        }
    }
}

impl From<EntityId> for OwnerId {
    fn from(id: EntityId) -> Self {
        OwnerId::Entity(id)
    }
}

impl From<RelationshipId> for OwnerId {
    fn from(id: RelationshipId) -> Self {
        OwnerId::Relationship(id)
    }
}

/// Identifier for a version record: `version:{owner_id}:{number}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionId {
    owner: OwnerId,
    number: u32,
}

impl VersionId {
    pub fn new(owner: OwnerId, number: u32) -> Self {
        Self { owner, number }
    }

    pub fn owner(&self) -> &OwnerId {
        &self.owner
    }

    pub fn number(&self) -> u32 {
        self.number
    }

    pub fn storage_path(&self) -> PathBuf {
        id_to_rel_path(&self.to_string())
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "version:{}:{}", self.owner, self.number)
    }
}

impl FromStr for VersionId {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s
            .strip_prefix("version:")
            .ok_or_else(|| ModelError::InvalidId(format!("not a version id: {s}")))?;
        let (owner, number) = rest
            .rsplit_once(':')
            .ok_or_else(|| ModelError::InvalidId(format!("invalid version id: {s}")))?;
        let number: u32 = number
            .parse()
            .map_err(|_| ModelError::InvalidId(format!("invalid version number in {s}")))?;
        Ok(Self::new(owner.parse()?, number))
    }
}

// String-backed serde for all id types keeps the wire format canonical.
macro_rules! string_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

string_serde!(EntityId);
string_serde!(RelationshipId);
string_serde!(AuthorId);
string_serde!(OwnerId);
string_serde!(VersionId);
