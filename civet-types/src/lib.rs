//! Core type definitions for civet.
//!
//! Identifiers are structured strings (`entity:person/ram-chandra-poudel`)
//! that map deterministically onto the store's on-disk layout. Models carry
//! their own validation; the publication service calls it before persisting.

mod entity;
mod error;
mod ids;
mod name;
mod relationship;
mod version;

pub use entity::{Entity, ExternalIdentifier};
pub use error::ModelError;
pub use ids::{
    AuthorId, EntityId, EntityType, OwnerId, RelationshipId, VersionId, is_valid_slug,
};
pub use name::{Name, NameKind, NameParts};
pub use relationship::Relationship;
pub use version::{Author, AuthorKind, Version, VersionSummary};
