//! Read-only query layer for the civet registry.
//!
//! [`SearchService`] answers name searches with multilingual relevance
//! ranking, filtered relationship lookups, and version-history reads. It
//! never writes; all mutations go through `civet-publication`.

mod query;
mod service;

pub use query::{EntityQuery, RelationshipQuery};
pub use service::SearchService;
