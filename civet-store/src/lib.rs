//! Storage layer for the civet registry.
//!
//! Objects live as one JSON file each under a root directory, at paths
//! derived from their identifiers (`entity/person/slug.json`,
//! `version/entity/person/slug/3.json`, ...). Keeping the dataset as plain
//! files makes it reviewable and versionable with ordinary git tooling.
//!
//! Two backends implement the [`EntityStore`] contract:
//!
//! - [`FileStore`] reads and writes the files directly, with an optional
//!   bounded TTL cache in front of entity and relationship reads.
//! - [`MemoryStore`] loads everything once and serves reads from memory,
//!   rejecting all writes. Intended for read-only serving processes.

mod cache;
mod error;
mod file;
mod memory;
mod store;

pub use cache::{CacheStats, TtlCache};
pub use error::{StoreError, StoreResult};
pub use file::{FileStore, FileStoreOptions};
pub use memory::MemoryStore;
pub use store::EntityStore;
