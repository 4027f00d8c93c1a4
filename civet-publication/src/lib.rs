//! Write path for the civet registry.
//!
//! [`PublicationService`] is the single component allowed to mutate the
//! store. It validates drafts, serializes writes per object id, assigns
//! gapless version numbers starting at 1, and persists an immutable
//! snapshot for every mutation. Readers (search, exports) never write.
//!
//! The crate also carries the read-only graph tooling that operates on
//! what publication wrote: [`GraphService`] for traversal, path finding,
//! and rendering, and [`IntegrityChecker`] for orphan, cycle, and
//! duplicate detection.

mod draft;
mod error;
mod graph;
mod integrity;
mod service;

pub use draft::{NewEntity, NewRelationship};
pub use error::{PublishError, PublishResult};
pub use graph::{Direction, GraphFormat, GraphService, TraversedRelationship};
pub use integrity::{DEFAULT_HIERARCHICAL_KINDS, IntegrityChecker};
pub use service::PublicationService;
