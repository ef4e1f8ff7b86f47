//! Loading and persistence for rowgraph records.
//!
//! `rowgraph-session` is the layer that talks to a [`Connection`]:
//!
//! - **Identity cache**: one record per `(schema, primary key)` during a fill.
//! - **Relationship filler**: loads dotted relationship paths for a batch of
//!   records with one `IN` query per relationship per level.
//! - **Repository**: finds records and writes inserts, updates and deletes
//!   while keeping record state in step.
//!
//! Everything is synchronous. Records live in a [`RecordStore`] passed to each
//! operation.
//!
//! # Example
//!
//! ```ignore
//! let mut repo = Repository::new(conn);
//! let people = repo.find(&mut store, "person", vec![], vec![], None)?;
//! repo.fill_relationships(&mut store, &people, &["spouse", "parents.parent"])?;
//! ```
//!
//! [`Connection`]: rowgraph_core::Connection
//! [`RecordStore`]: rowgraph_core::RecordStore

pub mod filler;
pub mod identity_map;
pub mod repository;

pub use filler::RelationshipFiller;
pub use identity_map::IdentityCache;
pub use repository::Repository;
