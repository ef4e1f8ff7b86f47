//! Typed views over records.
//!
//! A model is an application type standing for one record of one schema.
//! It holds the record's [`RecordId`] and reads values through the
//! [`crate::RecordStore`], so models are cheap to create and copy around.

use crate::store::RecordId;

/// An application type backed by a record.
///
/// # Example
///
/// ```
/// use rowgraph_core::{Model, RecordId};
///
/// #[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// struct Person(RecordId);
///
/// impl Model for Person {
///     const SCHEMA: &'static str = "person";
///
///     fn from_record(id: RecordId) -> Self {
///         Person(id)
///     }
///
///     fn record_id(&self) -> RecordId {
///         self.0
///     }
/// }
/// ```
pub trait Model: Sized {
    /// Name of the schema this model's records belong to.
    const SCHEMA: &'static str;

    /// Wrap a record. The caller guarantees the record has schema `SCHEMA`.
    fn from_record(id: RecordId) -> Self;

    /// The backing record.
    fn record_id(&self) -> RecordId;
}
