//! Core types for rowgraph.
//!
//! This crate provides the building blocks of the record graph:
//!
//! - `Schema` and `SchemaRegistry` for validated table and relationship definitions
//! - `Record` for one row's values, change tracking and lifecycle
//! - `RecordStore`, the arena holding records and their links
//! - `Relationship` with reverse detection and the fill algorithms
//! - `Connection`, the contract a database driver implements
//! - `Model` for typed views over records

pub mod connection;
pub mod error;
pub mod model;
pub mod record;
pub mod relationship;
pub mod row;
pub mod schema;
pub mod store;
pub mod value;

pub use connection::{Condition, Connection, Filter, Order, Rows, SelectQuery, quote_ident};
pub use error::{
    CardinalityErrorKind, Error, IdentityErrorKind, IntegrityErrorKind, QueryError,
    QueryErrorKind, RelationshipErrorKind, Result, SchemaErrorKind,
};
pub use model::Model;
pub use record::{Record, RecordState};
pub use relationship::Relationship;
pub use row::{ColumnInfo, Row};
pub use schema::{RelationshipDefinition, Schema, SchemaDefinition, SchemaRegistry};
pub use store::{RecordId, RecordStore};
pub use value::{FromValue, Value};
