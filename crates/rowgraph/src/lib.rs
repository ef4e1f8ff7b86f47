//! rowgraph - record graphs over relational rows.
//!
//! Rows fetched from a database become records in a [`RecordStore`]. Records
//! are linked to each other through declared relationships, and whole
//! relationship paths are loaded for a batch of records with a bounded
//! number of queries.
//!
//! - Schemas and relationships are declared once, in code or JSON, and
//!   validated up front by [`SchemaRegistry`]
//! - Reverse relationships are detected, so linking one side links the other
//! - [`RelationshipFiller`] loads paths like `"parents.parent.children"` with
//!   one `IN` query per relationship per level and an identity cache
//! - [`Repository`] finds and saves records over any [`Connection`]
//!
//! # Quick Start
//!
//! ```
//! use rowgraph::prelude::*;
//! use rowgraph_memory::MemoryConnection;
//! use std::sync::Arc;
//!
//! let registry = SchemaRegistry::from_json(r#"[
//!     {"name": "author", "primary_key": "id", "fields": ["id", "name"],
//!      "relationships": [{"name": "books", "key": "id", "schema": "book", "field": "author_id"}]},
//!     {"name": "book", "primary_key": "id", "fields": ["id", "author_id", "title"],
//!      "relationships": [{"name": "author", "key": "author_id", "schema": "author", "field": "id"}]}
//! ]"#).unwrap();
//! let mut store = RecordStore::new(Arc::new(registry));
//!
//! let mut conn = MemoryConnection::new();
//! conn.create_table("author", &["id", "name"], Some("id"));
//! conn.create_table("book", &["id", "author_id", "title"], Some("id"));
//! conn.insert_row("author", [("name", Value::from("Ursula"))]).unwrap();
//! conn.insert_row("book", [("author_id", Value::Int(1)), ("title", Value::from("Lathe"))]).unwrap();
//!
//! let mut repo = Repository::new(conn);
//! let books = repo.find(&mut store, "book", vec![], vec![], None).unwrap();
//! repo.fill_relationships(&mut store, &books, &["author.books"]).unwrap();
//!
//! let author = store[books[0]].referenced_records("author").unwrap()[0];
//! assert_eq!(store[author].get_as::<String>("name").unwrap(), "Ursula");
//! assert_eq!(store[author].referenced_records("books").unwrap(), &books[..]);
//! ```
//!
//! The `memory` feature re-exports the in-memory driver as `rowgraph::memory`.

pub use rowgraph_core::{
    CardinalityErrorKind, ColumnInfo, Condition, Connection, Error, Filter, FromValue,
    IdentityErrorKind, IntegrityErrorKind, Model, Order, QueryError, QueryErrorKind, Record,
    RecordId, RecordState, RecordStore, Relationship, RelationshipDefinition,
    RelationshipErrorKind, Result, Row, Rows, Schema, SchemaDefinition, SchemaErrorKind,
    SchemaRegistry, SelectQuery, Value, quote_ident,
};
pub use rowgraph_session::{IdentityCache, RelationshipFiller, Repository};

#[cfg(feature = "memory")]
pub use rowgraph_memory as memory;

/// Commonly used types.
///
/// ```
/// use rowgraph::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        Condition, Connection, Error, Model, Order, Record, RecordId, RecordState, RecordStore,
        Relationship, RelationshipDefinition, Repository, Result, Row, SchemaDefinition,
        SchemaRegistry, SelectQuery, Value,
    };
}
