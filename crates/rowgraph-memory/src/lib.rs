//! In-memory driver for rowgraph.
//!
//! `MemoryConnection` implements the `Connection` trait from rowgraph-core
//! over plain in-memory tables. It is meant for tests and examples: it keeps
//! a log of every executed select so callers can assert how many round trips
//! an operation took.
//!
//! # Example
//!
//! ```
//! use rowgraph_core::{Condition, Connection, SelectQuery, Value};
//! use rowgraph_memory::MemoryConnection;
//!
//! let mut conn = MemoryConnection::new();
//! conn.create_table("house", &["id", "street"], Some("id"));
//! conn.insert_row("house", [("street", Value::from("Elm"))]).unwrap();
//!
//! let query = SelectQuery::new("house", vec!["street".into()])
//!     .filter(Condition::eq("id", 1_i64));
//! let rows: Vec<_> = conn.select(&query).unwrap().collect();
//! assert_eq!(rows.len(), 1);
//! assert_eq!(conn.query_log().len(), 1);
//! ```

pub mod connection;

pub use connection::MemoryConnection;
