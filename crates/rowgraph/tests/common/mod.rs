//! Shared family fixture: people, the parent links between them, and houses.
#![allow(dead_code)]

use rowgraph::prelude::*;
use rowgraph_memory::MemoryConnection;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Person(pub RecordId);

impl Model for Person {
    const SCHEMA: &'static str = "person";

    fn from_record(id: RecordId) -> Self {
        Person(id)
    }

    fn record_id(&self) -> RecordId {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct House(pub RecordId);

impl Model for House {
    const SCHEMA: &'static str = "house";

    fn from_record(id: RecordId) -> Self {
        House(id)
    }

    fn record_id(&self) -> RecordId {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParentLink(pub RecordId);

impl Model for ParentLink {
    const SCHEMA: &'static str = "parent";

    fn from_record(id: RecordId) -> Self {
        ParentLink(id)
    }

    fn record_id(&self) -> RecordId {
        self.0
    }
}

pub const PERSON_FIELDS: [&str; 5] = ["id", "first_name", "age", "spouse_id", "home_id"];

pub fn registry() -> Arc<SchemaRegistry> {
    let defs = vec![
        SchemaDefinition::new("person")
            .fields(PERSON_FIELDS)
            .primary_key(["id"])
            .relationship(RelationshipDefinition::new("parents", "id", "parent", "child_id"))
            .relationship(RelationshipDefinition::new("children", "id", "parent", "parent_id"))
            .relationship(RelationshipDefinition::new("spouse", "spouse_id", "person", "id"))
            .relationship(
                RelationshipDefinition::new("spouse_reverse", "id", "person", "spouse_id").unique(),
            )
            .relationship(
                RelationshipDefinition::new("home", "home_id", "house", "id").alias("house"),
            ),
        SchemaDefinition::new("parent")
            .fields(["parent_id", "child_id"])
            .primary_key(["parent_id", "child_id"])
            .relationship(RelationshipDefinition::new("child", "child_id", "person", "id"))
            .relationship(RelationshipDefinition::new("parent", "parent_id", "person", "id")),
        SchemaDefinition::new("house")
            .fields(["id", "street"])
            .primary_key(["id"])
            .relationship(RelationshipDefinition::new("residents", "id", "person", "home_id")),
    ];
    Arc::new(SchemaRegistry::from_definitions(defs).expect("valid family schemas"))
}

pub fn store() -> RecordStore {
    RecordStore::new(registry())
}

/// Empty tables for every schema.
pub fn connection() -> MemoryConnection {
    let mut conn = MemoryConnection::new();
    conn.create_table("person", &PERSON_FIELDS, Some("id"));
    conn.create_table("parent", &["parent_id", "child_id"], None);
    conn.create_table("house", &["id", "street"], Some("id"));
    conn
}

fn person(conn: &mut MemoryConnection, id: i32, name: &str, spouse: Option<i32>, home: Option<i32>) {
    conn.insert_row(
        "person",
        [
            ("id", Value::Int(id)),
            ("first_name", Value::from(name)),
            ("age", Value::Int(20 + id)),
            ("spouse_id", Value::from(spouse)),
            ("home_id", Value::from(home)),
        ],
    )
    .expect("insert person");
}

fn parent_link(conn: &mut MemoryConnection, parent: i32, child: i32) {
    conn.insert_row(
        "parent",
        [("parent_id", Value::Int(parent)), ("child_id", Value::Int(child))],
    )
    .expect("insert parent link");
}

/// Alice (1) is the child of Bob (2) and Carol (3), who are married.
/// Dan (4) is Bob's other child. Everyone but Dan lives on Elm Street.
pub fn family() -> MemoryConnection {
    let mut conn = connection();
    conn.insert_row("house", [("id", Value::Int(1)), ("street", Value::from("Elm Street"))])
        .expect("insert house");
    person(&mut conn, 1, "Alice", None, Some(1));
    person(&mut conn, 2, "Bob", Some(3), Some(1));
    person(&mut conn, 3, "Carol", Some(2), Some(1));
    person(&mut conn, 4, "Dan", None, None);
    parent_link(&mut conn, 2, 1);
    parent_link(&mut conn, 3, 1);
    parent_link(&mut conn, 2, 4);
    conn
}

/// Load one person by id.
pub fn load_person(
    repo: &mut Repository<MemoryConnection>,
    store: &mut RecordStore,
    id: i32,
) -> RecordId {
    repo.find_by_primary_key(store, "person", &[Value::Int(id)])
        .expect("query person")
        .expect("person exists")
}

pub fn first_name(store: &RecordStore, id: RecordId) -> String {
    store[id].get_as::<String>("first_name").expect("first_name")
}

/// Names of the records linked from `id` through `relationship`, sorted.
pub fn linked_names(store: &RecordStore, id: RecordId, relationship: &str) -> Vec<String> {
    let mut names: Vec<String> = store[id]
        .referenced_records(relationship)
        .expect("relationship loaded")
        .iter()
        .map(|&linked| first_name(store, linked))
        .collect();
    names.sort();
    names
}

/// Number of selects run against `table`.
pub fn queries_on(conn: &MemoryConnection, table: &str) -> usize {
    conn.query_log().iter().filter(|q| q.table == table).count()
}
