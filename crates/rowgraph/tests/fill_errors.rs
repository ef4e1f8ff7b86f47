mod common;

use common::{family, load_person, store};
use rowgraph::prelude::*;
use rowgraph::{IntegrityErrorKind, RelationshipErrorKind};
use rowgraph_memory::MemoryConnection;
use std::sync::Arc;

#[test]
fn duplicate_identity_in_graph_is_rejected() {
    let mut store = store();
    let mut repo = Repository::new(family());
    let alice = load_person(&mut repo, &mut store, 1);
    let copy = load_person(&mut repo, &mut store, 1);
    store
        .set_referenced_records(alice, "spouse", vec![copy])
        .unwrap();
    repo.connection_mut().clear_query_log();

    let err = repo
        .fill_relationships(&mut store, &[alice], &["home"])
        .unwrap_err();

    assert_eq!(
        err.integrity_kind(),
        Some(IntegrityErrorKind::DuplicateIdentity)
    );
    assert!(repo.connection().query_log().is_empty());
}

#[test]
fn mixed_schemas_are_rejected() {
    let mut store = store();
    let mut repo = Repository::new(family());
    let alice = load_person(&mut repo, &mut store, 1);
    let house = repo
        .find_by_primary_key(&mut store, "house", &[Value::Int(1)])
        .unwrap()
        .unwrap();

    let err = repo
        .fill_relationships(&mut store, &[alice, house], &["home"])
        .unwrap_err();
    assert_eq!(err.integrity_kind(), Some(IntegrityErrorKind::SchemaMismatch));
}

#[test]
fn unknown_paths_fail_before_any_query() {
    let mut store = store();
    let mut repo = Repository::new(family());
    let alice = load_person(&mut repo, &mut store, 1);
    repo.connection_mut().clear_query_log();

    for path in ["nope", "parents.nope", "home.residents.spouse.nope"] {
        let err = repo
            .fill_relationships(&mut store, &[alice], &["spouse", path])
            .unwrap_err();
        assert_eq!(err.relationship_kind(), Some(RelationshipErrorKind::NotFound));
    }
    assert!(repo.connection().query_log().is_empty());
    assert!(!store[alice].has_referenced_records("spouse").unwrap());
}

#[test]
fn empty_input_does_nothing() {
    let mut store = store();
    let mut repo = Repository::new(family());
    repo.fill_relationships(&mut store, &[], &["nope"])
        .expect("empty fill");
    let alice = load_person(&mut repo, &mut store, 1);
    repo.connection_mut().clear_query_log();
    repo.fill_relationships::<&str>(&mut store, &[alice], &[])
        .expect("no paths");
    assert!(repo.connection().query_log().is_empty());
}

fn shipments() -> (RecordStore, Repository<MemoryConnection>) {
    let registry = SchemaRegistry::from_definitions(vec![
        SchemaDefinition::new("shipment")
            .fields(["id", "order_id", "line_no"])
            .primary_key(["id"])
            .relationship(RelationshipDefinition::composite(
                "line",
                vec!["order_id".into(), "line_no".into()],
                "order_line",
                vec!["order_id".into(), "line_no".into()],
            )),
        SchemaDefinition::new("order_line")
            .fields(["order_id", "line_no", "sku"])
            .primary_key(["order_id", "line_no"]),
    ])
    .expect("composite schemas");
    let mut conn = MemoryConnection::new();
    conn.create_table("shipment", &["id", "order_id", "line_no"], Some("id"));
    conn.insert_row(
        "shipment",
        [("order_id", Value::Int(7)), ("line_no", Value::Int(1))],
    )
    .unwrap();
    (RecordStore::new(Arc::new(registry)), Repository::new(conn))
}

#[test]
fn composite_relationships_cannot_be_filled() {
    let (mut store, mut repo) = shipments();
    let shipments = repo
        .find(&mut store, "shipment", vec![], vec![], None)
        .unwrap();
    let line = store.schema("shipment").unwrap().relationship("line").unwrap();
    assert!(line.is_composite());
    assert!(line.is_unique_relationship());
    repo.connection_mut().clear_query_log();

    let err = repo
        .fill_relationships(&mut store, &shipments, &["line"])
        .unwrap_err();
    assert_eq!(
        err.relationship_kind(),
        Some(RelationshipErrorKind::CompositeKey)
    );
    assert!(repo.connection().query_log().is_empty());
}

#[test]
fn driver_errors_carry_the_query() {
    let mut store = store();
    let mut conn = family();
    conn.create_table("house", &["id"], None);
    let mut repo = Repository::new(conn);
    let alice = load_person(&mut repo, &mut store, 1);

    let err = repo
        .fill_relationships(&mut store, &[alice], &["home"])
        .unwrap_err();
    assert!(matches!(err, Error::Query(_)));
    assert!(err.sql().unwrap().contains("\"street\""));
}
