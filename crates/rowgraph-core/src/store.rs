//! The record store: an arena owning every record of a unit of work.
//!
//! Records refer to each other through [`RecordId`] handles instead of
//! pointers, so cyclic graphs (spouses, parent and child) need no shared
//! ownership. Operations that touch more than one record at a time live on
//! the store.

use crate::Result;
use crate::error::{CardinalityErrorKind, Error, IdentityErrorKind, IntegrityErrorKind};
use crate::model::Model;
use crate::record::Record;
use crate::relationship::Relationship;
use crate::row::Row;
use crate::schema::{Schema, SchemaRegistry};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::ops::{Index, IndexMut};
use std::sync::Arc;

/// Handle to a record in a [`RecordStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(usize);

impl RecordId {
    /// Position of the record in its store.
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Owns records and the registry their schemas come from.
///
/// Indexing with a [`RecordId`] from another store panics, like indexing a
/// `Vec` out of bounds.
#[derive(Debug)]
pub struct RecordStore {
    registry: Arc<SchemaRegistry>,
    records: Vec<Record>,
}

impl RecordStore {
    /// Create an empty store for the schemas of `registry`.
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            registry,
            records: Vec::new(),
        }
    }

    /// Get the schema registry.
    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Look up a registered schema.
    pub fn schema(&self, name: &str) -> Result<&Arc<Schema>> {
        self.registry.schema(name)
    }

    /// Get the number of records, deleted ones included.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Get a record, or `None` for a handle from another store.
    pub fn get(&self, id: RecordId) -> Option<&Record> {
        self.records.get(id.0)
    }

    /// Get a record mutably.
    pub fn get_mut(&mut self, id: RecordId) -> Option<&mut Record> {
        self.records.get_mut(id.0)
    }

    /// Every record handle, in creation order.
    pub fn ids(&self) -> impl Iterator<Item = RecordId> {
        (0..self.records.len()).map(RecordId)
    }

    /// Take ownership of a record.
    ///
    /// The record's schema must be the one registered in this store's
    /// registry under its name.
    pub fn add(&mut self, record: Record) -> Result<RecordId> {
        let registered = self.registry.schema(record.schema().name())?;
        if !Arc::ptr_eq(registered, record.schema()) {
            return Err(Error::integrity(
                IntegrityErrorKind::SchemaMismatch,
                format!(
                    "Record schema '{}' does not belong to this store's registry",
                    record.schema().name()
                ),
            ));
        }
        let id = RecordId(self.records.len());
        self.records.push(record);
        Ok(id)
    }

    /// Create a new, empty record.
    pub fn create_record(&mut self, schema: &str) -> Result<RecordId> {
        let schema = Arc::clone(self.registry.schema(schema)?);
        self.add(Record::new(schema))
    }

    /// Create a record for an existing row holding exactly the schema's fields.
    pub fn create_record_from_values(&mut self, schema: &str, row: &Row) -> Result<RecordId> {
        let schema = Arc::clone(self.registry.schema(schema)?);
        let record = Record::from_values(schema, row)?;
        self.add(record)
    }

    /// Create a record from the columns of a row named `prefix` + field.
    ///
    /// Columns that do not belong to the schema are ignored, so one joined
    /// row can feed several records.
    pub fn create_record_from_row(
        &mut self,
        schema: &str,
        row: &Row,
        prefix: &str,
    ) -> Result<RecordId> {
        let record = self.record_from_row(schema, row, prefix)?;
        self.add(record)
    }

    fn record_from_row(&self, schema: &str, row: &Row, prefix: &str) -> Result<Record> {
        let schema = Arc::clone(self.registry.schema(schema)?);
        let mut names = Vec::with_capacity(schema.fields().len());
        let mut values = Vec::with_capacity(schema.fields().len());
        for field in schema.fields() {
            if let Some(value) = row.get_by_name(&format!("{}{}", prefix, field)) {
                names.push(field.clone());
                values.push(value.clone());
            }
        }
        Record::from_values(schema, &Row::new(names, values))
    }

    /// Create a record from a joined row, along with the records of its
    /// unique relationships.
    ///
    /// `relationships` pairs a column prefix with the relationship whose
    /// referenced record is stored under that prefix. When every prefixed
    /// column is null (an outer join without a match) no referenced record is
    /// created and the relationship is loaded empty.
    pub fn create_record_from_joined_row(
        &mut self,
        schema: &str,
        row: &Row,
        prefix: &str,
        relationships: &[(&str, &str)],
    ) -> Result<RecordId> {
        let registry = Arc::clone(&self.registry);
        let owner = registry.schema(schema)?;
        let record = self.create_record_from_row(schema, row, prefix)?;

        for &(relationship_prefix, name) in relationships {
            let relationship = owner.relationship(name)?;
            let referenced =
                self.record_from_row(relationship.referenced_schema(), row, relationship_prefix)?;
            if referenced.is_empty() {
                relationship.fill_no_record(self, record)?;
                continue;
            }
            let referenced = self.add(referenced)?;
            relationship.fill_single_record(self, record, referenced)?;
        }

        Ok(record)
    }

    fn schema_of(&self, id: RecordId) -> Arc<Schema> {
        Arc::clone(self[id].schema())
    }

    fn expect_schema(&self, id: RecordId, expected: &str) -> Result<()> {
        let actual = self[id].schema().name();
        if actual != expected {
            return Err(Error::integrity(
                IntegrityErrorKind::SchemaMismatch,
                format!("Expected a record of schema '{}', got '{}'", expected, actual),
            ));
        }
        Ok(())
    }

    /// Explicitly set the records linked through a relationship.
    ///
    /// A unique relationship takes at most one record, and every record must
    /// belong to the referenced schema.
    pub fn set_referenced_records(
        &mut self,
        id: RecordId,
        name: &str,
        records: Vec<RecordId>,
    ) -> Result<()> {
        let schema = self.schema_of(id);
        let relationship = schema.relationship(name)?;
        let canonical = relationship.name();

        if relationship.is_unique_relationship() && records.len() > 1 {
            return Err(Error::cardinality(
                CardinalityErrorKind::TooManyRecords,
                canonical,
                "A unique relationship cannot reference more than a single record",
            ));
        }
        for &related in &records {
            self.expect_schema(related, relationship.referenced_schema())?;
        }

        self[id].link(canonical, records);
        Ok(())
    }

    /// Make `id` reference `related` through a unique relationship.
    ///
    /// The referenced values of `related` are copied into the foreign key
    /// fields of `id`. The reverse link is set when the reverse relationship
    /// is unique, or appended to when it is multi-valued and already loaded.
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn associate(&mut self, id: RecordId, name: &str, related: RecordId) -> Result<()> {
        let schema = self.schema_of(id);
        let relationship = schema.relationship(name)?;
        let canonical = relationship.name();

        if !relationship.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedUnique,
                canonical,
                "Only unique relationships can be associated with a single record",
            ));
        }
        self.expect_schema(related, relationship.referenced_schema())?;

        let mut values = Vec::with_capacity(relationship.fields().len());
        for (key, field) in relationship.fields().iter().zip(relationship.referenced_fields()) {
            let value = self[related].get(field)?;
            if value.is_null() {
                return Err(Error::identity(
                    IdentityErrorKind::IncompleteKey,
                    relationship.referenced_schema(),
                    format!("Cannot associate with a record that has no value for '{}'", field),
                ));
            }
            values.push((key.as_str(), value.clone()));
        }

        let registry = Arc::clone(&self.registry);
        let reverse = relationship.reverse_relationship(&registry)?;

        for (key, value) in values {
            self[id].set(key, value)?;
        }
        self[id].link(canonical, vec![related]);

        if reverse.is_unique_relationship() {
            self[related].link(reverse.name(), vec![id]);
        } else if self[related].has_referenced_records(reverse.name())? {
            self[related].push_link(reverse.name(), id)?;
        }

        Ok(())
    }

    /// Make `other` reference `id` through the reverse of a multi-valued
    /// relationship.
    pub fn add_association(&mut self, id: RecordId, name: &str, other: RecordId) -> Result<()> {
        let schema = self.schema_of(id);
        let relationship = schema.relationship(name)?;
        let canonical = relationship.name();

        if relationship.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedMultiple,
                canonical,
                "Only multi-valued relationships accept added associations",
            ));
        }

        let registry = Arc::clone(&self.registry);
        let reverse = relationship.reverse_relationship(&registry)?;
        self.associate(other, reverse.name(), id)
    }

    /// Wrap a record in a model, checking its schema.
    pub fn model<M: Model>(&self, id: RecordId) -> Result<M> {
        self.expect_schema(id, M::SCHEMA)?;
        Ok(M::from_record(id))
    }

    fn loaded_relationship(&self, id: RecordId, name: &str) -> Result<(&Relationship, &[RecordId])> {
        let relationship = self[id].schema().relationship(name)?;
        let records = self[id].referenced_records(name)?;
        Ok((relationship, records))
    }

    /// The model referenced through a unique relationship, if any.
    pub fn related_model<M: Model>(&self, id: RecordId, name: &str) -> Result<Option<M>> {
        let (relationship, records) = self.loaded_relationship(id, name)?;
        if !relationship.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedUnique,
                relationship.name(),
                "Cannot fetch a single model for a multi-valued relationship",
            ));
        }
        records.first().map(|&related| self.model(related)).transpose()
    }

    /// The models referenced through a multi-valued relationship.
    pub fn related_models<M: Model>(&self, id: RecordId, name: &str) -> Result<Vec<M>> {
        let (relationship, records) = self.loaded_relationship(id, name)?;
        if relationship.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedMultiple,
                relationship.name(),
                "Cannot fetch multiple models for a unique relationship",
            ));
        }
        records.iter().map(|&related| self.model(related)).collect()
    }

    /// The models reached through a multi-valued `proxy` relationship and then
    /// the unique `name` relationship of each proxy record.
    ///
    /// Proxy records whose `name` relationship is empty are skipped.
    pub fn related_models_by_proxy<M: Model>(
        &self,
        id: RecordId,
        proxy: &str,
        name: &str,
    ) -> Result<Vec<M>> {
        let (relationship, proxies) = self.loaded_relationship(id, proxy)?;
        if relationship.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedMultiple,
                relationship.name(),
                "Cannot fetch models through a unique proxy relationship",
            ));
        }

        let nested = self
            .registry
            .schema(relationship.referenced_schema())?
            .relationship(name)?;
        if !nested.is_unique_relationship() {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedUnique,
                nested.name(),
                "Proxy models must be referenced through a unique relationship",
            ));
        }

        let mut models = Vec::with_capacity(proxies.len());
        for &proxy_record in proxies {
            if let Some(&related) = self[proxy_record].referenced_records(name)?.first() {
                models.push(self.model(related)?);
            }
        }
        Ok(models)
    }

    /// Every record reachable through loaded links, starting with `id`.
    ///
    /// Breadth-first; each record appears once even in cyclic graphs.
    pub fn all_referenced_records(&self, id: RecordId) -> Vec<RecordId> {
        let mut visited = HashSet::from([id]);
        let mut queue = VecDeque::from([id]);
        let mut found = Vec::new();

        while let Some(current) = queue.pop_front() {
            found.push(current);
            for (_, linked) in self[current].links() {
                for &next in linked {
                    if visited.insert(next) {
                        queue.push_back(next);
                    }
                }
            }
        }

        found
    }
}

impl Index<RecordId> for RecordStore {
    type Output = Record;

    fn index(&self, id: RecordId) -> &Record {
        &self.records[id.0]
    }
}

impl IndexMut<RecordId> for RecordStore {
    fn index_mut(&mut self, id: RecordId) -> &mut Record {
        &mut self.records[id.0]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{RelationshipDefinition, SchemaDefinition};
    use crate::value::Value;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Person(RecordId);

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
    struct House(RecordId);

    impl Model for House {
        const SCHEMA: &'static str = "house";
        fn from_record(id: RecordId) -> Self {
            House(id)
        }
        fn record_id(&self) -> RecordId {
            self.0
        }
    }

    fn store() -> RecordStore {
        let defs = vec![
            SchemaDefinition::new("person")
                .fields(["id", "spouse_id", "home_id"])
                .primary_key(["id"])
                .relationship(RelationshipDefinition::new("spouse", "spouse_id", "person", "id"))
                .relationship(
                    RelationshipDefinition::new("spouse_reverse", "id", "person", "spouse_id")
                        .unique(),
                )
                .relationship(RelationshipDefinition::new("home", "home_id", "house", "id"))
                .relationship(RelationshipDefinition::new(
                    "owned", "id", "parent_link", "owner_id",
                )),
            SchemaDefinition::new("house")
                .fields(["id", "street"])
                .primary_key(["id"])
                .relationship(RelationshipDefinition::new(
                    "residents", "id", "person", "home_id",
                )),
            SchemaDefinition::new("parent_link")
                .fields(["owner_id", "house_id"])
                .primary_key(["owner_id", "house_id"])
                .relationship(RelationshipDefinition::new("owner", "owner_id", "person", "id"))
                .relationship(RelationshipDefinition::new("house", "house_id", "house", "id")),
        ];
        RecordStore::new(Arc::new(SchemaRegistry::from_definitions(defs).unwrap()))
    }

    fn person(store: &mut RecordStore, id: i64, home: Option<i64>) -> RecordId {
        let row = Row::from_pairs([
            ("id", Value::BigInt(id)),
            ("spouse_id", Value::Null),
            ("home_id", Value::from(home)),
        ]);
        store.create_record_from_values("person", &row).unwrap()
    }

    fn house(store: &mut RecordStore, id: i64) -> RecordId {
        let row = Row::from_pairs([("id", Value::BigInt(id)), ("street", Value::from("Elm"))]);
        store.create_record_from_values("house", &row).unwrap()
    }

    #[test]
    fn test_associate_sets_foreign_key_and_unique_reverse() {
        let mut store = store();
        let a = person(&mut store, 1, None);
        let b = person(&mut store, 2, None);

        store.associate(a, "spouse", b).unwrap();
        assert_eq!(store[a].get("spouse_id").unwrap(), &Value::BigInt(2));
        assert_eq!(store[a].changed_fields(), vec!["spouse_id"]);
        assert_eq!(store[a].referenced_records("spouse").unwrap(), &[b]);
        assert_eq!(store[b].referenced_records("spouse_reverse").unwrap(), &[a]);
    }

    #[test]
    fn test_associate_appends_to_loaded_reverse() {
        let mut store = store();
        let h = house(&mut store, 10);
        let existing = person(&mut store, 1, Some(10));
        let newcomer = store.create_record("person").unwrap();

        // Not loaded: reverse stays unloaded
        store.associate(newcomer, "home", h).unwrap();
        assert!(!store[h].has_referenced_records("residents").unwrap());

        store
            .set_referenced_records(h, "residents", vec![existing])
            .unwrap();
        store.associate(newcomer, "home", h).unwrap();
        assert_eq!(
            store[h].referenced_records("residents").unwrap(),
            &[existing, newcomer]
        );
        assert_eq!(store[newcomer].get("home_id").unwrap(), &Value::BigInt(10));
    }

    #[test]
    fn test_associate_failures() {
        let mut store = store();
        let h = house(&mut store, 10);
        let a = person(&mut store, 1, None);
        let empty = store.create_record("person").unwrap();

        let err = store.associate(h, "residents", a).unwrap_err();
        assert!(err.is_cardinality_error());

        let err = store.associate(a, "home", a).unwrap_err();
        assert_eq!(err.integrity_kind(), Some(IntegrityErrorKind::SchemaMismatch));

        let err = store.associate(a, "spouse", empty).unwrap_err();
        assert!(err.is_identity_error());
        assert!(store[a].get("spouse_id").unwrap().is_null());
    }

    #[test]
    fn test_add_association() {
        let mut store = store();
        let h = house(&mut store, 3);
        let p = person(&mut store, 1, None);
        store.set_referenced_records(h, "residents", vec![]).unwrap();

        store.add_association(h, "residents", p).unwrap();
        assert_eq!(store[h].referenced_records("residents").unwrap(), &[p]);
        assert_eq!(store[p].referenced_records("home").unwrap(), &[h]);

        let err = store.add_association(p, "home", h).unwrap_err();
        assert!(err.is_cardinality_error());
    }

    #[test]
    fn test_set_referenced_records_validates() {
        let mut store = store();
        let a = person(&mut store, 1, None);
        let b = person(&mut store, 2, None);
        let h = house(&mut store, 3);

        let err = store.set_referenced_records(a, "spouse", vec![a, b]).unwrap_err();
        assert!(err.is_cardinality_error());
        let err = store.set_referenced_records(a, "spouse", vec![h]).unwrap_err();
        assert!(err.is_integrity_error());
        let err = store.set_referenced_records(a, "nope", vec![]).unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[test]
    fn test_model_projections() {
        let mut store = store();
        let h = house(&mut store, 3);
        let a = person(&mut store, 1, Some(3));
        let b = person(&mut store, 2, Some(3));
        store.set_referenced_records(h, "residents", vec![a, b]).unwrap();
        store.set_referenced_records(a, "home", vec![h]).unwrap();
        store.set_referenced_records(b, "home", vec![]).unwrap();

        assert_eq!(store.model::<House>(h).unwrap(), House(h));
        assert!(store.model::<Person>(h).is_err());

        assert_eq!(store.related_model::<House>(a, "home").unwrap(), Some(House(h)));
        assert_eq!(store.related_model::<House>(b, "home").unwrap(), None);
        assert!(store.related_models::<House>(a, "home").is_err());

        assert_eq!(
            store.related_models::<Person>(h, "residents").unwrap(),
            vec![Person(a), Person(b)]
        );
        assert!(store.related_model::<Person>(h, "residents").is_err());
        assert!(store.related_model::<Person>(a, "spouse").unwrap_err().is_not_loaded());
    }

    #[test]
    fn test_related_models_by_proxy() {
        let mut store = store();
        let owner = person(&mut store, 1, None);
        let h1 = house(&mut store, 1);
        let h2 = house(&mut store, 2);
        let l1 = store
            .create_record_from_values(
                "parent_link",
                &Row::from_pairs([("owner_id", 1_i64), ("house_id", 1_i64)]),
            )
            .unwrap();
        let l2 = store
            .create_record_from_values(
                "parent_link",
                &Row::from_pairs([("owner_id", 1_i64), ("house_id", 2_i64)]),
            )
            .unwrap();
        store.set_referenced_records(owner, "owned", vec![l1, l2]).unwrap();
        store.set_referenced_records(l1, "house", vec![h1]).unwrap();
        store.set_referenced_records(l2, "house", vec![]).unwrap();

        let houses: Vec<House> = store.related_models_by_proxy(owner, "owned", "house").unwrap();
        assert_eq!(houses, vec![House(h1)]);

        store.set_referenced_records(l2, "house", vec![h2]).unwrap();
        let houses: Vec<House> = store.related_models_by_proxy(owner, "owned", "house").unwrap();
        assert_eq!(houses, vec![House(h1), House(h2)]);

        let err = store
            .related_models_by_proxy::<House>(l1, "house", "residents")
            .unwrap_err();
        assert!(err.is_cardinality_error());
    }

    #[test]
    fn test_all_referenced_records_handles_cycles() {
        let mut store = store();
        let a = person(&mut store, 1, None);
        let b = person(&mut store, 2, None);
        let lonely = person(&mut store, 3, None);
        store.associate(a, "spouse", b).unwrap();
        store.associate(b, "spouse", a).unwrap();

        assert_eq!(store.all_referenced_records(a), vec![a, b]);
        assert_eq!(store.all_referenced_records(lonely), vec![lonely]);
    }

    #[test]
    fn test_joined_row_unpacking() {
        let mut store = store();
        let row = Row::from_pairs([
            ("p_id", Value::BigInt(1)),
            ("p_spouse_id", Value::Null),
            ("p_home_id", Value::BigInt(9)),
            ("h_id", Value::BigInt(9)),
            ("h_street", Value::from("Oak")),
        ]);
        let p = store
            .create_record_from_joined_row("person", &row, "p_", &[("h_", "home")])
            .unwrap();
        let h = store[p].referenced_records("home").unwrap()[0];
        assert_eq!(store[h].get("street").unwrap(), &Value::from("Oak"));

        let unmatched = Row::from_pairs([
            ("p_id", Value::BigInt(2)),
            ("p_spouse_id", Value::Null),
            ("p_home_id", Value::Null),
            ("h_id", Value::Null),
            ("h_street", Value::Null),
        ]);
        let p = store
            .create_record_from_joined_row("person", &unmatched, "p_", &[("h_", "home")])
            .unwrap();
        assert!(store[p].referenced_records("home").unwrap().is_empty());
        // Only the two people and the matched house are stored.
        assert_eq!(store.len(), 3);
        assert!(store.ids().all(|id| !store[id].is_empty()));
    }
}
