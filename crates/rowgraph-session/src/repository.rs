//! Finding and persisting records.
//!
//! A [`Repository`] owns a connection and moves records between it and a
//! [`RecordStore`]. It keeps record state in step with the database: inserts
//! and updates clear the changed fields and refresh the primary key snapshot,
//! deletes make the record terminal.

use crate::filler::RelationshipFiller;
use rowgraph_core::{
    Condition, Connection, Error, IdentityErrorKind, IntegrityErrorKind, Order, RecordId,
    RecordState, RecordStore, Result, Row, SelectQuery, Value,
};
use std::sync::Arc;

/// Record persistence over a connection.
#[derive(Debug)]
pub struct Repository<C: Connection> {
    connection: C,
}

impl<C: Connection> Repository<C> {
    /// Create a repository over a connection.
    pub fn new(connection: C) -> Self {
        Self { connection }
    }

    /// Get the underlying connection.
    pub fn connection(&self) -> &C {
        &self.connection
    }

    /// Get the underlying connection mutably.
    pub fn connection_mut(&mut self) -> &mut C {
        &mut self.connection
    }

    /// Consume the repository, returning the connection.
    pub fn into_inner(self) -> C {
        self.connection
    }

    /// Records of `schema` matching every condition.
    #[tracing::instrument(level = "debug", skip(self, store, conditions, order))]
    pub fn find(
        &mut self,
        store: &mut RecordStore,
        schema: &str,
        conditions: Vec<Condition>,
        order: Vec<(String, Order)>,
        limit: Option<u64>,
    ) -> Result<Vec<RecordId>> {
        let definition = Arc::clone(store.schema(schema)?);
        let query = SelectQuery {
            fields: definition.fields().to_vec(),
            table: definition.table().to_string(),
            conditions,
            order_by: order,
            limit,
        };
        self.fetch(store, schema, &query)
    }

    /// The first record matching every condition, ordered by primary key.
    pub fn find_one(
        &mut self,
        store: &mut RecordStore,
        schema: &str,
        conditions: Vec<Condition>,
    ) -> Result<Option<RecordId>> {
        let definition = Arc::clone(store.schema(schema)?);
        let order = definition
            .primary_key()
            .iter()
            .map(|field| (field.clone(), Order::Asc))
            .collect();
        let found = self.find(store, schema, conditions, order, Some(1))?;
        Ok(found.into_iter().next())
    }

    /// The record with the given primary key values, in primary key order.
    pub fn find_by_primary_key(
        &mut self,
        store: &mut RecordStore,
        schema: &str,
        values: &[Value],
    ) -> Result<Option<RecordId>> {
        let definition = Arc::clone(store.schema(schema)?);
        let keys = definition.primary_key();
        if values.len() != keys.len() || values.iter().any(Value::is_null) {
            return Err(Error::identity(
                IdentityErrorKind::IncompleteKey,
                schema,
                "Missing value for a primary key",
            ));
        }
        let conditions = keys
            .iter()
            .zip(values)
            .map(|(key, value)| Condition::eq(key.as_str(), value.clone()))
            .collect();
        self.find_one(store, schema, conditions)
    }

    fn fetch(
        &mut self,
        store: &mut RecordStore,
        schema: &str,
        query: &SelectQuery,
    ) -> Result<Vec<RecordId>> {
        let rows: Vec<Row> = self.connection.select(query)?.collect::<Result<_>>()?;
        tracing::debug!(schema = schema, rows = rows.len(), "Fetched records");
        rows.iter()
            .map(|row| store.create_record_from_row(schema, row, ""))
            .collect()
    }

    /// Insert a new record or update a persisted one.
    pub fn save(&mut self, store: &mut RecordStore, id: RecordId) -> Result<()> {
        let record = &store[id];
        if record.is_deleted() {
            return Err(Error::state(
                record.schema().name(),
                "Tried to save a record that has already been deleted",
            ));
        }
        if record.is_new() {
            self.insert(store, id)
        } else {
            self.update(store, id)
        }
    }

    /// Insert the record.
    ///
    /// With a single-field primary key left null, the key is generated by
    /// the database and written back to the record.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn insert(&mut self, store: &mut RecordStore, id: RecordId) -> Result<()> {
        let record = &store[id];
        if record.is_deleted() {
            return Err(Error::state(
                record.schema().name(),
                "Tried to insert a record that has already been deleted",
            ));
        }
        let schema = Arc::clone(record.schema());

        let generated = match schema.primary_key() {
            [key] if record.get(key)?.is_null() => Some(key.as_str()),
            _ => None,
        };
        let values: Vec<(String, Value)> = record
            .iter()
            .filter(|(field, _)| Some(*field) != generated)
            .map(|(field, value)| (field.to_string(), value.clone()))
            .collect();

        let key = self.connection.insert(schema.table(), &values, generated)?;

        if let (Some(field), Some(value)) = (generated, key) {
            tracing::trace!(field = field, value = %value, "Generated primary key");
            store[id].set(field, value)?;
        }
        store[id].update_state(RecordState::Insert)
    }

    /// Write the changed fields of a persisted record.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn update(&mut self, store: &mut RecordStore, id: RecordId) -> Result<()> {
        let record = &store[id];
        let conditions = primary_key_conditions(store, id)?;
        let values: Vec<(String, Value)> = record
            .changed_fields()
            .into_iter()
            .map(|field| -> Result<(String, Value)> {
                Ok((field.to_string(), record.get(field)?.clone()))
            })
            .collect::<Result<_>>()?;

        if !values.is_empty() {
            let affected =
                self.connection
                    .update(record.schema().table(), &values, &conditions)?;
            if affected == 0 {
                return Err(missing_record(store, id));
            }
        }
        store[id].update_state(RecordState::Update)
    }

    /// Delete the row of a persisted record.
    #[tracing::instrument(level = "debug", skip(self, store))]
    pub fn delete(&mut self, store: &mut RecordStore, id: RecordId) -> Result<()> {
        let conditions = primary_key_conditions(store, id)?;
        let affected = self
            .connection
            .delete(store[id].schema().table(), &conditions)?;
        if affected == 0 {
            return Err(missing_record(store, id));
        }
        store[id].update_state(RecordState::Delete)
    }

    /// Load relationship paths for records of one schema.
    pub fn fill_relationships<S: AsRef<str>>(
        &mut self,
        store: &mut RecordStore,
        records: &[RecordId],
        paths: &[S],
    ) -> Result<()> {
        RelationshipFiller::new(&mut self.connection).fill(store, records, paths)
    }
}

/// Conditions selecting a persisted record's row by its primary key snapshot.
fn primary_key_conditions(store: &RecordStore, id: RecordId) -> Result<Vec<Condition>> {
    let record = &store[id];
    if record.is_deleted() {
        return Err(Error::state(
            record.schema().name(),
            "The record has already been deleted",
        ));
    }
    let snapshot = record.primary_key()?;
    Ok(record
        .schema()
        .primary_key()
        .iter()
        .zip(snapshot)
        .map(|(field, value)| Condition::eq(field.as_str(), value.clone()))
        .collect())
}

fn missing_record(store: &RecordStore, id: RecordId) -> Error {
    Error::integrity(
        IntegrityErrorKind::MissingRecord,
        format!(
            "The row for the record of schema '{}' no longer exists",
            store[id].schema().name()
        ),
    )
}
