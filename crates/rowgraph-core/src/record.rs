//! Records: the in-memory state of one database row.
//!
//! A [`Record`] owns the values of one row of its schema, tracks which fields
//! changed since the last state transition, and remembers the primary key the
//! row had when it was last loaded or persisted. Links to related records are
//! [`RecordId`] handles into the [`crate::RecordStore`] that owns the record.

use crate::Result;
use crate::error::{Error, IdentityErrorKind, IntegrityErrorKind};
use crate::row::{ColumnInfo, Row};
use crate::schema::Schema;
use crate::store::RecordId;
use crate::value::{FromValue, Value};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// Lifecycle state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordState {
    /// Not yet stored in the database
    Insert,
    /// Backed by an existing database row
    Update,
    /// The row has been deleted. Terminal.
    Delete,
}

impl fmt::Display for RecordState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordState::Insert => write!(f, "insert"),
            RecordState::Update => write!(f, "update"),
            RecordState::Delete => write!(f, "delete"),
        }
    }
}

/// The values, state and relationship links of one row.
#[derive(Debug, Clone)]
pub struct Record {
    schema: Arc<Schema>,
    /// Indexed by field position in the schema
    values: Vec<Value>,
    changed: BTreeSet<usize>,
    state: RecordState,
    /// Primary key snapshot, valid once the record is persisted
    primary_key: Vec<Value>,
    /// Canonical relationship name -> linked records
    referenced: HashMap<String, Vec<RecordId>>,
}

impl Record {
    /// Create a new record for the schema with every field null.
    pub fn new(schema: Arc<Schema>) -> Self {
        let values = vec![Value::Null; schema.fields().len()];
        Self {
            schema,
            values,
            changed: BTreeSet::new(),
            state: RecordState::Insert,
            primary_key: Vec::new(),
            referenced: HashMap::new(),
        }
    }

    /// Create a record for an existing row.
    pub fn from_values(schema: Arc<Schema>, row: &Row) -> Result<Self> {
        let mut record = Self::new(schema);
        record.set_database_values(row)?;
        Ok(record)
    }

    /// Get the schema of this record.
    pub fn schema(&self) -> &Arc<Schema> {
        &self.schema
    }

    /// Get the lifecycle state.
    pub fn state(&self) -> RecordState {
        self.state
    }

    /// Check if the record has not been inserted yet.
    pub fn is_new(&self) -> bool {
        self.state == RecordState::Insert
    }

    /// Check if the record has been deleted.
    pub fn is_deleted(&self) -> bool {
        self.state == RecordState::Delete
    }

    /// The primary key as it was when the record was last loaded or persisted.
    pub fn primary_key(&self) -> Result<&[Value]> {
        if self.is_new() {
            return Err(Error::identity(
                IdentityErrorKind::NotPersisted,
                self.schema.name(),
                "Cannot refer to a record that has not been saved",
            ));
        }
        Ok(&self.primary_key)
    }

    /// Record a completed database operation.
    ///
    /// Any state other than [`RecordState::Delete`] moves the record to
    /// [`RecordState::Update`]. The changed fields are cleared and the primary
    /// key snapshot is taken from the current values.
    pub fn update_state(&mut self, state: RecordState) -> Result<()> {
        self.ensure_not_deleted()?;
        self.state = match state {
            RecordState::Delete => RecordState::Delete,
            RecordState::Insert | RecordState::Update => RecordState::Update,
        };
        self.changed.clear();
        self.primary_key = self.current_primary_key();
        Ok(())
    }

    fn current_primary_key(&self) -> Vec<Value> {
        self.schema
            .primary_key()
            .iter()
            .map(|field| self.value_of(field).cloned().unwrap_or(Value::Null))
            .collect()
    }

    fn ensure_not_deleted(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(Error::state(
                self.schema.name(),
                "Cannot modify a record that has been deleted",
            ));
        }
        Ok(())
    }

    fn index(&self, field: &str) -> Result<usize> {
        self.schema.field_index(field).ok_or_else(|| {
            Error::integrity(
                IntegrityErrorKind::UnknownField,
                format!(
                    "Invalid record field '{}' for schema '{}'",
                    field,
                    self.schema.name()
                ),
            )
        })
    }

    pub(crate) fn value_of(&self, field: &str) -> Option<&Value> {
        self.schema.field_index(field).map(|i| &self.values[i])
    }

    /// Get the value of a field.
    pub fn get(&self, field: &str) -> Result<&Value> {
        let index = self.index(field)?;
        Ok(&self.values[index])
    }

    /// Get the value of a field converted to `T`.
    pub fn get_as<T: FromValue>(&self, field: &str) -> Result<T> {
        T::from_value(self.get(field)?)
    }

    /// Set the value of a field and mark it changed.
    pub fn set(&mut self, field: &str, value: impl Into<Value>) -> Result<()> {
        self.ensure_not_deleted()?;
        let index = self.index(field)?;
        self.values[index] = value.into();
        self.changed.insert(index);
        Ok(())
    }

    /// Set a field to null.
    ///
    /// For a new record the field is no longer considered changed, so an
    /// insert leaves it to the database default.
    pub fn unset(&mut self, field: &str) -> Result<()> {
        self.set(field, Value::Null)?;
        if self.is_new() {
            let index = self.index(field)?;
            self.changed.remove(&index);
        }
        Ok(())
    }

    /// Does the field hold a non-null value?
    pub fn is_set(&self, field: &str) -> Result<bool> {
        Ok(!self.get(field)?.is_null())
    }

    /// Fields changed since the last state transition, in schema order.
    pub fn changed_fields(&self) -> Vec<&str> {
        self.changed
            .iter()
            .map(|&i| self.schema.fields()[i].as_str())
            .collect()
    }

    /// Check if a field changed since the last state transition.
    pub fn is_changed(&self, field: &str) -> bool {
        self.schema
            .field_index(field)
            .is_some_and(|i| self.changed.contains(&i))
    }

    /// Replace all values with a row read from the database.
    ///
    /// The row must hold exactly the schema's fields, in any order. The
    /// record becomes persisted with a fresh primary key snapshot.
    pub fn set_database_values(&mut self, row: &Row) -> Result<()> {
        self.ensure_not_deleted()?;

        let fields = self.schema.fields();
        let mut values = vec![Value::Null; fields.len()];
        let mut seen = vec![false; fields.len()];
        for (column, value) in row.iter() {
            match self.schema.field_index(column) {
                Some(i) if !seen[i] => {
                    seen[i] = true;
                    values[i] = value.clone();
                }
                _ => return Err(self.invalid_values()),
            }
        }
        if seen.iter().any(|s| !s) {
            return Err(self.invalid_values());
        }

        self.values = values;
        self.state = RecordState::Update;
        self.changed.clear();
        self.primary_key = self.current_primary_key();
        Ok(())
    }

    fn invalid_values(&self) -> Error {
        Error::integrity(
            IntegrityErrorKind::InvalidValues,
            format!(
                "Invalid set of record database values provided for schema '{}'",
                self.schema.name()
            ),
        )
    }

    /// All values as a row in schema field order.
    pub fn database_values(&self) -> Row {
        let columns = Arc::new(ColumnInfo::new(self.schema.fields().to_vec()));
        Row::with_columns(columns, self.values.clone())
    }

    /// Iterate over (field, value) pairs in schema order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.schema
            .fields()
            .iter()
            .map(String::as_str)
            .zip(self.values.iter())
    }

    /// Is every value null?
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }

    /// Has the named relationship been filled?
    ///
    /// Aliases resolve to their relationship. A name the schema does not
    /// declare is an error.
    pub fn has_referenced_records(&self, name: &str) -> Result<bool> {
        let relationship = self.schema.relationship(name)?;
        Ok(self.referenced.contains_key(relationship.name()))
    }

    /// The records linked through the named relationship.
    ///
    /// Fails with a "not loaded" error when the relationship has not been
    /// filled; an empty slice means it was filled and nothing matched.
    pub fn referenced_records(&self, name: &str) -> Result<&[RecordId]> {
        let relationship = self.schema.relationship(name)?;
        self.referenced
            .get(relationship.name())
            .map(Vec::as_slice)
            .ok_or_else(|| Error::not_loaded(self.schema.name(), relationship.name()))
    }

    /// Loaded relationships and their links, in declaration order.
    pub fn links(&self) -> impl Iterator<Item = (&str, &[RecordId])> {
        self.schema.relationships().iter().filter_map(|rel| {
            self.referenced
                .get(rel.name())
                .map(|ids| (rel.name(), ids.as_slice()))
        })
    }

    /// Replace the links of a relationship without any validation.
    pub(crate) fn link(&mut self, name: &str, ids: Vec<RecordId>) {
        let canonical = self
            .schema
            .relationship(name)
            .map_or_else(|_| name.to_string(), |rel| rel.name().to_string());
        self.referenced.insert(canonical, ids);
    }

    /// Append a link to an already loaded relationship, skipping duplicates.
    pub(crate) fn push_link(&mut self, name: &str, id: RecordId) -> Result<()> {
        let relationship = self.schema.relationship(name)?;
        let Some(ids) = self.referenced.get_mut(relationship.name()) else {
            return Err(Error::not_loaded(self.schema.name(), relationship.name()));
        };
        if !ids.contains(&id) {
            ids.push(id);
        }
        Ok(())
    }
}
