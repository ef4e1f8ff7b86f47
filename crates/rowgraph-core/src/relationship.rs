//! Relationship descriptors and the algorithms that wire records together.
//!
//! A [`Relationship`] is a directed association: the `fields` of one schema
//! reference the `referenced_fields` of another. Every relationship that is
//! ever filled needs exactly one reverse relationship, declared on the
//! referenced schema with the field lists swapped, so that links can be
//! written in both directions.
//!
//! Relationships are built by [`crate::SchemaRegistry`] and never change
//! afterwards, except for the lazily detected reverse name.

use crate::Result;
use crate::error::{CardinalityErrorKind, Error, IntegrityErrorKind, RelationshipErrorKind};
use crate::schema::{Schema, SchemaRegistry};
use crate::store::{RecordId, RecordStore};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// One named association between two schemas.
#[derive(Debug, Clone)]
pub struct Relationship {
    name: String,
    schema: String,
    fields: Vec<String>,
    referenced_schema: String,
    referenced_fields: Vec<String>,
    unique: bool,
    aliases: Vec<String>,
    /// Name of the reverse relationship on the referenced schema, once found
    reverse: OnceLock<String>,
}

impl Relationship {
    /// Create a relationship from `schema.fields` to `referenced.referenced_fields`.
    ///
    /// The relationship is unique when `unique` is set or when the referenced
    /// fields cover the referenced schema's entire primary key.
    pub fn new(
        name: impl Into<String>,
        schema: &Schema,
        fields: Vec<String>,
        referenced: &Schema,
        referenced_fields: Vec<String>,
        unique: bool,
    ) -> Result<Self> {
        let name = name.into();
        let invalid = |message: &str| {
            Error::relationship(
                RelationshipErrorKind::InvalidDefinition,
                schema.name(),
                &name,
                message,
            )
        };

        if fields.is_empty() || fields.len() != referenced_fields.len() {
            return Err(invalid("Unexpected list of fields in relationship"));
        }
        if !fields.iter().all(|f| schema.has_field(f)) {
            return Err(invalid(
                "The referencing fields must be defined in the referencing schema",
            ));
        }
        if !referenced_fields.iter().all(|f| referenced.has_field(f)) {
            return Err(invalid(
                "The referenced fields must be defined in the referenced schema",
            ));
        }

        let covers_primary_key = referenced
            .primary_key()
            .iter()
            .all(|pk| referenced_fields.contains(pk));

        Ok(Self {
            schema: schema.name().to_string(),
            fields,
            referenced_schema: referenced.name().to_string(),
            referenced_fields,
            unique: unique || covers_primary_key,
            aliases: Vec::new(),
            reverse: OnceLock::new(),
            name,
        })
    }

    pub(crate) fn with_aliases(mut self, aliases: Vec<String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// The canonical relationship name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Alternative names that resolve to this relationship.
    pub fn aliases(&self) -> impl Iterator<Item = &str> {
        self.aliases.iter().map(String::as_str)
    }

    /// Name of the referencing schema.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Foreign key fields on the referencing schema.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Name of the referenced schema.
    pub fn referenced_schema(&self) -> &str {
        &self.referenced_schema
    }

    /// Fields on the referenced schema, paired by position with [`Relationship::fields`].
    pub fn referenced_fields(&self) -> &[String] {
        &self.referenced_fields
    }

    /// Does this relationship reference at most one record?
    pub fn is_unique_relationship(&self) -> bool {
        self.unique
    }

    /// Is this a multi-field foreign key?
    pub fn is_composite(&self) -> bool {
        self.fields.len() != 1
    }

    /// Is `other` the exact swap of this relationship?
    fn is_reverse_of(&self, other: &Relationship) -> bool {
        other.schema == self.referenced_schema
            && other.referenced_schema == self.schema
            && other.fields == self.referenced_fields
            && other.referenced_fields == self.fields
    }

    /// The single relationship on the referenced schema that swaps this one.
    ///
    /// The result is detected on first use and cached.
    pub fn reverse_relationship<'r>(&self, registry: &'r SchemaRegistry) -> Result<&'r Relationship> {
        let referenced = registry.schema(&self.referenced_schema)?;

        if let Some(name) = self.reverse.get() {
            return referenced.relationship(name);
        }

        let mut candidates = referenced
            .relationships()
            .iter()
            .filter(|candidate| self.is_reverse_of(candidate));

        let reverse = match (candidates.next(), candidates.next()) {
            (Some(reverse), None) => reverse,
            (Some(_), Some(_)) => {
                return Err(Error::relationship(
                    RelationshipErrorKind::AmbiguousReverse,
                    &self.schema,
                    &self.name,
                    "Multiple reverse relationship exists for this relationship",
                ));
            }
            (None, _) => {
                return Err(Error::relationship(
                    RelationshipErrorKind::NoReverse,
                    &self.schema,
                    &self.name,
                    "No reverse relationship exists for this relationship",
                ));
            }
        };

        let _ = self.reverse.set(reverse.name.clone());
        Ok(reverse)
    }

    fn reject_composite(&self) -> Result<()> {
        if self.is_composite() {
            return Err(Error::relationship(
                RelationshipErrorKind::CompositeKey,
                &self.schema,
                &self.name,
                "Relationship fill is not supported for composite foreign keys",
            ));
        }
        Ok(())
    }

    fn check_schema(&self, store: &RecordStore, ids: &[RecordId], expected: &str) -> Result<()> {
        match ids.iter().find(|&&id| store[id].schema().name() != expected) {
            Some(&id) => Err(Error::integrity(
                IntegrityErrorKind::SchemaMismatch,
                format!(
                    "Relationship '{}' expected records of schema '{}', got '{}'",
                    self.name,
                    expected,
                    store[id].schema().name()
                ),
            )),
            None => Ok(()),
        }
    }

    /// Wire `records` to the matching `referenced` records.
    ///
    /// Each record is linked to the referenced records whose referenced field
    /// equals its foreign key, or to an empty list when the key is null or
    /// matches nothing. When the reverse relationship is unique, every matched
    /// referenced record gets a reverse link to its referencing record.
    #[tracing::instrument(level = "trace", skip(self, store, records, referenced), fields(relationship = %self.name))]
    pub fn fill_relationship(
        &self,
        store: &mut RecordStore,
        records: &[RecordId],
        referenced: &[RecordId],
    ) -> Result<()> {
        self.reject_composite()?;

        if records.is_empty() {
            return Ok(());
        }

        self.check_schema(store, referenced, &self.referenced_schema)?;
        self.check_schema(store, records, &self.schema)?;

        let key = &self.fields[0];
        let field = &self.referenced_fields[0];

        let mut sorted: HashMap<String, Vec<RecordId>> = HashMap::new();
        for &id in referenced {
            let Some(value) = store[id].value_of(field).and_then(|v| v.key_string()) else {
                continue;
            };
            let bucket = sorted.entry(value).or_default();
            if self.unique && !bucket.is_empty() {
                return Err(Error::cardinality(
                    CardinalityErrorKind::TooManyRecords,
                    &self.name,
                    "Unique relationship cannot reference more than a single record",
                ));
            }
            bucket.push(id);
        }

        let registry = Arc::clone(store.registry());
        let reverse = self.reverse_relationship(&registry)?;
        let fill_reverse = reverse.is_unique_relationship();

        for &id in records {
            let matched = store[id]
                .value_of(key)
                .and_then(|v| v.key_string())
                .and_then(|value| sorted.get(&value))
                .cloned()
                .unwrap_or_default();

            tracing::trace!(record = %id, matched = matched.len(), "Assigning related records");

            if fill_reverse {
                for &related in &matched {
                    store[related].link(reverse.name(), vec![id]);
                }
            }
            store[id].link(&self.name, matched);
        }

        Ok(())
    }

    /// Wire one record to the single record it references.
    ///
    /// An empty referenced record (every value null) means the record has no
    /// related record, as produced by an outer join with no match.
    pub fn fill_single_record(
        &self,
        store: &mut RecordStore,
        record: RecordId,
        referenced: RecordId,
    ) -> Result<()> {
        self.check_referencing_record(store, record)?;
        self.check_schema(store, &[referenced], &self.referenced_schema)?;

        if store[referenced].is_empty() {
            store[record].link(&self.name, Vec::new());
            return Ok(());
        }

        for (key, field) in self.fields.iter().zip(&self.referenced_fields) {
            let own = store[record].value_of(key).and_then(|v| v.key_string());
            let other = store[referenced].value_of(field).and_then(|v| v.key_string());
            if own != other {
                return Err(Error::integrity(
                    IntegrityErrorKind::MismatchedReference,
                    format!(
                        "Tried to fill relationship '{}' with a record that is not the referenced record",
                        self.name
                    ),
                ));
            }
        }

        let registry = Arc::clone(store.registry());
        let reverse = self.reverse_relationship(&registry)?;

        store[record].link(&self.name, vec![referenced]);
        if reverse.is_unique_relationship() {
            store[referenced].link(reverse.name(), vec![record]);
        }

        Ok(())
    }

    /// Mark a unique relationship as loaded with no related record.
    pub(crate) fn fill_no_record(&self, store: &mut RecordStore, record: RecordId) -> Result<()> {
        self.check_referencing_record(store, record)?;
        store[record].link(&self.name, Vec::new());
        Ok(())
    }

    fn check_referencing_record(&self, store: &RecordStore, record: RecordId) -> Result<()> {
        if !self.unique {
            return Err(Error::cardinality(
                CardinalityErrorKind::ExpectedUnique,
                &self.name,
                "Only unique relationships can be filled with single records",
            ));
        }
        self.check_schema(store, &[record], &self.schema)
    }
}
