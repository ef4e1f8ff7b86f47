//! Identity cache for one relationship fill.
//!
//! The cache maps `(schema name, primary key)` to the single record standing
//! for that row, so every row fetched during a fill becomes exactly one
//! record no matter how many paths reach it.
//!
//! Primary keys are compared by their canonical key strings, the same loose
//! equality relationship matching uses: `Int(1)` and `Text("1")` are the
//! same identity.

use rowgraph_core::{Error, IntegrityErrorKind, RecordId, RecordStore, Result, Row, Value};
use std::collections::HashMap;
use std::collections::hash_map::Entry;

/// `(schema name, primary key as key strings)`
type IdentityKey = (String, Vec<String>);

/// Key strings for a primary key, or `None` when any part is null.
fn key_strings<'a>(values: impl IntoIterator<Item = &'a Value>) -> Option<Vec<String>> {
    values.into_iter().map(Value::key_string).collect()
}

/// Records by identity.
#[derive(Debug, Default)]
pub struct IdentityCache {
    records: HashMap<IdentityKey, RecordId>,
}

impl IdentityCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget every cached record.
    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Get the number of cached records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if no record is cached.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Remember a record under its primary key.
    ///
    /// New records have no identity yet and are skipped, as are records with
    /// a null primary key value. Returns whether the record was added.
    ///
    /// Fails when a different record already holds the same identity.
    pub fn cache_record(&mut self, store: &RecordStore, id: RecordId) -> Result<bool> {
        let record = &store[id];
        if record.is_new() {
            tracing::trace!(record = %id, "Skipping unsaved record");
            return Ok(false);
        }
        let Some(key) = key_strings(record.primary_key()?) else {
            return Ok(false);
        };

        match self.records.entry((record.schema().name().to_string(), key)) {
            Entry::Occupied(entry) if *entry.get() != id => Err(Error::integrity(
                IntegrityErrorKind::DuplicateIdentity,
                format!(
                    "Duplicated record detected for schema '{}' with primary key ({})",
                    record.schema().name(),
                    entry.key().1.join(", ")
                ),
            )),
            Entry::Occupied(_) => Ok(false),
            Entry::Vacant(entry) => {
                entry.insert(id);
                Ok(true)
            }
        }
    }

    /// Look up the record with the given primary key.
    pub fn get(&self, schema: &str, primary_key: &[Value]) -> Option<RecordId> {
        let key = key_strings(primary_key)?;
        self.records.get(&(schema.to_string(), key)).copied()
    }

    /// The cached record for a fetched row, or a new record for it.
    ///
    /// A cached record keeps its current values; the row only supplies the
    /// identity.
    pub fn get_or_create(
        &mut self,
        store: &mut RecordStore,
        schema: &str,
        row: &Row,
    ) -> Result<RecordId> {
        let definition = store.schema(schema)?;
        let primary_key: Option<Vec<Value>> = definition
            .primary_key()
            .iter()
            .map(|field| row.get_by_name(field).cloned())
            .collect();

        if let Some(id) = primary_key.as_deref().and_then(|pk| self.get(schema, pk)) {
            tracing::trace!(schema = schema, record = %id, "Identity cache hit");
            return Ok(id);
        }

        let id = store.create_record_from_values(schema, row)?;
        self.cache_record(store, id)?;
        Ok(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowgraph_core::{SchemaDefinition, SchemaRegistry};
    use std::sync::Arc;

    fn store() -> RecordStore {
        let defs = vec![
            SchemaDefinition::new("item")
                .fields(["id", "label"])
                .primary_key(["id"]),
            SchemaDefinition::new("pair")
                .fields(["a", "b"])
                .primary_key(["a", "b"]),
        ];
        RecordStore::new(Arc::new(SchemaRegistry::from_definitions(defs).unwrap()))
    }

    fn item(id: i64) -> Row {
        Row::from_pairs([("id", Value::BigInt(id)), ("label", Value::from("x"))])
    }

    #[test]
    fn test_get_or_create_returns_same_record() {
        let mut store = store();
        let mut cache = IdentityCache::new();

        let first = cache.get_or_create(&mut store, "item", &item(1)).unwrap();
        let again = cache.get_or_create(&mut store, "item", &item(1)).unwrap();
        let other = cache.get_or_create(&mut store, "item", &item(2)).unwrap();

        assert_eq!(first, again);
        assert_ne!(first, other);
        assert_eq!(store.len(), 2);
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_identity_is_loose() {
        let mut store = store();
        let mut cache = IdentityCache::new();
        let id = cache.get_or_create(&mut store, "item", &item(7)).unwrap();
        assert_eq!(cache.get("item", &[Value::Text("7".into())]), Some(id));
        assert_eq!(cache.get("item", &[Value::Int(7)]), Some(id));
        assert_eq!(cache.get("pair", &[Value::Int(7)]), None);
        assert_eq!(cache.get("item", &[Value::Null]), None);
    }

    #[test]
    fn test_duplicate_identity_is_rejected() {
        let mut store = store();
        let mut cache = IdentityCache::new();
        let a = store.create_record_from_values("item", &item(1)).unwrap();
        let b = store.create_record_from_values("item", &item(1)).unwrap();

        assert!(cache.cache_record(&store, a).unwrap());
        assert!(!cache.cache_record(&store, a).unwrap());
        let err = cache.cache_record(&store, b).unwrap_err();
        assert_eq!(
            err.integrity_kind(),
            Some(IntegrityErrorKind::DuplicateIdentity)
        );
    }

    #[test]
    fn test_new_records_are_not_cached() {
        let mut store = store();
        let mut cache = IdentityCache::new();
        let fresh = store.create_record("item").unwrap();
        assert!(!cache.cache_record(&store, fresh).unwrap());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_composite_keys() {
        let mut store = store();
        let mut cache = IdentityCache::new();
        let row = Row::from_pairs([("a", 1_i64), ("b", 2_i64)]);
        let id = cache.get_or_create(&mut store, "pair", &row).unwrap();
        assert_eq!(cache.get("pair", &[Value::Int(1), Value::Int(2)]), Some(id));
        assert_eq!(cache.get("pair", &[Value::Int(2), Value::Int(1)]), None);

        cache.clear();
        assert!(cache.get("pair", &[Value::Int(1), Value::Int(2)]).is_none());
    }
}
