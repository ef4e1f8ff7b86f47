//! Batched, recursive loading of relationships.
//!
//! [`RelationshipFiller::fill`] takes a set of records of one schema and a
//! list of relationship paths such as `"parents.parent.children"`. It walks
//! the paths one relationship at a time, issuing at most one query per
//! relationship per level:
//!
//! - loaded links that still match a record's foreign key are reused, and a
//!   null foreign key is linked to nothing without a lookup;
//! - foreign keys pointing at a primary key already held by a record in the
//!   graph are answered from the identity cache;
//! - every remaining distinct key value goes into a single `IN` query.
//!
//! Fetched rows become records through the identity cache, so a row reached
//! through several paths is still one record. Every input record is rewired
//! with [`Relationship::fill_relationship`], so links follow the current
//! foreign keys, and the loaded records become the input of the next path
//! segment.

use crate::identity_map::IdentityCache;
use rowgraph_core::{
    Condition, Connection, Error, IntegrityErrorKind, RecordId, RecordStore,
    Relationship, RelationshipErrorKind, Result, Row, Schema, SchemaRegistry, SelectQuery, Value,
};
use std::collections::HashSet;
use std::sync::Arc;

/// A relationship name with the path segments to load below it.
type PathNode = (String, Vec<String>);

/// Split `"a.b.c"` paths into first segments and their remainders.
///
/// Paths sharing a first segment merge into one node, in order of first
/// appearance.
fn parse_paths<S: AsRef<str>>(paths: &[S]) -> Vec<PathNode> {
    let mut nodes: Vec<PathNode> = Vec::new();
    for path in paths {
        let (head, tail) = match path.as_ref().split_once('.') {
            Some((head, tail)) => (head, Some(tail)),
            None => (path.as_ref(), None),
        };
        let index = match nodes.iter().position(|(name, _)| name == head) {
            Some(index) => index,
            None => {
                nodes.push((head.to_string(), Vec::new()));
                nodes.len() - 1
            }
        };
        if let Some(tail) = tail {
            nodes[index].1.push(tail.to_string());
        }
    }
    nodes
}

/// Resolve every path segment against the schemas before anything is queried.
fn validate_paths<S: AsRef<str>>(
    registry: &SchemaRegistry,
    schema: &Schema,
    paths: &[S],
) -> Result<()> {
    for (name, children) in parse_paths(paths) {
        let relationship = schema.relationship(&name)?;
        reject_composite(relationship)?;
        if !children.is_empty() {
            let referenced = registry.schema(relationship.referenced_schema())?;
            validate_paths(registry, referenced, &children)?;
        }
    }
    Ok(())
}

fn reject_composite(relationship: &Relationship) -> Result<()> {
    if relationship.is_composite() {
        return Err(Error::relationship(
            RelationshipErrorKind::CompositeKey,
            relationship.schema(),
            relationship.name(),
            "Filling relationships for composite foreign keys is not supported",
        ));
    }
    Ok(())
}

/// Do the loaded `linked` records still answer the foreign key `value`?
///
/// An empty unique link with a non-null key counts as stale.
fn links_follow_key(
    store: &RecordStore,
    relationship: &Relationship,
    linked: &[RecordId],
    value: &Value,
) -> bool {
    let field = &relationship.referenced_fields()[0];
    if linked.is_empty() {
        return !relationship.is_unique_relationship();
    }
    linked
        .iter()
        .any(|&target| store[target].get(field).is_ok_and(|v| v.matches(value)))
}

/// Loads relationships for records over a connection.
pub struct RelationshipFiller<'c, C: Connection + ?Sized> {
    connection: &'c mut C,
    cache: IdentityCache,
}

impl<'c, C: Connection + ?Sized> RelationshipFiller<'c, C> {
    /// Create a filler with an empty identity cache.
    pub fn new(connection: &'c mut C) -> Self {
        Self {
            connection,
            cache: IdentityCache::new(),
        }
    }

    /// Load the relationship `paths` for `records`.
    ///
    /// All records must belong to one schema. Records already reachable from
    /// them through loaded links seed the identity cache, so rows the graph
    /// already holds are neither fetched again nor duplicated.
    pub fn fill<S: AsRef<str>>(
        &mut self,
        store: &mut RecordStore,
        records: &[RecordId],
        paths: &[S],
    ) -> Result<()> {
        let Some(&first) = records.first() else {
            return Ok(());
        };

        let schema = Arc::clone(store[first].schema());
        if let Some(&other) = records
            .iter()
            .find(|&&id| store[id].schema().name() != schema.name())
        {
            return Err(Error::integrity(
                IntegrityErrorKind::SchemaMismatch,
                format!(
                    "The provided records did not share the same schema: '{}' and '{}'",
                    schema.name(),
                    store[other].schema().name()
                ),
            ));
        }

        let registry = Arc::clone(store.registry());
        validate_paths(&registry, &schema, paths)?;

        self.cache.clear();
        for &id in records {
            for reachable in store.all_referenced_records(id) {
                self.cache.cache_record(store, reachable)?;
            }
        }
        tracing::debug!(
            schema = schema.name(),
            records = records.len(),
            cached = self.cache.len(),
            "Filling relationships"
        );

        self.fill_level(store, records, paths)
    }

    #[tracing::instrument(level = "debug", skip_all, fields(records = records.len()))]
    fn fill_level<S: AsRef<str>>(
        &mut self,
        store: &mut RecordStore,
        records: &[RecordId],
        paths: &[S],
    ) -> Result<()> {
        let Some(&first) = records.first() else {
            return Ok(());
        };
        let schema = Arc::clone(store[first].schema());

        for (name, children) in parse_paths(paths) {
            let relationship = schema.relationship(&name)?;
            reject_composite(relationship)?;

            let name = relationship.name();
            let key = &relationship.fields()[0];
            let field = &relationship.referenced_fields()[0];
            let parent = Arc::clone(store.schema(relationship.referenced_schema())?);
            let is_primary_reference = relationship.referenced_fields() == parent.primary_key();

            let mut seen: HashSet<String> = HashSet::new();
            let mut loaded: Vec<RecordId> = Vec::new();
            let mut pending: Vec<(RecordId, String)> = Vec::new();

            // A null key needs no lookup: fill_relationship links it to nothing.
            for &id in records {
                let record = &store[id];
                let value = record.get(key)?;
                let Some(canonical) = value.key_string() else {
                    continue;
                };
                if record.has_referenced_records(name)? {
                    let linked = record.referenced_records(name)?;
                    if links_follow_key(store, relationship, linked, value) {
                        seen.insert(canonical);
                        loaded.extend_from_slice(linked);
                        continue;
                    }
                    tracing::trace!(relationship = name, record = %id, "Loaded links are stale");
                }
                pending.push((id, canonical));
            }

            let mut options: Vec<Value> = Vec::new();
            let mut cached = 0_usize;
            for (id, canonical) in &pending {
                if !seen.insert(canonical.clone()) {
                    continue;
                }
                let value = store[*id].get(key)?;
                if is_primary_reference {
                    if let Some(hit) = self.cache.get(parent.name(), std::slice::from_ref(value)) {
                        tracing::trace!(relationship = name, record = %hit, "Answered from cache");
                        loaded.push(hit);
                        cached += 1;
                        continue;
                    }
                }
                options.push(value.clone());
            }

            tracing::debug!(
                relationship = name,
                pending = pending.len(),
                cached = cached,
                fetch = options.len(),
                "Resolving relationship"
            );

            if !options.is_empty() {
                let query = SelectQuery::new(parent.table(), parent.fields().to_vec())
                    .filter(Condition::is_in(field.as_str(), options));
                tracing::trace!(sql = %query, "Fetching related records");
                let rows: Vec<Row> = self.connection.select(&query)?.collect::<Result<_>>()?;
                for row in &rows {
                    let requested = row
                        .get_by_name(field)
                        .and_then(Value::key_string)
                        .is_some_and(|value| seen.contains(&value));
                    if !requested {
                        tracing::warn!(
                            relationship = name,
                            table = parent.table(),
                            "Fetched a row that was not requested"
                        );
                    }
                    loaded.push(self.cache.get_or_create(store, parent.name(), row)?);
                }
            }

            let mut unique = HashSet::with_capacity(loaded.len());
            loaded.retain(|id| unique.insert(*id));

            relationship.fill_relationship(store, records, &loaded)?;

            tracing::debug!(relationship = name, loaded = loaded.len(), "Relationship filled");

            if !loaded.is_empty() && !children.is_empty() {
                self.fill_level(store, &loaded, &children)?;
            }
        }

        Ok(())
    }
}
