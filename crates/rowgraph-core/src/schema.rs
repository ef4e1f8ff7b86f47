//! Schemas, the schema registry and schema definitions.
//!
//! A [`SchemaDefinition`] is plain configuration: names of fields, keys and
//! relationships. [`SchemaRegistry::from_definitions`] validates a complete
//! set of definitions at once and produces immutable [`Schema`]s with typed
//! [`Relationship`] descriptors. Everything that can be wrong with a
//! definition is reported there, before any record exists.

use crate::Result;
use crate::error::{Error, RelationshipErrorKind, SchemaErrorKind};
use crate::relationship::Relationship;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

/// Identifier syntax accepted for schema, table, field and relationship names.
const IDENTIFIER_PATTERN: &str = r"^[A-Za-z_][A-Za-z0-9_]*$";

/// Compiled once and shared for the lifetime of the program.
fn identifier_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| match Regex::new(IDENTIFIER_PATTERN) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(error = %e, "Identifier pattern failed to compile");
            None
        }
    })
    .as_ref()
}

fn is_valid_identifier(name: &str) -> bool {
    identifier_regex().is_some_and(|re| re.is_match(name))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Accept either `"id"` or `["a", "b"]`.
fn one_or_many<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// Configuration of one relationship.
///
/// `key` lists the fields of the declaring schema, `field` the fields of the
/// target `schema` they reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    #[serde(deserialize_with = "one_or_many")]
    pub key: Vec<String>,
    pub schema: String,
    #[serde(deserialize_with = "one_or_many")]
    pub field: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub aliases: Vec<String>,
}

impl RelationshipDefinition {
    /// Single-field relationship `key -> schema.field`.
    pub fn new(
        name: impl Into<String>,
        key: impl Into<String>,
        schema: impl Into<String>,
        field: impl Into<String>,
    ) -> Self {
        Self::composite(name, vec![key.into()], schema, vec![field.into()])
    }

    /// Multi-field relationship.
    pub fn composite(
        name: impl Into<String>,
        key: Vec<String>,
        schema: impl Into<String>,
        field: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            key,
            schema: schema.into(),
            field,
            unique: false,
            aliases: Vec::new(),
        }
    }

    /// Declare the relationship unique even if the referenced fields are not
    /// the target's primary key.
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Add an alternative name resolving to this relationship.
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.aliases.push(alias.into());
        self
    }
}

/// Configuration of one schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaDefinition {
    pub name: String,
    /// Defaults to the schema name.
    #[serde(default)]
    pub table: Option<String>,
    #[serde(deserialize_with = "one_or_many")]
    pub primary_key: Vec<String>,
    pub fields: Vec<String>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDefinition>,
}

impl SchemaDefinition {
    /// Start a definition for the named schema. The table defaults to the name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: None,
            primary_key: Vec::new(),
            fields: Vec::new(),
            relationships: Vec::new(),
        }
    }

    /// Set the database table.
    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    /// Set the field names.
    pub fn fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Set the primary key fields.
    pub fn primary_key<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = fields.into_iter().map(Into::into).collect();
        self
    }

    /// Add a relationship.
    pub fn relationship(mut self, definition: RelationshipDefinition) -> Self {
        self.relationships.push(definition);
        self
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::schema(SchemaErrorKind::Invalid, message)
}

/// An immutable schema: table, fields, primary key and relationships.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    table: String,
    fields: Vec<String>,
    field_index: HashMap<String, usize>,
    primary_key: Vec<String>,
    relationships: Vec<Relationship>,
    /// Relationship name or alias -> position in `relationships`
    relationship_index: HashMap<String, usize>,
}

impl Schema {
    /// Build a schema without relationships, validating its own fields.
    fn from_definition(def: &SchemaDefinition) -> Result<Self> {
        if !is_valid_identifier(&def.name) {
            return Err(invalid(format!("Invalid schema name '{}'", def.name)));
        }
        let table = def.table.clone().unwrap_or_else(|| def.name.clone());
        if !is_valid_identifier(&table) {
            return Err(invalid(format!(
                "Invalid table name '{}' for schema '{}'",
                table, def.name
            )));
        }
        if def.fields.is_empty() {
            return Err(invalid(format!("Schema '{}' declares no fields", def.name)));
        }

        let mut field_index = HashMap::with_capacity(def.fields.len());
        for (i, field) in def.fields.iter().enumerate() {
            if !is_valid_identifier(field) {
                return Err(invalid(format!(
                    "Invalid field name '{}' in schema '{}'",
                    field, def.name
                )));
            }
            if field_index.insert(field.clone(), i).is_some() {
                return Err(invalid(format!(
                    "Field '{}' declared twice in schema '{}'",
                    field, def.name
                )));
            }
        }

        if def.primary_key.is_empty() {
            return Err(invalid(format!(
                "Schema '{}' declares no primary key",
                def.name
            )));
        }
        for field in &def.primary_key {
            if !field_index.contains_key(field) {
                return Err(invalid(format!(
                    "Primary key field '{}' is not a field of schema '{}'",
                    field, def.name
                )));
            }
        }

        Ok(Self {
            name: def.name.clone(),
            table,
            fields: def.fields.clone(),
            field_index,
            primary_key: def.primary_key.clone(),
            relationships: Vec::new(),
            relationship_index: HashMap::new(),
        })
    }

    fn attach_relationships(&mut self, relationships: Vec<Relationship>) -> Result<()> {
        for (i, relationship) in relationships.iter().enumerate() {
            let names = std::iter::once(relationship.name()).chain(relationship.aliases());
            for name in names {
                if !is_valid_identifier(name) {
                    return Err(Error::relationship(
                        RelationshipErrorKind::InvalidDefinition,
                        &self.name,
                        name,
                        "Invalid relationship name",
                    ));
                }
                if self.field_index.contains_key(name) {
                    return Err(Error::relationship(
                        RelationshipErrorKind::InvalidDefinition,
                        &self.name,
                        name,
                        "Relationship name collides with a field name",
                    ));
                }
                if self.relationship_index.insert(name.to_string(), i).is_some() {
                    return Err(Error::relationship(
                        RelationshipErrorKind::InvalidDefinition,
                        &self.name,
                        name,
                        "Relationship name declared twice",
                    ));
                }
            }
        }
        self.relationships = relationships;
        Ok(())
    }

    /// The stable schema identifier.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The database table backing this schema.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Field names in declaration order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Primary key fields in declaration order.
    pub fn primary_key(&self) -> &[String] {
        &self.primary_key
    }

    /// Position of a field in [`Schema::fields`].
    pub fn field_index(&self, field: &str) -> Option<usize> {
        self.field_index.get(field).copied()
    }

    /// Check if the schema declares a field.
    pub fn has_field(&self, field: &str) -> bool {
        self.field_index.contains_key(field)
    }

    /// Relationships in declaration order.
    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    /// Look up a relationship by name or alias.
    pub fn relationship(&self, name: &str) -> Result<&Relationship> {
        self.relationship_index
            .get(name)
            .map(|&i| &self.relationships[i])
            .ok_or_else(|| {
                Error::relationship(
                    RelationshipErrorKind::NotFound,
                    &self.name,
                    name,
                    format!("Invalid relationship '{}'", name),
                )
            })
    }

    /// Check if a relationship name or alias is declared.
    pub fn has_relationship(&self, name: &str) -> bool {
        self.relationship_index.contains_key(name)
    }
}

/// All schemas known to an application, keyed by schema name.
///
/// Relationship targets are resolved through the registry, so a registry is
/// always complete: every relationship points at a schema it contains.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: HashMap<String, Arc<Schema>>,
    /// Registration order, for deterministic iteration
    order: Vec<String>,
}

impl SchemaRegistry {
    /// Validate and build a registry from definitions.
    #[tracing::instrument(level = "debug", skip(definitions), fields(count = definitions.len()))]
    pub fn from_definitions(definitions: Vec<SchemaDefinition>) -> Result<Self> {
        let mut built: HashMap<String, Schema> = HashMap::with_capacity(definitions.len());
        let mut order = Vec::with_capacity(definitions.len());

        for def in &definitions {
            let schema = Schema::from_definition(def)?;
            if built.contains_key(schema.name()) {
                return Err(Error::schema(
                    SchemaErrorKind::Duplicate,
                    format!("Schema '{}' is defined twice", def.name),
                ));
            }
            order.push(def.name.clone());
            built.insert(def.name.clone(), schema);
        }

        let mut relationships = Vec::with_capacity(definitions.len());
        for def in &definitions {
            let schema = &built[&def.name];
            let mut declared = Vec::with_capacity(def.relationships.len());
            for rel in &def.relationships {
                let target = built.get(&rel.schema).ok_or_else(|| {
                    Error::relationship(
                        RelationshipErrorKind::InvalidDefinition,
                        &def.name,
                        &rel.name,
                        format!("Referenced schema '{}' is not registered", rel.schema),
                    )
                })?;
                let relationship = Relationship::new(
                    &rel.name,
                    schema,
                    rel.key.clone(),
                    target,
                    rel.field.clone(),
                    rel.unique,
                )?
                .with_aliases(rel.aliases.clone());
                declared.push(relationship);
            }
            relationships.push((def.name.clone(), declared));
        }

        for (name, declared) in relationships {
            if let Some(schema) = built.get_mut(&name) {
                schema.attach_relationships(declared)?;
            }
        }

        tracing::debug!(schemas = order.len(), "Schema registry built");

        Ok(Self {
            schemas: built
                .into_iter()
                .map(|(name, schema)| (name, Arc::new(schema)))
                .collect(),
            order,
        })
    }

    /// Build a registry from a JSON array of schema definitions.
    pub fn from_json(json: &str) -> Result<Self> {
        let definitions: Vec<SchemaDefinition> = serde_json::from_str(json)?;
        Self::from_definitions(definitions)
    }

    /// Look up a schema by name.
    pub fn schema(&self, name: &str) -> Result<&Arc<Schema>> {
        self.schemas.get(name).ok_or_else(|| {
            Error::schema(
                SchemaErrorKind::NotFound,
                format!("Schema '{}' is not registered", name),
            )
        })
    }

    /// Check if a schema is registered.
    pub fn contains(&self, name: &str) -> bool {
        self.schemas.contains_key(name)
    }

    /// Schemas in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.order.iter().filter_map(|name| self.schemas.get(name))
    }

    /// Get the number of registered schemas.
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    /// Check if no schema is registered.
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }
}
