//! Error types for rowgraph operations.

use std::fmt;

/// The primary error type for all rowgraph operations.
#[derive(Debug)]
pub enum Error {
    /// A record has no stable identity (never persisted, incomplete key)
    Identity(IdentityError),
    /// Relationship configuration errors (unknown name, reverse, composite keys)
    Relationship(RelationshipError),
    /// A relationship was used with the wrong number of records
    Cardinality(CardinalityError),
    /// Data integrity and consistency violations
    Integrity(IntegrityError),
    /// A relationship was read before it was loaded
    NotLoaded(NotLoadedError),
    /// Record lifecycle violations (e.g. touching a deleted record)
    State(StateError),
    /// Query execution errors reported by a connection
    Query(QueryError),
    /// A value could not be converted to the requested type
    Type(TypeError),
    /// Schema lookup and definition errors
    Schema(SchemaError),
    /// Schema configuration could not be read
    Config(ConfigError),
}

#[derive(Debug)]
pub struct IdentityError {
    pub kind: IdentityErrorKind,
    pub schema: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentityErrorKind {
    /// The record is still new and has no snapshot primary key
    NotPersisted,
    /// A key value required to identify or reference a row is null or missing
    IncompleteKey,
}

#[derive(Debug)]
pub struct RelationshipError {
    pub kind: RelationshipErrorKind,
    pub schema: String,
    pub relationship: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationshipErrorKind {
    /// No relationship with the given name is declared
    NotFound,
    /// The referenced schema declares no reverse relationship
    NoReverse,
    /// The referenced schema declares more than one reverse relationship
    AmbiguousReverse,
    /// The operation only supports single-field foreign keys
    CompositeKey,
    /// The relationship definition itself is invalid
    InvalidDefinition,
}

#[derive(Debug)]
pub struct CardinalityError {
    pub kind: CardinalityErrorKind,
    pub relationship: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardinalityErrorKind {
    /// More than one record assigned to a unique relationship
    TooManyRecords,
    /// Operation requires a unique relationship
    ExpectedUnique,
    /// Operation requires a multi-valued relationship
    ExpectedMultiple,
}

#[derive(Debug)]
pub struct IntegrityError {
    pub kind: IntegrityErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityErrorKind {
    /// Two distinct record instances claim the same identity
    DuplicateIdentity,
    /// A record belongs to a different schema than expected
    SchemaMismatch,
    /// Access to a field the schema does not declare
    UnknownField,
    /// A set of database values does not match the schema fields
    InvalidValues,
    /// A record was wired to a record it does not reference
    MismatchedReference,
    /// The row backing a record no longer exists in the database
    MissingRecord,
}

#[derive(Debug)]
pub struct NotLoadedError {
    pub schema: String,
    pub relationship: String,
}

#[derive(Debug)]
pub struct StateError {
    pub schema: String,
    pub message: String,
}

#[derive(Debug)]
pub struct QueryError {
    pub kind: QueryErrorKind,
    pub sql: Option<String>,
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorKind {
    /// Unknown table or column
    NotFound,
    /// Constraint violation (unique, primary key)
    Constraint,
    /// Malformed query
    Syntax,
    /// Any other driver failure
    Database,
}

#[derive(Debug)]
pub struct TypeError {
    pub expected: &'static str,
    pub actual: String,
    pub column: Option<String>,
}

#[derive(Debug)]
pub struct SchemaError {
    pub kind: SchemaErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaErrorKind {
    /// No schema registered under the name
    NotFound,
    /// Two schemas registered under the same name
    Duplicate,
    /// A definition failed validation
    Invalid,
}

#[derive(Debug)]
pub struct ConfigError {
    pub message: String,
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Build an identity error.
    pub fn identity(
        kind: IdentityErrorKind,
        schema: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Identity(IdentityError {
            kind,
            schema: schema.into(),
            message: message.into(),
        })
    }

    /// Build a relationship error.
    pub fn relationship(
        kind: RelationshipErrorKind,
        schema: impl Into<String>,
        relationship: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Relationship(RelationshipError {
            kind,
            schema: schema.into(),
            relationship: relationship.into(),
            message: message.into(),
        })
    }

    /// Build a cardinality error.
    pub fn cardinality(
        kind: CardinalityErrorKind,
        relationship: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::Cardinality(CardinalityError {
            kind,
            relationship: relationship.into(),
            message: message.into(),
        })
    }

    /// Build an integrity error.
    pub fn integrity(kind: IntegrityErrorKind, message: impl Into<String>) -> Self {
        Error::Integrity(IntegrityError {
            kind,
            message: message.into(),
        })
    }

    /// Build the error for reading a relationship that was never filled.
    pub fn not_loaded(schema: impl Into<String>, relationship: impl Into<String>) -> Self {
        Error::NotLoaded(NotLoadedError {
            schema: schema.into(),
            relationship: relationship.into(),
        })
    }

    /// Build a record state error.
    pub fn state(schema: impl Into<String>, message: impl Into<String>) -> Self {
        Error::State(StateError {
            schema: schema.into(),
            message: message.into(),
        })
    }

    /// Build a schema error.
    pub fn schema(kind: SchemaErrorKind, message: impl Into<String>) -> Self {
        Error::Schema(SchemaError {
            kind,
            message: message.into(),
        })
    }

    /// Was a relationship read before it was filled?
    pub fn is_not_loaded(&self) -> bool {
        matches!(self, Error::NotLoaded(_))
    }

    /// Is this caused by schema or relationship configuration rather than data?
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Error::Relationship(_) | Error::Schema(_) | Error::Config(_)
        )
    }

    /// Is this a data consistency violation?
    pub fn is_integrity_error(&self) -> bool {
        matches!(self, Error::Integrity(_))
    }

    /// Was a relationship used with the wrong cardinality?
    pub fn is_cardinality_error(&self) -> bool {
        matches!(self, Error::Cardinality(_))
    }

    /// Does this concern a record without a usable identity?
    pub fn is_identity_error(&self) -> bool {
        matches!(self, Error::Identity(_))
    }

    /// The relationship error kind, if this is a relationship error.
    pub fn relationship_kind(&self) -> Option<RelationshipErrorKind> {
        match self {
            Error::Relationship(e) => Some(e.kind),
            _ => None,
        }
    }

    /// The integrity error kind, if this is an integrity error.
    pub fn integrity_kind(&self) -> Option<IntegrityErrorKind> {
        match self {
            Error::Integrity(e) => Some(e.kind),
            _ => None,
        }
    }

    /// SQL of the failed query, when the driver reported it.
    pub fn sql(&self) -> Option<&str> {
        match self {
            Error::Query(q) => q.sql.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Identity(e) => write!(f, "Identity error: {}", e),
            Error::Relationship(e) => write!(f, "Relationship error: {}", e),
            Error::Cardinality(e) => write!(f, "Cardinality error: {}", e),
            Error::Integrity(e) => write!(f, "Integrity error: {}", e.message),
            Error::NotLoaded(e) => write!(f, "{}", e),
            Error::State(e) => write!(f, "State error: {}", e),
            Error::Query(e) => write!(f, "Query error: {}", e),
            Error::Type(e) => write!(f, "Type error: {}", e),
            Error::Schema(e) => write!(f, "Schema error: {}", e.message),
            Error::Config(e) => write!(f, "Configuration error: {}", e.message),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Query(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            Error::Config(e) => e
                .source
                .as_deref()
                .map(|err| err as &(dyn std::error::Error + 'static)),
            _ => None,
        }
    }
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (schema '{}')", self.message, self.schema)
    }
}

impl fmt::Display for RelationshipError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (relationship '{}' on schema '{}')",
            self.message, self.relationship, self.schema
        )
    }
}

impl fmt::Display for CardinalityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (relationship '{}')", self.message, self.relationship)
    }
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for NotLoadedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Relationship '{}' on schema '{}' has not been loaded",
            self.relationship, self.schema
        )
    }
}

impl fmt::Display for StateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (schema '{}')", self.message, self.schema)
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(sql) = &self.sql {
            write!(f, "{} [{}]", self.message, sql)
        } else {
            write!(f, "{}", self.message)
        }
    }
}

impl fmt::Display for TypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(col) = &self.column {
            write!(
                f,
                "expected {} for column '{}', found {}",
                self.expected, col, self.actual
            )
        } else {
            write!(f, "expected {}, found {}", self.expected, self.actual)
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl From<QueryError> for Error {
    fn from(err: QueryError) -> Self {
        Error::Query(err)
    }
}

impl From<TypeError> for Error {
    fn from(err: TypeError) -> Self {
        Error::Type(err)
    }
}

impl From<SchemaError> for Error {
    fn from(err: SchemaError) -> Self {
        Error::Schema(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        Error::Config(err)
    }
}

impl From<IntegrityError> for Error {
    fn from(err: IntegrityError) -> Self {
        Error::Integrity(err)
    }
}

/// Malformed JSON schema definitions.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(ConfigError {
            message: format!("Invalid schema definitions: {}", err),
            source: Some(Box::new(err)),
        })
    }
}

/// Result type alias for rowgraph operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_loaded_is_distinct_from_configuration_errors() {
        let err = Error::not_loaded("person", "spouse");
        assert!(err.is_not_loaded());
        assert!(!err.is_configuration_error());
        assert_eq!(
            err.to_string(),
            "Relationship 'spouse' on schema 'person' has not been loaded"
        );

        let err = Error::relationship(
            RelationshipErrorKind::NotFound,
            "person",
            "nope",
            "Invalid relationship",
        );
        assert!(err.is_configuration_error());
        assert_eq!(err.relationship_kind(), Some(RelationshipErrorKind::NotFound));
    }

    #[test]
    fn query_error_exposes_sql() {
        let err = Error::Query(QueryError {
            kind: QueryErrorKind::NotFound,
            sql: Some("SELECT 1".to_string()),
            message: "no such table".to_string(),
            source: None,
        });
        assert_eq!(err.sql(), Some("SELECT 1"));
        assert_eq!(err.to_string(), "Query error: no such table [SELECT 1]");
    }

    #[test]
    fn integrity_kind_helper() {
        let err = Error::integrity(IntegrityErrorKind::DuplicateIdentity, "duplicate");
        assert!(err.is_integrity_error());
        assert_eq!(
            err.integrity_kind(),
            Some(IntegrityErrorKind::DuplicateIdentity)
        );
        assert_eq!(err.relationship_kind(), None);
    }
}
