//! Rows: named column values as they travel between a driver and records.
//!
//! A driver returns one [`Row`] per result row. Rows of the same result share
//! their [`ColumnInfo`] through an `Arc`. Records are built from rows and
//! hand their values back as rows when persisted.

use crate::Result;
use crate::error::{Error, TypeError};
use crate::value::{FromValue, Value};
use std::collections::HashMap;
use std::sync::Arc;

/// Ordered column names of a result, with lookup by name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl ColumnInfo {
    /// Create column info from names in result order.
    pub fn new(names: Vec<String>) -> Self {
        let positions = names
            .iter()
            .enumerate()
            .map(|(position, name)| (name.clone(), position))
            .collect();
        Self { names, positions }
    }

    /// Get the number of columns.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Check if there are no columns.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of the named column. A name repeated in a result resolves to
    /// its last occurrence.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Get the column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Values of one result row, or of one record, keyed by column.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<ColumnInfo>,
    values: Vec<Value>,
}

impl Row {
    /// Row with its own column list.
    pub fn new(names: Vec<String>, values: Vec<Value>) -> Self {
        Self::with_columns(Arc::new(ColumnInfo::new(names)), values)
    }

    /// Row sharing the column list of its result.
    pub fn with_columns(columns: Arc<ColumnInfo>, values: Vec<Value>) -> Self {
        Self { columns, values }
    }

    /// Row from `(column, value)` pairs, in order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        let (names, values) = pairs
            .into_iter()
            .map(|(name, value)| (name.into(), value.into()))
            .unzip();
        Self::new(names, values)
    }

    /// Get the shared column info.
    pub fn column_info(&self) -> Arc<ColumnInfo> {
        Arc::clone(&self.columns)
    }

    /// Get the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Get a value by position.
    pub fn get(&self, position: usize) -> Option<&Value> {
        self.values.get(position)
    }

    /// Get a value by column name.
    pub fn get_by_name(&self, name: &str) -> Option<&Value> {
        self.values.get(self.columns.position(name)?)
    }

    /// Convert the named column. A missing column or a failed conversion is
    /// a type error naming the column.
    pub fn get_named<T: FromValue>(&self, name: &str) -> Result<T> {
        let Some(value) = self.get_by_name(name) else {
            return Err(Error::Type(TypeError {
                expected: std::any::type_name::<T>(),
                actual: format!("no column named '{}'", name),
                column: Some(name.to_string()),
            }));
        };
        T::from_value(value).map_err(|err| match err {
            Error::Type(type_error) => Error::Type(TypeError {
                column: Some(name.to_string()),
                ..type_error
            }),
            other => other,
        })
    }

    /// Iterate over column names in order.
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.names().iter().map(String::as_str)
    }

    /// `(column, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.column_names().zip(&self.values)
    }
}

/// Same columns in the same order, with equal values.
impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.columns.names() == other.columns.names() && self.values == other.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_name_and_position() {
        let row = Row::from_pairs([("id", Value::BigInt(1)), ("name", Value::from("Ann"))]);
        assert_eq!(row.len(), 2);
        assert_eq!(row.get(1), Some(&Value::Text("Ann".into())));
        assert_eq!(row.get_by_name("name"), Some(&Value::Text("Ann".into())));
        assert_eq!(row.get_named::<i64>("id").unwrap(), 1);
        assert!(row.get_by_name("missing").is_none());
    }

    #[test]
    fn test_conversion_errors_name_the_column() {
        let row = Row::from_pairs([("id", Value::from("x"))]);
        match row.get_named::<i64>("id").unwrap_err() {
            Error::Type(te) => assert_eq!(te.column.as_deref(), Some("id")),
            other => panic!("expected type error, got {other:?}"),
        }
        assert!(row.get_named::<i64>("nope").is_err());
    }

    #[test]
    fn test_equality_is_column_ordered() {
        let a = Row::from_pairs([("a", 1_i64), ("b", 2_i64)]);
        let b = Row::from_pairs([("a", 1_i64), ("b", 2_i64)]);
        let c = Row::from_pairs([("b", 2_i64), ("a", 1_i64)]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_rows_of_a_result_share_columns() {
        let columns = Arc::new(ColumnInfo::new(vec!["x".to_string()]));
        let first = Row::with_columns(Arc::clone(&columns), vec![Value::Int(1)]);
        let second = Row::with_columns(first.column_info(), vec![Value::Int(2)]);
        assert!(Arc::ptr_eq(&first.column_info(), &second.column_info()));
        assert_eq!(second.iter().next(), Some(("x", &Value::Int(2))));
        assert_eq!(columns.position("x"), Some(0));
    }
}
