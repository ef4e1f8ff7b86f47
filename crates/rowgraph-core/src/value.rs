//! Field values.
//!
//! Drivers may hand back the same key as `Int`, `BigInt` or `Text` depending
//! on the column type and the query path. Key matching therefore goes through
//! [`Value::key_string`], never through `==`.

use crate::error::{Error, TypeError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// The value of one field of one record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i32),
    BigInt(i64),
    Double(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    /// Check if this value is NULL.
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// SQL name of the variant, for error messages.
    pub const fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Bool(_) => "BOOLEAN",
            Value::Int(_) => "INTEGER",
            Value::BigInt(_) => "BIGINT",
            Value::Double(_) => "DOUBLE",
            Value::Text(_) => "TEXT",
            Value::Bytes(_) => "BLOB",
        }
    }

    /// Integers read as booleans the way SQL does: zero is false.
    pub fn as_bool(&self) -> Option<bool> {
        match *self {
            Value::Bool(b) => Some(b),
            _ => self.as_integer().map(|i| i != 0),
        }
    }

    /// Get the value as an i64. Booleans read as 0 or 1.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Value::Bool(b) => Some(i64::from(b)),
            _ => self.as_integer(),
        }
    }

    /// Get the value as an f64, widening integers.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::Double(d) => Some(d),
            _ => self.as_integer().map(|i| i as f64),
        }
    }

    /// Get the value as a string slice, if it is text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    fn as_integer(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i64::from(i)),
            Value::BigInt(i) => Some(i),
            _ => None,
        }
    }

    /// Canonical string form of a key value.
    ///
    /// `Int(1)`, `BigInt(1)` and `Text("1")` share the form `"1"`, the same
    /// way a database compares a foreign key against its target column.
    /// NULL has no form and matches nothing.
    pub fn key_string(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(u8::from(*b).to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::BigInt(i) => Some(i.to_string()),
            Value::Double(d) => Some(d.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    /// Loose key equality.
    pub fn matches(&self, other: &Value) -> bool {
        match (self.key_string(), other.key_string()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// ORDER BY comparison: NULL sorts first, numbers numerically, anything
    /// else by key form.
    pub fn sort_cmp(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            (false, false) => {}
        }
        if let (Some(a), Some(b)) = (self.as_f64(), other.as_f64()) {
            return a.total_cmp(&b);
        }
        self.key_string().cmp(&other.key_string())
    }
}

/// SQL literal form, for logs.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => f.write_str(&other.key_string().unwrap_or_default()),
        }
    }
}

macro_rules! value_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(v: $source) -> Self {
                    Value::$variant(v.into())
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i8 => Int,
    i16 => Int,
    i32 => Int,
    i64 => BigInt,
    f32 => Double,
    f64 => Double,
    String => Text,
    &str => Text,
    Vec<u8> => Bytes,
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Extraction of a typed value from a [`Value`].
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> crate::Result<Self>;
}

fn mismatch(expected: &'static str, value: &Value) -> Error {
    Error::Type(TypeError {
        expected,
        actual: value.type_name().to_string(),
        column: None,
    })
}

impl FromValue for bool {
    fn from_value(value: &Value) -> crate::Result<Self> {
        value.as_bool().ok_or_else(|| mismatch("bool", value))
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> crate::Result<Self> {
        let wide = value.as_i64().ok_or_else(|| mismatch("i32", value))?;
        i32::try_from(wide).map_err(|_| {
            Error::Type(TypeError {
                expected: "i32",
                actual: format!("{} is out of range", wide),
                column: None,
            })
        })
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> crate::Result<Self> {
        value.as_i64().ok_or_else(|| mismatch("i64", value))
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> crate::Result<Self> {
        value.as_f64().ok_or_else(|| mismatch("f64", value))
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> crate::Result<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("String", value))
    }
}

impl FromValue for Value {
    fn from_value(value: &Value) -> crate::Result<Self> {
        Ok(value.clone())
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> crate::Result<Self> {
        if value.is_null() {
            return Ok(None);
        }
        T::from_value(value).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_string_is_type_insensitive() {
        assert_eq!(Value::Int(1).key_string(), Value::BigInt(1).key_string());
        assert_eq!(Value::Text("1".into()).key_string(), Some("1".to_string()));
        assert_eq!(Value::Double(2.0).key_string(), Some("2".to_string()));
        assert_eq!(Value::Bool(true).key_string(), Some("1".to_string()));
        assert_eq!(Value::Null.key_string(), None);
    }

    #[test]
    fn test_null_never_matches() {
        assert!(!Value::Null.matches(&Value::Null));
        assert!(Value::Int(3).matches(&Value::Text("3".into())));
        assert!(!Value::Int(3).matches(&Value::Int(4)));
    }

    #[test]
    fn test_sort_cmp_orders_numbers_numerically() {
        assert_eq!(Value::Int(2).sort_cmp(&Value::BigInt(10)), Ordering::Less);
        assert_eq!(Value::Null.sort_cmp(&Value::Int(0)), Ordering::Less);
        assert_eq!(
            Value::Text("b".into()).sort_cmp(&Value::Text("a".into())),
            Ordering::Greater
        );
    }

    #[test]
    fn test_small_integers_widen() {
        assert_eq!(Value::from(7_i8), Value::Int(7));
        assert_eq!(Value::from(1.5_f32), Value::Double(1.5));
        assert_eq!(Value::from(None::<i64>), Value::Null);
    }

    #[test]
    fn test_from_value() {
        assert_eq!(Option::<i64>::from_value(&Value::Null).unwrap(), None);
        assert_eq!(Option::<i64>::from_value(&Value::Int(5)).unwrap(), Some(5));
        assert!(String::from_value(&Value::Int(5)).is_err());
        assert!(i32::from_value(&Value::BigInt(i64::MAX)).is_err());
    }

    #[test]
    fn test_display_quotes_text() {
        assert_eq!(Value::Text("O'Neil".into()).to_string(), "'O''Neil'");
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::BigInt(7).to_string(), "7");
    }
}
