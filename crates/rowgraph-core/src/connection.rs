//! Database connection contract.
//!
//! The record layer never writes SQL itself. It hands a driver a
//! [`SelectQuery`] (or a table plus values and [`Condition`]s for writes) and
//! reads back rows. Drivers render the query with [`SelectQuery::to_sql`] or
//! evaluate it directly.

use crate::Result;
use crate::row::Row;
use crate::value::Value;
use std::fmt;

/// Rows produced by a select: a finite, single-pass iterator.
///
/// Each item is a `Result` so drivers can stream rows and report a failure
/// part way through.
pub type Rows<'a> = Box<dyn Iterator<Item = Result<Row>> + 'a>;

/// Quote a SQL identifier using ANSI double-quoting.
///
/// Embedded double-quotes are escaped by doubling them.
///
/// ```
/// use rowgraph_core::quote_ident;
///
/// assert_eq!(quote_ident("person"), "\"person\"");
/// assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
/// ```
#[inline]
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// The value test applied to one field.
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// `field = value`, or `field IS NULL` when the value is NULL
    Eq(Value),
    /// `field IN (values...)`
    In(Vec<Value>),
}

/// A single-field condition. Conditions in a list are AND-ed together.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub filter: Filter,
}

impl Condition {
    /// `field = value` (`IS NULL` for a NULL value).
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            filter: Filter::Eq(value.into()),
        }
    }

    /// `field IN (values...)`.
    pub fn is_in(field: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            field: field.into(),
            filter: Filter::In(values),
        }
    }

    /// Evaluate this condition against a column value.
    ///
    /// Equality is loose: values compare by their canonical key form, so an
    /// integer key matches its textual spelling. NULL only satisfies
    /// `IS NULL`.
    pub fn accepts(&self, value: &Value) -> bool {
        match &self.filter {
            Filter::Eq(Value::Null) => value.is_null(),
            Filter::Eq(expected) => expected.matches(value),
            Filter::In(values) => values.iter().any(|v| v.matches(value)),
        }
    }

    fn render(&self, sql: &mut String, params: &mut Vec<Value>) {
        let field = quote_ident(&self.field);
        match &self.filter {
            Filter::Eq(Value::Null) => {
                sql.push_str(&format!("{} IS NULL", field));
            }
            Filter::Eq(value) => {
                params.push(value.clone());
                sql.push_str(&format!("{} = ${}", field, params.len()));
            }
            Filter::In(values) if values.is_empty() => sql.push_str("1 = 0"),
            Filter::In(values) => {
                let mut placeholders = Vec::with_capacity(values.len());
                for value in values {
                    params.push(value.clone());
                    placeholders.push(format!("${}", params.len()));
                }
                sql.push_str(&format!("{} IN ({})", field, placeholders.join(", ")));
            }
        }
    }
}

/// Sort direction for ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Order {
    #[default]
    Asc,
    Desc,
}

impl Order {
    /// The SQL keyword for this direction.
    pub const fn as_sql(self) -> &'static str {
        match self {
            Order::Asc => "ASC",
            Order::Desc => "DESC",
        }
    }
}

/// A single-table select.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectQuery {
    pub fields: Vec<String>,
    pub table: String,
    pub conditions: Vec<Condition>,
    pub order_by: Vec<(String, Order)>,
    pub limit: Option<u64>,
}

impl SelectQuery {
    /// Select `fields` from `table` with no conditions.
    pub fn new(table: impl Into<String>, fields: Vec<String>) -> Self {
        Self {
            fields,
            table: table.into(),
            ..Self::default()
        }
    }

    /// Add a WHERE condition.
    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add an ORDER BY clause.
    pub fn order_by(mut self, field: impl Into<String>, order: Order) -> Self {
        self.order_by.push((field.into(), order));
        self
    }

    /// Set LIMIT.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render to parameterized SQL (`$1`, `$2`, ...) and its parameters.
    pub fn build(&self) -> (String, Vec<Value>) {
        let mut params = Vec::new();
        let columns = if self.fields.is_empty() {
            "*".to_string()
        } else {
            self.fields
                .iter()
                .map(|f| quote_ident(f))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", columns, quote_ident(&self.table));

        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            for (i, condition) in self.conditions.iter().enumerate() {
                if i > 0 {
                    sql.push_str(" AND ");
                }
                condition.render(&mut sql, &mut params);
            }
        }

        if !self.order_by.is_empty() {
            let clauses: Vec<String> = self
                .order_by
                .iter()
                .map(|(field, order)| format!("{} {}", quote_ident(field), order.as_sql()))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&clauses.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        (sql, params)
    }

    /// The rendered SQL text.
    pub fn to_sql(&self) -> String {
        self.build().0
    }

    /// The bound parameters, in placeholder order.
    pub fn params(&self) -> Vec<Value> {
        self.build().1
    }
}

impl fmt::Display for SelectQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// A database connection as seen by the record layer.
///
/// All calls are blocking. Drivers report failures as [`crate::Error::Query`].
pub trait Connection {
    /// Execute a select and return its rows.
    fn select(&mut self, query: &SelectQuery) -> Result<Rows<'_>>;

    /// Insert a row.
    ///
    /// When `generated_key` names a column the caller left out, the driver
    /// generates it and returns the new value.
    fn insert(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        generated_key: Option<&str>,
    ) -> Result<Option<Value>>;

    /// Update matching rows and return the number of rows affected.
    fn update(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<u64>;

    /// Delete matching rows and return the number of rows affected.
    fn delete(&mut self, table: &str, conditions: &[Condition]) -> Result<u64>;
}

impl<C: Connection + ?Sized> Connection for &mut C {
    fn select(&mut self, query: &SelectQuery) -> Result<Rows<'_>> {
        (**self).select(query)
    }

    fn insert(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        generated_key: Option<&str>,
    ) -> Result<Option<Value>> {
        (**self).insert(table, values, generated_key)
    }

    fn update(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<u64> {
        (**self).update(table, values, conditions)
    }

    fn delete(&mut self, table: &str, conditions: &[Condition]) -> Result<u64> {
        (**self).delete(table, conditions)
    }
}
