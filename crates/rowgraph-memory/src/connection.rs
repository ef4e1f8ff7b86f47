//! In-memory tables evaluated directly from [`SelectQuery`] values.

use rowgraph_core::{
    ColumnInfo, Condition, Connection, Error, Order, QueryError, QueryErrorKind, Result, Row,
    Rows, SelectQuery, Value,
};
use std::collections::HashMap;
use std::sync::Arc;

fn query_error(kind: QueryErrorKind, sql: Option<String>, message: impl Into<String>) -> Error {
    Error::Query(QueryError {
        kind,
        sql,
        message: message.into(),
        source: None,
    })
}

#[derive(Debug, Clone)]
struct Table {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    /// Auto-increment column position
    generated: Option<usize>,
    next_id: i64,
    rows: Vec<Vec<Value>>,
}

impl Table {
    fn column(&self, table: &str, name: &str, sql: Option<&str>) -> Result<usize> {
        self.index.get(name).copied().ok_or_else(|| {
            query_error(
                QueryErrorKind::NotFound,
                sql.map(str::to_string),
                format!("no such column: {}.{}", table, name),
            )
        })
    }

    /// Positions of the rows satisfying every condition.
    fn matching(&self, table: &str, conditions: &[Condition], sql: Option<&str>) -> Result<Vec<usize>> {
        let resolved = conditions
            .iter()
            .map(|c| Ok((self.column(table, &c.field, sql)?, c)))
            .collect::<Result<Vec<_>>>()?;
        Ok(self
            .rows
            .iter()
            .enumerate()
            .filter(|(_, row)| resolved.iter().all(|(i, c)| c.accepts(&row[*i])))
            .map(|(pos, _)| pos)
            .collect())
    }

    fn resolve_values(&self, table: &str, values: &[(String, Value)]) -> Result<Vec<(usize, Value)>> {
        values
            .iter()
            .map(|(name, value)| Ok((self.column(table, name, None)?, value.clone())))
            .collect()
    }
}

/// A connection to a set of in-memory tables.
///
/// Values compare loosely (by canonical key form), like a database comparing
/// an integer column against a string parameter. Every executed select is
/// recorded in the query log.
#[derive(Debug, Clone, Default)]
pub struct MemoryConnection {
    tables: HashMap<String, Table>,
    log: Vec<SelectQuery>,
}

impl MemoryConnection {
    /// Create a connection with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a table.
    ///
    /// When `auto_increment` names a column, inserts that leave it out get
    /// the next integer value.
    pub fn create_table(&mut self, name: &str, columns: &[&str], auto_increment: Option<&str>) {
        let columns: Vec<String> = columns.iter().map(|c| (*c).to_string()).collect();
        let index: HashMap<String, usize> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        let generated = auto_increment.and_then(|c| index.get(c).copied());
        tracing::debug!(table = name, columns = columns.len(), "Created table");
        self.tables.insert(
            name.to_string(),
            Table {
                columns,
                index,
                generated,
                next_id: 1,
                rows: Vec::new(),
            },
        );
    }

    /// Insert a row from `(column, value)` pairs.
    ///
    /// Returns the generated key when the auto-increment column is left out.
    pub fn insert_row<'a>(
        &mut self,
        table: &str,
        values: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<Option<Value>> {
        let values: Vec<(String, Value)> = values
            .into_iter()
            .map(|(name, value)| (name.to_string(), value))
            .collect();
        let generated = self.tables.get(table).and_then(|t| {
            t.generated
                .map(|i| t.columns[i].as_str())
                .filter(|column| !values.iter().any(|(name, _)| name == column))
                .map(str::to_string)
        });
        self.insert(table, &values, generated.as_deref())
    }

    /// Number of rows in a table, or `None` for an unknown table.
    pub fn row_count(&self, table: &str) -> Option<usize> {
        self.tables.get(table).map(|t| t.rows.len())
    }

    /// Selects executed so far, oldest first.
    pub fn query_log(&self) -> &[SelectQuery] {
        &self.log
    }

    /// Forget every logged select.
    pub fn clear_query_log(&mut self) {
        self.log.clear();
    }

    fn table(&self, name: &str, sql: Option<&str>) -> Result<&Table> {
        self.tables.get(name).ok_or_else(|| {
            query_error(
                QueryErrorKind::NotFound,
                sql.map(str::to_string),
                format!("no such table: {}", name),
            )
        })
    }

    fn table_mut(&mut self, name: &str) -> Result<&mut Table> {
        self.tables
            .get_mut(name)
            .ok_or_else(|| query_error(QueryErrorKind::NotFound, None, format!("no such table: {}", name)))
    }
}

impl Connection for MemoryConnection {
    #[tracing::instrument(level = "debug", skip(self, query), fields(table = %query.table))]
    fn select(&mut self, query: &SelectQuery) -> Result<Rows<'_>> {
        let sql = query.to_sql();
        tracing::trace!(sql = %sql, params = query.params().len(), "Executing select");

        let table = self.table(&query.table, Some(&sql))?;
        let projection: Vec<usize> = if query.fields.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            query
                .fields
                .iter()
                .map(|f| table.column(&query.table, f, Some(&sql)))
                .collect::<Result<_>>()?
        };
        let ordering = query
            .order_by
            .iter()
            .map(|(f, order)| Ok((table.column(&query.table, f, Some(&sql))?, *order)))
            .collect::<Result<Vec<_>>>()?;

        let mut positions = table.matching(&query.table, &query.conditions, Some(&sql))?;
        positions.sort_by(|&a, &b| {
            ordering
                .iter()
                .map(|&(i, order)| {
                    let cmp = table.rows[a][i].sort_cmp(&table.rows[b][i]);
                    match order {
                        Order::Asc => cmp,
                        Order::Desc => cmp.reverse(),
                    }
                })
                .find(|cmp| cmp.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        if let Some(limit) = query.limit {
            positions.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        }

        let columns = Arc::new(ColumnInfo::new(
            projection.iter().map(|&i| table.columns[i].clone()).collect(),
        ));
        let rows: Vec<Row> = positions
            .iter()
            .map(|&pos| {
                let values = projection
                    .iter()
                    .map(|&i| table.rows[pos][i].clone())
                    .collect();
                Row::with_columns(Arc::clone(&columns), values)
            })
            .collect();

        tracing::debug!(rows = rows.len(), "Select complete");
        self.log.push(query.clone());
        Ok(Box::new(rows.into_iter().map(Ok)))
    }

    #[tracing::instrument(level = "debug", skip(self, values))]
    fn insert(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        generated_key: Option<&str>,
    ) -> Result<Option<Value>> {
        let name = table;
        let table = self.table_mut(name)?;
        let resolved = table.resolve_values(name, values)?;

        let mut row = vec![Value::Null; table.columns.len()];
        for (i, value) in resolved {
            row[i] = value;
        }

        let mut generated = None;
        if let Some(column) = generated_key {
            let i = table.column(name, column, None)?;
            if table.generated != Some(i) {
                return Err(query_error(
                    QueryErrorKind::Database,
                    None,
                    format!("column {}.{} has no generated values", name, column),
                ));
            }
            if row[i].is_null() {
                row[i] = Value::BigInt(table.next_id);
                generated = Some(row[i].clone());
            }
        }

        if let Some(i) = table.generated {
            if row[i].is_null() {
                return Err(query_error(
                    QueryErrorKind::Constraint,
                    None,
                    format!("NOT NULL constraint failed: {}.{}", name, table.columns[i]),
                ));
            }
            if table.rows.iter().any(|r| r[i].matches(&row[i])) {
                return Err(query_error(
                    QueryErrorKind::Constraint,
                    None,
                    format!("UNIQUE constraint failed: {}.{}", name, table.columns[i]),
                ));
            }
            if let Some(id) = row[i].as_i64() {
                table.next_id = table.next_id.max(id + 1);
            }
        }

        table.rows.push(row);
        Ok(generated)
    }

    #[tracing::instrument(level = "debug", skip(self, values, conditions))]
    fn update(
        &mut self,
        table: &str,
        values: &[(String, Value)],
        conditions: &[Condition],
    ) -> Result<u64> {
        let name = table;
        let table = self.table_mut(name)?;
        let resolved = table.resolve_values(name, values)?;
        let positions = table.matching(name, conditions, None)?;
        for &pos in &positions {
            for (i, value) in &resolved {
                table.rows[pos][*i] = value.clone();
            }
        }
        tracing::debug!(affected = positions.len(), "Update complete");
        Ok(positions.len() as u64)
    }

    #[tracing::instrument(level = "debug", skip(self, conditions))]
    fn delete(&mut self, table: &str, conditions: &[Condition]) -> Result<u64> {
        let name = table;
        let table = self.table_mut(name)?;
        let positions = table.matching(name, conditions, None)?;
        let mut pos = 0;
        table.rows.retain(|_| {
            let keep = !positions.contains(&pos);
            pos += 1;
            keep
        });
        tracing::debug!(affected = positions.len(), "Delete complete");
        Ok(positions.len() as u64)
    }
}
