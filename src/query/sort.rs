//! Ordered batch updates
//!
//! Rewrites the sort position of many rows with a single statement:
//!
//! ```sql
//! UPDATE "items" SET "sort" = (CASE "id" WHEN ? THEN ? WHEN ? THEN ? ELSE "sort" END)
//! WHERE "id" IN (?, ?)
//! ```
//!
//! Keys are emitted in ascending order so the generated SQL for a given
//! mapping is always the same text.

use std::collections::BTreeMap;

use anyhow::Result;
use rusqlite::types::Value;
use tracing::debug;

use super::column::{Column, Expr};
use crate::database::core::{quote_identifier, Database};

/// Sort column used when none is given
pub const DEFAULT_SORT_COLUMN: &str = "sort";

/// Key column used when none is given and the table has no single primary key
pub const FALLBACK_KEY_COLUMN: &str = "id";

/// Build the row filter and the new-value expression for a sort mapping
///
/// Returns `(filter, value)`: `filter` selects the rows whose key is in the
/// mapping, `value` is a `CASE` over the key column yielding each row's new
/// position. The `ELSE` branch keeps the current sort value; the filter makes
/// it unreachable but it keeps the expression total.
///
/// An empty mapping yields `1 = 0` and the bare sort column, so executing it
/// touches nothing.
pub fn sort_prep<K, S, I>(values: I, key: &Column, sort: &Column) -> (Expr, Expr)
where
    I: IntoIterator<Item = (K, S)>,
    K: Ord + Into<Value>,
    S: Into<Value>,
{
    let values: BTreeMap<K, S> = values.into_iter().collect();
    if values.is_empty() {
        return (Expr::raw("1 = 0"), Expr::raw(sort.to_sql()));
    }

    let key_sql = key.to_sql();
    let mut keys: Vec<Value> = Vec::with_capacity(values.len());
    let mut value = Expr::raw(format!("(CASE {}", key_sql));

    for (k, s) in values {
        let k: Value = k.into();
        keys.push(k.clone());
        value.push(" WHEN ? THEN ?", [k, s.into()]);
    }
    value.push_sql(&format!(" ELSE {} END)", sort.to_sql()));

    let placeholders = vec!["?"; keys.len()].join(", ");
    let filter = Expr::new(format!("{} IN ({})", key_sql, placeholders), keys);

    (filter, value)
}

/// Target of an ordered batch update
#[derive(Debug, Clone, Default)]
pub struct SortOptions {
    /// Table holding the rows
    pub table: String,
    /// Column identifying the rows; empty means the primary key
    pub key_column: String,
    /// Column holding the position; empty means `sort`
    pub sort_column: String,
}

impl SortOptions {
    pub fn new(table: impl Into<String>) -> Self {
        SortOptions {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn key_column(mut self, column: impl Into<String>) -> Self {
        self.key_column = column.into();
        self
    }

    pub fn sort_column(mut self, column: impl Into<String>) -> Self {
        self.sort_column = column.into();
        self
    }

    /// Resolve the key and sort columns, filling in the defaults
    pub fn columns(&self, db: &Database) -> Result<(Column, Column)> {
        let mut key = Column::parse(&self.key_column);
        if key.is_empty() {
            key.name = db
                .primary_key(&self.table)?
                .unwrap_or_else(|| FALLBACK_KEY_COLUMN.to_string());
        }

        let mut sort = Column::parse(&self.sort_column);
        if sort.is_empty() {
            sort.name = DEFAULT_SORT_COLUMN.to_string();
        }

        Ok((key, sort))
    }

    /// The complete `UPDATE` statement for a mapping
    pub fn statement<K, S, I>(&self, db: &Database, values: I) -> Result<Expr>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Ord + Into<Value>,
        S: Into<Value>,
    {
        let (key, sort) = self.columns(db)?;
        let (filter, value) = sort_prep(values, &key, &sort);

        let mut stmt = Expr::raw(format!(
            "UPDATE {} SET {} = ",
            quote_identifier(&self.table),
            sort.name_sql()
        ));
        stmt.append(value);
        stmt.push_sql(" WHERE ");
        stmt.append(filter);
        Ok(stmt)
    }

    /// Apply a mapping, returning the number of rows updated
    pub fn exec<K, S, I>(&self, db: &Database, values: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, S)>,
        K: Ord + Into<Value>,
        S: Into<Value>,
    {
        let stmt = self.statement(db, values)?;
        let rows = db.execute_expr(&stmt)?;
        debug!(table = %self.table, rows, "sort positions updated");
        Ok(rows)
    }
}

/// Apply a sort mapping to `table` using explicit key and sort columns
///
/// Empty column names fall back to the primary key and `sort`. Database
/// errors are returned as-is; nothing is retried.
pub fn sort_exec<K, S, I>(
    db: &Database,
    table: &str,
    values: I,
    key_column: &str,
    sort_column: &str,
) -> Result<usize>
where
    I: IntoIterator<Item = (K, S)>,
    K: Ord + Into<Value>,
    S: Into<Value>,
{
    SortOptions::new(table)
        .key_column(key_column)
        .sort_column(sort_column)
        .exec(db, values)
}

/// Apply a sort mapping to `table` keyed by its primary key
pub fn sort<K, S, I>(db: &Database, table: &str, values: I) -> Result<usize>
where
    I: IntoIterator<Item = (K, S)>,
    K: Ord + Into<Value>,
    S: Into<Value>,
{
    sort_exec(db, table, values, "", "")
}
