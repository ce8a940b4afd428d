//! Query scopes
//!
//! A [`Scope`] is a reusable transformation of a [`Query`]: a filter, an
//! ordering, a page window. Scopes compose by chaining:
//!
//! ```rust,ignore
//! use dbkit::query::{like, order_by, paging, Query};
//!
//! let rows = Query::table("users")
//!     .scope(like("name", "ann"))
//!     .scope(order_by("-created_at,name", "id"))
//!     .scope(paging(2, 20, None))
//!     .fetch(&db)?;
//! ```

use anyhow::Result;
use rusqlite::types::Value;

use super::column::{Column, Expr};
use crate::database::core::{quote_identifier, Database, JsonRow};

/// Page size used by [`paging`] when neither a size nor a default is given
pub const DEFAULT_PAGE_SIZE: i64 = 1000;

/// A transformation applied to a query
pub trait Scope {
    fn apply(&self, query: Query) -> Query;
}

impl<F> Scope for F
where
    F: Fn(Query) -> Query,
{
    fn apply(&self, query: Query) -> Query {
        self(query)
    }
}

/// A single-table `SELECT`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    table: String,
    columns: Vec<Column>,
    filters: Vec<Expr>,
    order: Option<String>,
    limit: Option<i64>,
    offset: Option<i64>,
}

impl Query {
    /// Select every column of `table`
    pub fn table(table: impl Into<String>) -> Self {
        Query {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Restrict the selected columns
    pub fn select<'a>(mut self, columns: impl IntoIterator<Item = &'a str>) -> Self {
        self.columns = columns.into_iter().map(Column::parse).collect();
        self
    }

    /// Add a condition; conditions are joined with `AND`
    pub fn filter(mut self, condition: Expr) -> Self {
        self.filters.push(condition);
        self
    }

    /// Set the `ORDER BY` clause; an empty clause removes it
    pub fn order(mut self, clause: impl Into<String>) -> Self {
        let clause = clause.into();
        self.order = if clause.is_empty() { None } else { Some(clause) };
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Apply a scope
    pub fn scope(self, scope: impl Scope) -> Self {
        scope.apply(self)
    }

    pub fn order_clause(&self) -> Option<&str> {
        self.order.as_deref()
    }

    pub fn limit_value(&self) -> Option<i64> {
        self.limit
    }

    pub fn offset_value(&self) -> Option<i64> {
        self.offset
    }

    fn where_clause(&self) -> Expr {
        let mut clause = Expr::default();
        if self.filters.is_empty() {
            return clause;
        }
        clause.push_sql(" WHERE ");
        let wrap = self.filters.len() > 1;
        for (i, filter) in self.filters.iter().enumerate() {
            if i > 0 {
                clause.push_sql(" AND ");
            }
            if wrap {
                clause.push_sql("(");
            }
            clause.append(filter.clone());
            if wrap {
                clause.push_sql(")");
            }
        }
        clause
    }

    /// Render the full `SELECT` statement
    pub fn to_sql(&self) -> Expr {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(Column::to_select_sql)
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut sql = Expr::raw(format!(
            "SELECT {} FROM {}",
            columns,
            quote_identifier(&self.table)
        ));
        sql.append(self.where_clause());

        if let Some(order) = &self.order {
            sql.push_sql(&format!(" ORDER BY {}", order));
        }
        match (self.limit, self.offset) {
            (Some(limit), Some(offset)) => {
                sql.push_sql(&format!(" LIMIT {} OFFSET {}", limit, offset))
            }
            (Some(limit), None) => sql.push_sql(&format!(" LIMIT {}", limit)),
            // SQLite only accepts OFFSET after a LIMIT
            (None, Some(offset)) => sql.push_sql(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }
        sql
    }

    /// Render a `COUNT(*)` over the same filters, ignoring order and paging
    pub fn count_sql(&self) -> Expr {
        let mut sql = Expr::raw(format!(
            "SELECT COUNT(*) FROM {}",
            quote_identifier(&self.table)
        ));
        sql.append(self.where_clause());
        sql
    }

    /// Run the query against a database
    pub fn fetch(&self, db: &Database) -> Result<Vec<JsonRow>> {
        db.query_rows(&self.to_sql())
    }

    /// Count the rows matching the filters
    pub fn count(&self, db: &Database) -> Result<u64> {
        let expr = self.count_sql();
        db.with_conn(|conn| {
            let count: u64 = conn.query_row(
                expr.sql(),
                rusqlite::params_from_iter(expr.params().iter()),
                |row| row.get(0),
            )?;
            Ok(count)
        })
    }
}

fn like_scope(column: &str, pattern: String) -> impl Scope {
    let column = Column::parse(column);
    move |query: Query| {
        query.filter(Expr::new(
            format!("{} LIKE ?", column.to_sql()),
            vec![Value::Text(pattern.clone())],
        ))
    }
}

/// Rows whose `column` contains `q`
pub fn like(column: &str, q: &str) -> impl Scope {
    like_scope(column, format!("%{}%", q))
}

/// Rows whose `column` starts with `q`
pub fn prefix(column: &str, q: &str) -> impl Scope {
    like_scope(column, format!("{}%", q))
}

/// Rows whose `column` ends with `q`
pub fn suffix(column: &str, q: &str) -> impl Scope {
    like_scope(column, format!("%{}", q))
}

fn to_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}

/// One page of results
///
/// Pages count from 1; pages below 2 start at the first row. A size of zero
/// uses `default_size` (or [`DEFAULT_PAGE_SIZE`] when that is missing or not
/// positive). A negative size disables paging.
pub fn paging<P, S>(page: P, size: S, default_size: Option<i64>) -> impl Scope
where
    P: TryInto<i64>,
    S: TryInto<i64>,
{
    let page = to_i64(page);
    let default_size = default_size
        .filter(|d| *d > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE);
    let size = match to_i64(size) {
        0 => default_size,
        s => s,
    };

    move |query: Query| {
        if size < 0 {
            return query;
        }
        let query = if page > 1 {
            query.offset((page - 1).saturating_mul(size))
        } else {
            query
        };
        query.limit(size)
    }
}

/// Parse an order spec such as `-created_at, name` into an `ORDER BY` body
///
/// Fields are comma separated; a leading `-` sorts descending. Blank fields
/// and a lone `-` are skipped. Returns `None` when nothing usable remains.
pub fn parse_order(spec: &str) -> Option<String> {
    let fields: Vec<String> = spec
        .split(',')
        .map(str::trim)
        .filter(|field| !field.is_empty() && *field != "-")
        .filter_map(|field| {
            let (field, direction) = match field.strip_prefix('-') {
                Some(rest) => (rest, "DESC"),
                None => (field, "ASC"),
            };
            let column = Column::parse(field);
            if column.is_empty() {
                None
            } else {
                Some(format!("{} {}", column.to_sql(), direction))
            }
        })
        .collect();

    if fields.is_empty() {
        None
    } else {
        Some(fields.join(", "))
    }
}

/// Order by `spec`, or by `default` when `spec` yields nothing
pub fn order_by(spec: &str, default: &str) -> impl Scope {
    let order = parse_order(spec).or_else(|| parse_order(default));
    move |query: Query| match &order {
        Some(order) => query.order(order.clone()),
        None => query,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value as JsonValue;

    fn people() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE people (id INTEGER PRIMARY KEY, name TEXT, age INTEGER)")
            .unwrap();
        db.execute(
            "INSERT INTO people (id, name, age) VALUES
             (1, 'annabel', 30), (2, 'hannah', 25), (3, 'bob', 41),
             (4, 'joanna', 25), (5, 'ann', 52)",
        )
        .unwrap();
        db
    }

    fn names(rows: &[JsonRow]) -> Vec<&str> {
        rows.iter().filter_map(|r| r["name"].as_str()).collect()
    }

    #[test]
    fn test_plain_select() {
        let sql = Query::table("people").select(["id", "p.name as n"]).to_sql();
        assert_eq!(sql.sql(), "SELECT \"id\", \"p\".\"name\" AS \"n\" FROM \"people\"");
        assert!(sql.params().is_empty());
    }

    #[test]
    fn test_like_patterns() {
        let q = Query::table("people")
            .scope(like("name", "ann"))
            .scope(prefix("name", "an"))
            .scope(suffix("name", "na"));
        let sql = q.to_sql();
        assert_eq!(
            sql.sql(),
            "SELECT * FROM \"people\" WHERE (\"name\" LIKE ?) AND (\"name\" LIKE ?) AND (\"name\" LIKE ?)"
        );
        assert_eq!(
            sql.params(),
            &[
                Value::Text("%ann%".to_string()),
                Value::Text("an%".to_string()),
                Value::Text("%na".to_string()),
            ]
        );
    }

    #[test]
    fn test_like_fetch() {
        let db = people();
        let rows = Query::table("people")
            .scope(like("name", "ann"))
            .scope(order_by("id", ""))
            .fetch(&db)
            .unwrap();
        assert_eq!(names(&rows), vec!["annabel", "hannah", "joanna", "ann"]);

        let rows = Query::table("people")
            .scope(prefix("name", "ann"))
            .scope(order_by("-id", ""))
            .fetch(&db)
            .unwrap();
        assert_eq!(names(&rows), vec!["ann", "annabel"]);

        let rows = Query::table("people")
            .scope(suffix("name", "nna"))
            .fetch(&db)
            .unwrap();
        assert_eq!(names(&rows), vec!["joanna"]);
    }

    #[test]
    fn test_paging_window() {
        let q = Query::table("t").scope(paging(3, 10, None));
        assert_eq!(q.offset_value(), Some(20));
        assert_eq!(q.limit_value(), Some(10));

        let q = Query::table("t").scope(paging(1, 10, None));
        assert_eq!(q.offset_value(), None);
        assert_eq!(q.limit_value(), Some(10));

        let q = Query::table("t").scope(paging(0_u8, 0_u32, None));
        assert_eq!(q.offset_value(), None);
        assert_eq!(q.limit_value(), Some(DEFAULT_PAGE_SIZE));

        let q = Query::table("t").scope(paging(2_usize, 0_i32, Some(50)));
        assert_eq!(q.offset_value(), Some(50));
        assert_eq!(q.limit_value(), Some(50));

        let q = Query::table("t").scope(paging(2, 0, Some(-5)));
        assert_eq!(q.limit_value(), Some(DEFAULT_PAGE_SIZE));

        let q = Query::table("t").scope(paging(4, -1, None));
        assert_eq!(q.limit_value(), None);
        assert_eq!(q.offset_value(), None);
    }

    #[test]
    fn test_paging_fetch() {
        let db = people();
        let page = |n: i64| {
            Query::table("people")
                .scope(order_by("", "id"))
                .scope(paging(n, 2, None))
                .fetch(&db)
                .unwrap()
        };
        assert_eq!(names(&page(1)), vec!["annabel", "hannah"]);
        assert_eq!(names(&page(2)), vec!["bob", "joanna"]);
        assert_eq!(names(&page(3)), vec!["ann"]);
        assert!(page(4).is_empty());
    }

    #[test]
    fn test_parse_order() {
        assert_eq!(
            parse_order("-created_at, name").as_deref(),
            Some("\"created_at\" DESC, \"name\" ASC")
        );
        assert_eq!(parse_order(" , -, ").as_deref(), None);
        assert_eq!(parse_order("").as_deref(), None);
        assert_eq!(
            parse_order("t.sort,,-id").as_deref(),
            Some("\"t\".\"sort\" ASC, \"id\" DESC")
        );
    }

    #[test]
    fn test_order_by_default() {
        let q = Query::table("t").scope(order_by("-", "-id"));
        assert_eq!(q.order_clause(), Some("\"id\" DESC"));

        let q = Query::table("t").scope(order_by("name", "-id"));
        assert_eq!(q.order_clause(), Some("\"name\" ASC"));

        let q = Query::table("t").scope(order_by("", ""));
        assert_eq!(q.order_clause(), None);
        assert_eq!(q.to_sql().sql(), "SELECT * FROM \"t\"");
    }

    #[test]
    fn test_order_and_paging_sql() {
        let sql = Query::table("t")
            .scope(order_by("-age,name", ""))
            .scope(paging(2, 5, None))
            .to_sql();
        assert_eq!(
            sql.sql(),
            "SELECT * FROM \"t\" ORDER BY \"age\" DESC, \"name\" ASC LIMIT 5 OFFSET 5"
        );

        let sql = Query::table("t").offset(3).to_sql();
        assert_eq!(sql.sql(), "SELECT * FROM \"t\" LIMIT -1 OFFSET 3");
    }

    #[test]
    fn test_count() {
        let db = people();
        let q = Query::table("people")
            .filter(Expr::new("\"age\" = ?", vec![Value::Integer(25)]))
            .scope(paging(1, 1, None));
        assert_eq!(q.count(&db).unwrap(), 2);
        assert_eq!(q.fetch(&db).unwrap().len(), 1);

        let row = &q.fetch(&db).unwrap()[0];
        assert_eq!(row["age"], JsonValue::from(25));
    }

    #[test]
    fn test_count_is_logged_in_debug_mode() {
        let db = people().with_debug(true);
        let q = Query::table("people").scope(prefix("name", "ann"));

        let logs = crate::database::core::capture_logs(|| {
            assert_eq!(q.count(&db).unwrap(), 2);
        });
        assert!(logs.contains("SELECT COUNT(*) FROM \"people\" WHERE \"name\" LIKE 'ann%'"));
    }
}
