//! Database connection management
//!
//! This module provides the connection wrapper handed out by the driver
//! registry and cached per name by [`crate::Databases`].

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use anyhow::{anyhow, Result};
use rusqlite::trace::{TraceEvent, TraceEventCodes};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection};
use serde_json::{Map as JsonMap, Value as JsonValue};
use tracing::{info, warn};

use crate::query::Expr;

/// DSN meaning "private in-memory database"
pub const MEMORY_DSN: &str = ":memory:";

/// A row returned by [`Database::query_rows`], column name to JSON value
pub type JsonRow = JsonMap<String, JsonValue>;

/// Thread-shareable SQLite connection
///
/// `Database` wraps a single `rusqlite::Connection` behind a mutex so that
/// one handle can be shared (usually as `Arc<Database>`) between threads.
/// In debug mode SQLite reports every statement it runs on the connection,
/// including those issued through [`Database::with_conn`], and each one is
/// logged at INFO on the `dbkit::sql` target with its bound values expanded.
pub struct Database {
    conn: Mutex<Connection>,
    dsn: String,
    debug: bool,
}

impl Database {
    /// Open a database from a DSN
    ///
    /// An empty DSN or `:memory:` creates an in-memory database, anything else
    /// is handed to SQLite as a path or `file:` URI.
    pub fn open(dsn: &str) -> Result<Self> {
        let conn = if dsn.is_empty() || dsn == MEMORY_DSN {
            Connection::open_in_memory()
                .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?
        } else {
            Connection::open(dsn)
                .map_err(|e| anyhow!("Failed to open database at '{}': {}", dsn, e))?
        };

        let db = Database {
            conn: Mutex::new(conn),
            dsn: if dsn.is_empty() {
                MEMORY_DSN.to_string()
            } else {
                dsn.to_string()
            },
            debug: false,
        };
        db.configure()?;
        Ok(db)
    }

    /// Create an in-memory database
    pub fn open_in_memory() -> Result<Self> {
        Self::open(MEMORY_DSN)
    }

    /// Enable or disable statement logging
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        let trace = if debug {
            Some(log_statement as fn(TraceEvent<'_>))
        } else {
            None
        };
        self.lock()
            .trace_v2(TraceEventCodes::SQLITE_TRACE_STMT, trace);
        self
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    /// Configure the connection
    fn configure(&self) -> Result<()> {
        let conn = self.lock();

        // In-memory databases answer "memory" here, which is fine
        match conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get::<_, String>(0)) {
            Ok(mode) if !mode.eq_ignore_ascii_case("wal") && self.dsn != MEMORY_DSN => {
                warn!(dsn = %self.dsn, mode = %mode, "WAL journal mode not available");
            }
            Ok(_) => {}
            Err(e) => return Err(anyhow!("Failed to set journal mode: {}", e)),
        }

        conn.execute_batch(
            "PRAGMA synchronous=NORMAL;
             PRAGMA temp_store=MEMORY;
             PRAGMA foreign_keys=ON;",
        )
        .map_err(|e| anyhow!("Failed to configure database: {}", e))?;

        conn.busy_timeout(Duration::from_secs(5))
            .map_err(|e| anyhow!("Failed to set busy timeout: {}", e))?;

        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a closure with exclusive access to the underlying connection
    pub fn with_conn<R>(&self, f: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self.lock();
        f(&conn)
    }

    /// Execute a SQL statement
    pub fn execute(&self, sql: &str) -> Result<usize> {
        self.lock()
            .execute(sql, [])
            .map_err(|e| anyhow!("Failed to execute SQL: {}", e))
    }

    /// Execute a SQL statement with positional parameters
    pub fn execute_with_params(&self, sql: &str, params: &[Value]) -> Result<usize> {
        // The rusqlite error is kept as the error itself so callers can
        // downcast it.
        Ok(self.lock().execute(sql, params_from_iter(params.iter()))?)
    }

    /// Execute a parameterised expression as a statement
    pub fn execute_expr(&self, expr: &Expr) -> Result<usize> {
        self.execute_with_params(expr.sql(), expr.params())
    }

    /// Run a query and return every row as a JSON object
    pub fn query_rows(&self, expr: &Expr) -> Result<Vec<JsonRow>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(expr.sql())
            .map_err(|e| anyhow!("Failed to prepare query `{}`: {}", expr.sql(), e))?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt
            .query_map(params_from_iter(expr.params().iter()), |row| {
                let mut out = JsonMap::with_capacity(names.len());
                for (i, name) in names.iter().enumerate() {
                    let value: Value = row.get(i)?;
                    out.insert(name.clone(), value_to_json(value));
                }
                Ok(out)
            })
            .map_err(|e| anyhow!("Failed to run query: {}", e))?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(|e| anyhow!("Failed to read query rows: {}", e))
    }

    /// Check if a table exists in the database
    pub fn table_exists(&self, table_name: &str) -> Result<bool> {
        let count: i32 = self
            .lock()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
                [table_name],
                |row| row.get(0),
            )
            .map_err(|e| anyhow!("Failed to check table existence: {}", e))?;
        Ok(count > 0)
    }

    /// Get the row count for a table
    pub fn table_count(&self, table_name: &str) -> Result<u64> {
        let query = format!("SELECT COUNT(*) FROM {}", quote_identifier(table_name));
        let count: u64 = self
            .lock()
            .query_row(&query, [], |row| row.get(0))
            .map_err(|e| anyhow!("Failed to get table count: {}", e))?;
        Ok(count)
    }

    /// Name of the table's primary key column
    ///
    /// Returns `None` when the table has no declared primary key or a
    /// composite one.
    pub fn primary_key(&self, table_name: &str) -> Result<Option<String>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT name, pk FROM pragma_table_info(?1)")
            .map_err(|e| anyhow!("Failed to read table info: {}", e))?;
        let columns = stmt
            .query_map([table_name], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
            })
            .map_err(|e| anyhow!("Failed to read table info for '{}': {}", table_name, e))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut keys = columns.into_iter().filter(|(_, pk)| *pk > 0);
        match (keys.next(), keys.next()) {
            (Some((name, _)), None) => Ok(Some(name)),
            _ => Ok(None),
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("dsn", &self.dsn)
            .field("debug", &self.debug)
            .finish()
    }
}

fn log_statement(event: TraceEvent<'_>) {
    if let TraceEvent::Stmt(stmt, sql) = event {
        let sql = stmt.expanded_sql().unwrap_or_else(|| sql.to_string());
        info!(target: "dbkit::sql", "{}", sql);
    }
}

/// Quote an identifier for SQLite, doubling embedded quotes
pub fn quote_identifier(value: &str) -> String {
    let escaped = value.replace('"', "\"\"");
    format!("\"{escaped}\"")
}

fn value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Integer(i) => JsonValue::from(i),
        Value::Real(f) => JsonValue::from(f),
        Value::Text(s) => JsonValue::String(s),
        Value::Blob(b) => JsonValue::from(b),
    }
}

/// Run `f` and return what it logged at INFO, without ANSI colours
#[cfg(test)]
pub(crate) fn capture_logs(f: impl FnOnce()) -> String {
    use std::io;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Buffer(Arc<Mutex<Vec<u8>>>);

    impl io::Write for Buffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    let buffer = Buffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    tracing::subscriber::with_default(subscriber, f);

    let bytes = buffer.0.lock().unwrap_or_else(PoisonError::into_inner);
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
        assert_eq!(db.unwrap().dsn(), MEMORY_DSN);
    }

    #[test]
    fn test_empty_dsn_is_memory() {
        let db = Database::open("").unwrap();
        assert_eq!(db.dsn(), MEMORY_DSN);
    }

    #[test]
    fn test_open_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        let db = Database::open(path.to_str().unwrap()).unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();
        drop(db);

        let db = Database::open(path.to_str().unwrap()).unwrap();
        assert!(db.table_exists("t").unwrap());
    }

    #[test]
    fn test_execute_and_count() {
        let db = Database::open_in_memory().unwrap().with_debug(true);
        db.execute("CREATE TABLE test_table (id INTEGER PRIMARY KEY)")
            .unwrap();
        db.execute("INSERT INTO test_table (id) VALUES (1), (2), (3)")
            .unwrap();

        assert!(db.table_exists("test_table").unwrap());
        assert!(!db.table_exists("nonexistent_table").unwrap());
        assert_eq!(db.table_count("test_table").unwrap(), 3);
    }

    #[test]
    fn test_execute_with_params() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")
            .unwrap();
        let n = db
            .execute_with_params(
                "INSERT INTO kv (k, v) VALUES (?, ?), (?, ?)",
                &[
                    Value::from("a".to_string()),
                    Value::from(1_i64),
                    Value::from("b".to_string()),
                    Value::from(2_i64),
                ],
            )
            .unwrap();
        assert_eq!(n, 2);
    }

    #[test]
    fn test_primary_key() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE a (code TEXT PRIMARY KEY, sort INTEGER)")
            .unwrap();
        db.execute("CREATE TABLE b (x INTEGER, y INTEGER, PRIMARY KEY (x, y))")
            .unwrap();
        db.execute("CREATE TABLE c (x INTEGER)").unwrap();

        assert_eq!(db.primary_key("a").unwrap(), Some("code".to_string()));
        assert_eq!(db.primary_key("b").unwrap(), None);
        assert_eq!(db.primary_key("c").unwrap(), None);
    }

    #[test]
    fn test_query_rows() {
        let db = Database::open_in_memory().unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT, score REAL)")
            .unwrap();
        db.execute("INSERT INTO t VALUES (1, 'one', 1.5), (2, NULL, 2.0)")
            .unwrap();

        let rows = db
            .query_rows(&Expr::new("SELECT * FROM t ORDER BY id", vec![]))
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], JsonValue::from("one"));
        assert_eq!(rows[1]["name"], JsonValue::Null);
        assert_eq!(rows[1]["score"], JsonValue::from(2.0));
    }

    #[test]
    fn test_debug_logs_every_statement() {
        let db = Database::open_in_memory().unwrap().with_debug(true);
        let logs = capture_logs(|| {
            db.execute("CREATE TABLE kv (k TEXT PRIMARY KEY, v INTEGER)")
                .unwrap();
            db.execute_with_params(
                "INSERT INTO kv (k, v) VALUES (?, ?)",
                &[Value::from("alpha".to_string()), Value::from(7_i64)],
            )
            .unwrap();
            db.table_exists("kv").unwrap();
            db.table_count("kv").unwrap();
            db.primary_key("kv").unwrap();
            db.with_conn(|conn| {
                let v: i64 = conn.query_row("SELECT v FROM kv WHERE k = 'alpha'", [], |row| {
                    row.get(0)
                })?;
                Ok(v)
            })
            .unwrap();
        });

        assert!(logs.contains("dbkit::sql"));
        assert!(logs.contains("CREATE TABLE kv"));
        // Bound values are expanded into the logged text
        assert!(logs.contains("INSERT INTO kv (k, v) VALUES ('alpha', 7)"));
        assert!(logs.contains("sqlite_master WHERE type='table' AND name='kv'"));
        assert!(logs.contains("SELECT COUNT(*) FROM \"kv\""));
        assert!(logs.contains("pragma_table_info('kv')"));
        assert!(logs.contains("SELECT v FROM kv WHERE k = 'alpha'"));
    }

    #[test]
    fn test_no_statement_logs_without_debug() {
        let db = Database::open_in_memory().unwrap();
        let logs = capture_logs(|| {
            db.execute("CREATE TABLE quiet (id INTEGER PRIMARY KEY)")
                .unwrap();
            db.table_count("quiet").unwrap();
        });
        assert!(!logs.contains("quiet"));

        // Turning debug off again removes the hook
        let db = db.with_debug(true).with_debug(false);
        let logs = capture_logs(|| {
            db.table_count("quiet").unwrap();
        });
        assert!(!logs.contains("quiet"));
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("sort"), "\"sort\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
