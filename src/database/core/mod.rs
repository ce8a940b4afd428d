//! Core database infrastructure
//!
//! This module provides the foundational pieces the named database manager is
//! built from:
//! - `Database`: thread-shareable SQLite connection wrapper
//! - `DriverRegistry`: driver identifiers and aliases mapped to openers
//! - `NamedCache`: single-flight cache of instances keyed by name

mod connection;
mod driver;
mod single;

pub use connection::{quote_identifier, Database, JsonRow, MEMORY_DSN};
#[cfg(test)]
pub(crate) use connection::capture_logs;
pub use driver::{DriverOpen, DriverRegistry, SQLITE_DRIVER};
pub use single::{normalize_name, NamedCache, SharedError, DEFAULT_NAME};
