#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

//! dbkit - named SQLite databases and small query helpers
//!
//! dbkit hands out shared database handles by logical name, opening each one
//! exactly once even when many threads ask for it at the same time, and
//! provides a few composable helpers for building queries against them. It
//! can be used as both a command-line application and a library.
//!
//! # Feature Flags
//!
//! | Feature | Description | Key Dependencies |
//! |---------|-------------|------------------|
//! | (none) | Registry, cache, options and query helpers | `rusqlite`, `config` |
//! | `display` | Table rendering of query results | `tabled` |
//! | `cli` | The `dbkit` binary | All above + `clap`, `dotenvy` |
//!
//! # Architecture
//!
//! - **[`database`]**: connections, the driver registry, the single-flight
//!   named cache and the [`Databases`] manager
//! - **[`config`]**: per-name [`Options`] and where they come from
//! - **[`query`]**: ordered batch updates and query scopes
//! - **[`output`]**: rendering rows for the CLI (requires `display`)
//!
//! # Quick Start Examples
//!
//! ## Named databases
//!
//! ```rust,ignore
//! use dbkit::{Databases, DriverRegistry, EnvOptions};
//!
//! // DB_DRIVER=sqlite DB_DSN=/var/lib/app/main.sqlite3
//! // DB_DRIVER_REPORTS=sqlite DB_DSN_REPORTS=/var/lib/app/reports.sqlite3
//! let dbs = Databases::new(DriverRegistry::with_defaults(), EnvOptions::new());
//!
//! let main = dbs.default_database()?;
//! let reports = dbs.get("reports")?;
//! ```
//!
//! ## Reordering rows
//!
//! ```rust,ignore
//! use std::collections::HashMap;
//! use dbkit::query::sort;
//!
//! let positions: HashMap<i64, i64> = [(4, 1), (1, 4)].into();
//! let updated = sort(&db, "tasks", positions)?;
//! ```
//!
//! ## Query scopes
//!
//! ```rust,ignore
//! use dbkit::query::{like, order_by, paging, Query};
//!
//! let rows = Query::table("users")
//!     .scope(like("name", "ann"))
//!     .scope(order_by("-created_at", "id"))
//!     .scope(paging(2, 20, None))
//!     .fetch(&db)?;
//! ```

pub mod config;
pub mod database;
#[cfg(feature = "display")]
pub mod output;
pub mod query;

// =============================================================================
// Database
// =============================================================================

pub use database::{
    normalize_name, Database, Databases, DriverOpen, DriverRegistry, JsonRow, NamedCache,
    SharedError, DEFAULT_NAME, MEMORY_DSN, SQLITE_DRIVER,
};

// =============================================================================
// Configuration
// =============================================================================

pub use config::{EnvOptions, Options, OptionsResolver};

// =============================================================================
// Queries
// =============================================================================

pub use query::{sort, sort_exec, sort_prep, Column, Expr, Query, Scope, SortOptions};

#[cfg(feature = "display")]
pub use output::{format_rows, OutputFormat};
