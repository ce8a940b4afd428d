//! Database module
//!
//! This module provides all database functionality for dbkit, organized into:
//!
//! - **core**: connection wrapper, driver registry and the single-flight
//!   named cache
//! - [`Databases`]: the named database manager tying them to option
//!   resolution
//!
//! # Architecture
//!
//! ```text
//! database/
//! ├── core/           # Foundation
//! │   ├── connection  # Thread-shareable SQLite `Database` wrapper
//! │   ├── driver      # Driver identifiers/aliases -> openers
//! │   └── single      # Single-flight `NamedCache`
//! │
//! └── Databases       # name -> Options -> driver -> cached Arc<Database>
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use dbkit::database::{Databases, DriverRegistry};
//! use dbkit::EnvOptions;
//!
//! // DB_DRIVER / DB_DSN for the default database, DB_DSN_REPORTS for "reports"
//! let dbs = Databases::new(DriverRegistry::with_defaults(), EnvOptions::new());
//!
//! let main = dbs.default_database()?;
//! let reports = dbs.get("reports")?;
//! ```

pub mod core;

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::config::{EnvOptions, Options, OptionsResolver};

pub use self::core::{
    normalize_name, quote_identifier, Database, DriverOpen, DriverRegistry, JsonRow, NamedCache,
    SharedError, DEFAULT_NAME, MEMORY_DSN, SQLITE_DRIVER,
};

/// Named database manager
///
/// Resolves a logical name to [`Options`], opens the database through the
/// [`DriverRegistry`] and caches the handle. Concurrent first requests for
/// one name open a single connection; failed opens are retried on the next
/// request.
pub struct Databases {
    registry: Arc<DriverRegistry>,
    resolver: Arc<dyn OptionsResolver>,
    cache: NamedCache<Arc<Database>>,
}

impl Databases {
    /// Create a manager from a driver registry and an options resolver
    pub fn new(registry: DriverRegistry, resolver: impl OptionsResolver + 'static) -> Self {
        let registry = Arc::new(registry);
        let resolver: Arc<dyn OptionsResolver> = Arc::new(resolver);

        let cache = {
            let registry = Arc::clone(&registry);
            let resolver = Arc::clone(&resolver);
            NamedCache::new(move |name: &str| {
                create(&registry, resolver.as_ref(), name).map(Arc::new)
            })
        };

        Databases {
            registry,
            resolver,
            cache,
        }
    }

    /// Manager using the bundled drivers and unprefixed `DB_*` variables
    pub fn from_env() -> Self {
        Self::new(DriverRegistry::with_defaults(), EnvOptions::new())
    }

    /// Get the database registered under `name`, opening it on first use
    ///
    /// The empty name refers to the default database.
    pub fn get(&self, name: &str) -> Result<Arc<Database>> {
        self.cache.get(name)
    }

    /// Get the default database
    pub fn default_database(&self) -> Result<Arc<Database>> {
        self.get("")
    }

    /// Open a fresh, uncached connection for `name`
    pub fn create(&self, name: &str) -> Result<Database> {
        create(&self.registry, self.resolver.as_ref(), normalize_name(name))
    }

    /// Options `name` resolves to, with the in-memory fallback applied
    pub fn options(&self, name: &str) -> Result<Options> {
        resolve_options(self.resolver.as_ref(), normalize_name(name))
    }

    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Names of the databases opened so far, sorted
    pub fn open_names(&self) -> Vec<String> {
        self.cache.names()
    }
}

impl fmt::Debug for Databases {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Databases")
            .field("registry", &self.registry)
            .field("open", &self.open_names())
            .finish()
    }
}

fn resolve_options(resolver: &dyn OptionsResolver, name: &str) -> Result<Options> {
    let mut opts = resolver.resolve(name)?;
    if opts.is_unset() {
        opts.driver = SQLITE_DRIVER.to_string();
        opts.dsn = MEMORY_DSN.to_string();
    }
    Ok(opts)
}

fn create(
    registry: &DriverRegistry,
    resolver: &dyn OptionsResolver,
    name: &str,
) -> Result<Database> {
    let opts = resolve_options(resolver, name)?;
    debug!(
        db = name,
        driver = %opts.driver,
        dsn = %opts.dsn,
        debug = opts.debug,
        "opening database"
    );

    let db = registry.open(&opts.driver, &opts.dsn)?;
    Ok(if opts.debug { db.with_debug(true) } else { db })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn memory(_: &str) -> Options {
        Options::default()
    }

    #[test]
    fn test_unset_options_open_memory() {
        let dbs = Databases::new(DriverRegistry::with_defaults(), memory);
        let opts = dbs.options("").unwrap();
        assert_eq!(opts, Options::new("sqlite", ":memory:"));

        let db = dbs.default_database().unwrap();
        assert_eq!(db.dsn(), MEMORY_DSN);
        assert_eq!(dbs.open_names(), vec![DEFAULT_NAME.to_string()]);
    }

    #[test]
    fn test_same_handle_per_name() {
        let dbs = Databases::new(DriverRegistry::with_defaults(), memory);

        let a = dbs.get("a").unwrap();
        a.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();

        // Same in-memory database again, so the table is visible
        let again = dbs.get("a").unwrap();
        assert!(Arc::ptr_eq(&a, &again));
        assert!(again.table_exists("t").unwrap());

        let b = dbs.get("b").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert!(!b.table_exists("t").unwrap());

        assert!(Arc::ptr_eq(&dbs.get("").unwrap(), &dbs.get(DEFAULT_NAME).unwrap()));
    }

    #[test]
    fn test_concurrent_open_resolves_once() {
        let resolved = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&resolved);
        let dbs = Arc::new(Databases::new(
            DriverRegistry::with_defaults(),
            move |_: &str| {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(20));
                Options::new("sqlite", ":memory:")
            },
        ));

        let barrier = Arc::new(Barrier::new(8));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let dbs = Arc::clone(&dbs);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    dbs.get("shared").unwrap()
                })
            })
            .collect();

        let opened: Vec<Arc<Database>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(resolved.load(Ordering::SeqCst), 1);
        assert!(opened.iter().all(|db| Arc::ptr_eq(db, &opened[0])));
    }

    #[test]
    fn test_unknown_driver_is_retried() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        let dbs = Databases::new(DriverRegistry::with_defaults(), move |_: &str| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Options::new("mysql", "root@localhost")
            } else {
                Options::new("sqlite3", "")
            }
        });

        let err = dbs.get("main").unwrap_err();
        assert_eq!(err.to_string(), "unknown driver: mysql");
        assert!(dbs.open_names().is_empty());

        assert!(dbs.get("main").is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_debug_option() {
        let dbs = Databases::new(DriverRegistry::with_defaults(), |_: &str| {
            Options::new("sqlite", ":memory:").with_debug(true)
        });
        assert!(dbs.get("x").unwrap().is_debug());
        assert!(dbs.create("x").unwrap().is_debug());
    }

    #[test]
    fn test_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("main.sqlite3");
        let dsn = path.to_str().unwrap().to_string();

        let dbs = Databases::new(DriverRegistry::with_defaults(), move |_: &str| {
            Options::new("sqlite", dsn.clone())
        });
        let db = dbs.get("main").unwrap();
        db.execute("CREATE TABLE t (id INTEGER PRIMARY KEY)").unwrap();

        // An uncached connection sees the same file
        assert!(dbs.create("main").unwrap().table_exists("t").unwrap());
    }
}
