//! Driver registry
//!
//! Maps driver identifiers (and their aliases) to connection openers. A
//! registry is built once at startup and passed by reference to whatever
//! needs to open databases.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use super::connection::Database;

/// Turns a DSN into an open [`Database`]
pub type DriverOpen = Arc<dyn Fn(&str) -> Result<Database> + Send + Sync>;

/// Name the bundled SQLite driver is registered under
pub const SQLITE_DRIVER: &str = "sqlite";

/// Registry of database drivers
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, DriverOpen>,
    aliases: HashMap<String, String>,
}

impl DriverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the bundled SQLite driver
    ///
    /// The driver answers to `sqlite`, `sqlite3` and `rusqlite`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(SQLITE_DRIVER, Database::open, &["sqlite3", "rusqlite"]);
        registry
    }

    /// Register a driver under `name`, optionally reachable through aliases
    ///
    /// Registering an existing name replaces its opener.
    pub fn register<F>(&mut self, name: &str, open: F, aliases: &[&str])
    where
        F: Fn(&str) -> Result<Database> + Send + Sync + 'static,
    {
        self.drivers.insert(name.to_string(), Arc::new(open));
        for alias in aliases {
            self.aliases.insert(alias.to_string(), name.to_string());
        }
    }

    /// Find the opener for a driver name or alias
    pub fn resolve(&self, driver: &str) -> Option<&DriverOpen> {
        self.drivers.get(driver).or_else(|| {
            self.aliases
                .get(driver)
                .and_then(|name| self.drivers.get(name))
        })
    }

    /// Open a database with the named driver
    pub fn open(&self, driver: &str, dsn: &str) -> Result<Database> {
        let open = self
            .resolve(driver)
            .ok_or_else(|| anyhow!("unknown driver: {}", driver))?;
        open(dsn)
    }

    /// Registered driver names, sorted
    pub fn drivers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drivers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Aliases pointing at `driver`, sorted
    pub fn aliases_of(&self, driver: &str) -> Vec<String> {
        let mut aliases: Vec<String> = self
            .aliases
            .iter()
            .filter(|(_, target)| target.as_str() == driver)
            .map(|(alias, _)| alias.clone())
            .collect();
        aliases.sort();
        aliases
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.drivers())
            .field("aliases", &self.aliases)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_driver_and_aliases() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.drivers(), vec!["sqlite".to_string()]);
        assert_eq!(
            registry.aliases_of("sqlite"),
            vec!["rusqlite".to_string(), "sqlite3".to_string()]
        );

        for name in ["sqlite", "sqlite3", "rusqlite"] {
            let db = registry.open(name, ":memory:").unwrap();
            assert_eq!(db.dsn(), ":memory:");
        }
    }

    #[test]
    fn test_unknown_driver() {
        let registry = DriverRegistry::with_defaults();
        let err = registry.open("oracle", "dsn").err().unwrap();
        assert_eq!(err.to_string(), "unknown driver: oracle");

        let err = DriverRegistry::new().open("sqlite", ":memory:").err().unwrap();
        assert_eq!(err.to_string(), "unknown driver: sqlite");
    }

    #[test]
    fn test_only_sqlite_is_bundled() {
        let registry = DriverRegistry::with_defaults();
        assert_eq!(registry.drivers(), vec![SQLITE_DRIVER.to_string()]);
        for driver in ["postgres", "pg", "postgresql", "mssql", "sqlserver"] {
            let err = registry.open(driver, "host=localhost").err().unwrap();
            assert_eq!(err.to_string(), format!("unknown driver: {}", driver));
        }
    }

    #[test]
    fn test_custom_driver() {
        let mut registry = DriverRegistry::new();
        registry.register(
            "traced",
            |dsn: &str| Ok(Database::open(dsn)?.with_debug(true)),
            &["t"],
        );

        let db = registry.open("t", "").unwrap();
        assert!(db.is_debug());
        assert!(registry.resolve("traced").is_some());
        assert!(registry.resolve("sqlite").is_none());
    }
}
