//! Connection options and their resolution
//!
//! Every logical database name resolves to a set of [`Options`]. The default
//! resolver, [`EnvOptions`], reads them from the environment (optionally
//! layered over a TOML file) using these keys:
//!
//! | Key | Default database | Named database `main` |
//! |-----|------------------|-----------------------|
//! | driver | `DB_DRIVER` | `DB_DRIVER_MAIN` |
//! | dsn | `DB_DSN` | `DB_DSN_MAIN` |
//! | debug | `DB_DEBUG` | `DB_DEBUG_MAIN` |
//!
//! With an environment prefix such as `APP`, the keys become `APP_DB_DRIVER`,
//! `APP_DB_DSN_MAIN` and so on.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use config::{Config, ConfigError};
use serde::{Deserialize, Serialize};

use crate::database::core::DEFAULT_NAME;

/// Options used to open one named database
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Options {
    /// Driver identifier, e.g. `sqlite`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub driver: String,

    /// Data source name, passed to the driver as-is
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dsn: String,

    /// Log every statement run through the connection
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub debug: bool,
}

impl Options {
    pub fn new(driver: impl Into<String>, dsn: impl Into<String>) -> Self {
        Options {
            driver: driver.into(),
            dsn: dsn.into(),
            debug: false,
        }
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Neither a driver nor a DSN was configured
    pub fn is_unset(&self) -> bool {
        self.driver.is_empty() && self.dsn.is_empty()
    }
}

/// Resolves the [`Options`] for a logical database name
pub trait OptionsResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Options>;
}

impl<F> OptionsResolver for F
where
    F: Fn(&str) -> Options + Send + Sync,
{
    fn resolve(&self, name: &str) -> Result<Options> {
        Ok(self(name))
    }
}

/// Environment-backed options resolver
#[derive(Debug, Clone, Default)]
pub struct EnvOptions {
    prefix: Option<String>,
    file: Option<PathBuf>,
}

impl EnvOptions {
    /// Resolver reading unprefixed `DB_*` variables
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `<PREFIX>_DB_*` variables instead of `DB_*`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    /// Layer the environment over a TOML file holding the same keys
    ///
    /// File keys are written in lower case without the prefix, e.g.
    /// `db_dsn_main = "/var/lib/app/main.sqlite3"`. A missing file is ignored.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    /// Name of the environment variable holding `field` for database `name`
    pub fn var_name(&self, field: &str, name: &str) -> String {
        let key = key_for(field, name).to_uppercase();
        match &self.prefix {
            Some(prefix) => format!("{}_{}", prefix, key),
            None => key,
        }
    }

    fn load(&self) -> Result<Config> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            let path_str = path
                .to_str()
                .ok_or_else(|| anyhow!("Could not convert path to string"))?;
            builder = builder.add_source(config::File::with_name(path_str).required(false));
        }

        // Only `[<PREFIX>_]DB_*` variables are read, kept whole and lower-cased,
        // e.g. `APP_DB_DSN_MAIN` becomes `app_db_dsn_main`
        let env_prefix = match &self.prefix {
            Some(prefix) => format!("{}_DB", prefix),
            None => "DB".to_string(),
        };
        builder = builder.add_source(
            config::Environment::with_prefix(&env_prefix).keep_prefix(true),
        );

        builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))
    }

    /// Value of `field` for database `name`, environment first, then the file
    fn lookup(&self, settings: &Config, field: &str, name: &str) -> Result<String> {
        let env_key = self.var_name(field, name).to_lowercase();
        let file_key = key_for(field, name);

        for key in [&env_key, &file_key] {
            match settings.get_string(key) {
                Ok(value) => return Ok(value),
                Err(ConfigError::NotFound(_)) => continue,
                Err(e) => return Err(anyhow!("Failed to read configuration key '{}': {}", key, e)),
            }
        }
        Ok(String::new())
    }
}

impl OptionsResolver for EnvOptions {
    fn resolve(&self, name: &str) -> Result<Options> {
        let settings = self.load()?;

        Ok(Options {
            driver: self.lookup(&settings, "driver", name)?,
            dsn: self.lookup(&settings, "dsn", name)?,
            debug: parse_bool(&self.lookup(&settings, "debug", name)?).unwrap_or(false),
        })
    }
}

/// Lower-case lookup key for `field` of database `name`
fn key_for(field: &str, name: &str) -> String {
    let field = field.to_lowercase();
    if name.is_empty() || name == DEFAULT_NAME {
        format!("db_{}", field)
    } else {
        format!("db_{}_{}", field, name.to_lowercase())
    }
}

/// Parse the boolean spellings commonly used in environment variables
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" | "yes" | "on" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" | "no" | "off" => Some(false),
        _ => None,
    }
}
