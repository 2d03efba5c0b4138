//! Engine configuration
//!
//! [`MigrateConfig`] is read from `config/stepwise.toml` (optional) and
//! `STEPWISE__MIGRATE__*` environment variables, e.g.
//! `STEPWISE__MIGRATE__DATABASE_URL`.

use crate::migration::{MigrationError, VersioningScheme};
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Default location of the optional configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/stepwise.toml";

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Connection target where state and SQL execute
    #[serde(default)]
    pub database_url: String,
    /// Root directory listed by the file source
    #[serde(default = "default_migrations_path")]
    pub migrations_path: PathBuf,
    /// Tracking table used by the executor
    #[serde(default = "default_table_name")]
    pub table_name: String,
    /// Path or name of the golang-migrate binary
    #[serde(default = "default_command_path")]
    pub command_path: String,
    /// `true`: sequential numbering, `false`: timestamps
    #[serde(default = "default_sequential")]
    pub sequential: bool,
    /// Forwarded to the executor's database lock
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,
}

fn default_migrations_path() -> PathBuf {
    PathBuf::from("migrations")
}

fn default_table_name() -> String {
    "schema_migrations".to_string()
}

fn default_command_path() -> String {
    "migrate".to_string()
}

fn default_sequential() -> bool {
    true
}

fn default_lock_timeout_seconds() -> u64 {
    15
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: String::new(),
            migrations_path: default_migrations_path(),
            table_name: default_table_name(),
            command_path: default_command_path(),
            sequential: default_sequential(),
            lock_timeout_seconds: default_lock_timeout_seconds(),
        }
    }
}

impl MigrateConfig {
    pub fn new(database_url: impl Into<String>, migrations_path: impl AsRef<Path>) -> Self {
        Self {
            database_url: database_url.into(),
            migrations_path: migrations_path.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Numbering scheme for `create` and validation
    pub fn scheme(&self) -> VersioningScheme {
        VersioningScheme::from_sequential(self.sequential)
    }

    /// Load from `config/stepwise.toml`, falling back to env vars
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load from the given TOML file (optional) overlaid with env vars
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let builder = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env_source());

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                // An unreadable file should not hide a complete env configuration
                if path.exists() {
                    log::warn!(
                        "Failed to load config file {}, falling back to env. Error: {}",
                        path.display(),
                        err
                    );
                }
                Config::builder()
                    .add_source(env_source())
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        // A missing section means every field takes its default
        match settings.get::<MigrateConfig>("migrate") {
            Ok(cfg) => Ok(cfg),
            Err(ConfigError::NotFound(_)) => Ok(Self::default()),
            Err(e) => Err(ConfigError::Message(format!(
                "Migration configuration could not be loaded from file or environment: {}",
                e
            ))),
        }
    }

    /// Check the values the engine cannot run without
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Config` for an empty database URL or a missing
    /// migrations directory.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.database_url.trim().is_empty() {
            return Err(MigrationError::Config("Database URL is required".to_string()));
        }
        if !self.migrations_path.exists() {
            return Err(MigrationError::Config(format!(
                "Migrations path does not exist: {}",
                self.migrations_path.display()
            )));
        }
        Ok(())
    }
}

fn env_source() -> Environment {
    Environment::with_prefix("STEPWISE")
        .separator("__")
        .try_parsing(true)
}
