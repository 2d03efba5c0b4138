//! Migration-specific error types

use crate::migration::Direction;

/// Migration-specific errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationError {
    /// Migration listing is unreadable or contains a malformed entry
    Catalog(String),
    /// Database unreachable
    Connection(String),
    /// Database is dirty; only `force` may proceed
    DirtyState { version: Option<i64> },
    /// Requested version has no migration entry
    UnknownVersion(i64),
    /// `version()` called on a database with no applied migration
    NoMigrationsApplied,
    /// Executor could not take the database lock in time
    LockTimeout(String),
    /// SQL failure while applying a single step
    ExecutionFailed {
        version: i64,
        direction: Direction,
        error: String,
    },
    /// Observed state after a step differs from the expected state
    StateMismatch {
        expected: Option<i64>,
        observed: Option<i64>,
        dirty: bool,
    },
    /// Step count must be positive
    InvalidSteps(usize),
    /// Version cannot be represented in the tracking table
    InvalidVersion(i64),
    /// Migration name unusable as a file name slug
    InvalidName(String),
    /// Version already taken by another migration
    DuplicateVersion(i64),
    /// Down step required but its file is missing
    MissingDownFile { version: i64, name: String },
    /// `drop` invoked without confirmation
    DropNotConfirmed,
    /// Configuration could not be loaded or is incomplete
    Config(String),
    /// External `migrate` binary not found
    CommandNotFound(String),
}

impl MigrationError {
    /// Whether the caller may retry the same operation unchanged.
    ///
    /// Only lock contention qualifies; the engine itself never retries.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MigrationError::LockTimeout(_))
    }
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Catalog(msg) => write!(f, "Invalid migration catalog: {}", msg),
            MigrationError::Connection(msg) => write!(f, "Database connection failed: {}", msg),
            MigrationError::DirtyState { version } => {
                let version = version.map_or_else(|| "none".to_string(), |v| v.to_string());
                write!(
                    f,
                    "Database is dirty at version {}.\n\
                     A previous migration failed part-way; inspect the schema, then run \
                     `force <version>` to mark the correct version clean.",
                    version
                )
            }
            MigrationError::UnknownVersion(version) => {
                write!(f, "No migration found for version {}", version)
            }
            MigrationError::NoMigrationsApplied => write!(f, "No migrations have been applied"),
            MigrationError::LockTimeout(msg) => {
                write!(
                    f,
                    "Migration lock timeout: {}\n\
                     Another process may be running migrations; retry once it has finished.",
                    msg
                )
            }
            MigrationError::ExecutionFailed { version, direction, error } => {
                write!(
                    f,
                    "Migration {} ({}) failed during execution: {}",
                    version, direction, error
                )
            }
            MigrationError::StateMismatch { expected, observed, dirty } => {
                write!(
                    f,
                    "Unexpected database state after step: expected version {:?}, observed {:?} (dirty: {})",
                    expected, observed, dirty
                )
            }
            MigrationError::InvalidSteps(steps) => {
                write!(f, "Invalid step count {}: must be a positive integer", steps)
            }
            MigrationError::InvalidVersion(version) => {
                write!(f, "Invalid migration version: {}", version)
            }
            MigrationError::InvalidName(name) => write!(f, "Invalid migration name: '{}'", name),
            MigrationError::DuplicateVersion(version) => {
                write!(f, "Migration version {} already exists", version)
            }
            MigrationError::MissingDownFile { version, name } => {
                write!(
                    f,
                    "Down migration file not found for {}_{}\n\
                     Suggestion: add {:06}_{}.down.sql before rolling back",
                    version, name, version, name
                )
            }
            MigrationError::DropNotConfirmed => {
                write!(f, "Refusing to drop the database without force confirmation")
            }
            MigrationError::Config(msg) => write!(f, "Configuration error: {}", msg),
            MigrationError::CommandNotFound(path) => {
                write!(
                    f,
                    "migrate command not found at: {}. Please install golang-migrate/migrate first.",
                    path
                )
            }
        }
    }
}

impl std::error::Error for MigrationError {}

impl From<config::ConfigError> for MigrationError {
    fn from(error: config::ConfigError) -> Self {
        MigrationError::Config(error.to_string())
    }
}
