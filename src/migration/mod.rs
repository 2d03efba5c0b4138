//! Migration orchestration
//!
//! This module provides:
//! - Migration discovery from versioned `.up`/`.down` files
//! - Catalog validation (gaps, missing Down files, duplicates)
//! - State tracking through the executor, re-read after every step
//! - Step planning and execution with fail-fast semantics
//!
//! # Example
//!
//! ```rust,no_run
//! use stepwise::config::MigrateConfig;
//! use stepwise::migration::{DownSteps, Migrator};
//!
//! # fn main() -> Result<(), stepwise::migration::MigrationError> {
//! let config = MigrateConfig::new("postgres://localhost:5432/app", "migrations");
//! let migrator = Migrator::from_config(config)?;
//!
//! let result = migrator.up(None)?;
//! if !result.success {
//!     eprintln!("{}", result.message);
//! }
//!
//! migrator.down(DownSteps::Count(1))?;
//! # Ok(())
//! # }
//! ```

pub mod catalog;
pub mod error;
pub mod file;
#[allow(clippy::module_inception)]
pub mod migration;
pub mod migrator;
pub mod plan;
pub mod startup;
pub mod state;
pub mod status;
pub mod validate;

pub use catalog::{parse_entry, MigrationCatalog, MigrationSet};
pub use error::MigrationError;
pub use file::{DirectorySource, FileSource, RawEntry, StaticSource};
pub use migration::{
    is_timestamp_version, normalize_name, Direction, Migration, NewMigration, VersioningScheme,
    DEFAULT_EXTENSION, SEQUENTIAL_WIDTH, TIMESTAMP_FORMAT,
};
pub use migrator::Migrator;
pub use plan::{plan_down, plan_goto, plan_up, DownSteps, MigrationPlan, PlannedStep};
pub use startup::startup_migrations;
pub use state::{DatabaseState, StateTracker, NIL_VERSION};
pub use status::{DatabaseInfo, MigrationResult, Operation, ResultReporter};
pub use validate::{
    find_gaps, validate, DuplicateVersion, MissingDownFile, ValidationResult, Validator,
    MAX_REPORTED_GAPS,
};
