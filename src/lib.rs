//! # Stepwise
//!
//! Schema migration orchestration on top of an external migration executor.
//!
//! Migrations are versioned `.up`/`.down` file pairs. The engine plans each
//! operation against the catalog, applies it one version at a time, and re-reads
//! the database's version and dirty flag after every step. A batch stops at the
//! first failure and leaves the dirty flag for an operator to clear with `force`.

pub mod command;
pub mod config;
pub mod executor;
pub mod metrics;
pub mod migration;
pub mod mock;

pub use command::MigrateCommand;
pub use config::MigrateConfig;
pub use executor::MigrationExecutor;
pub use migration::{
    DatabaseInfo, DatabaseState, Direction, DownSteps, Migration, MigrationError,
    MigrationResult, Migrator, ValidationResult,
};
