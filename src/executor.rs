//! `MigrationExecutor` - the boundary between the engine and the database
//!
//! The engine never runs SQL itself. Each implementation of this trait decides how
//! one migration step reaches the database: an in-process driver, an out-of-process
//! binary (see [`MigrateCommand`](crate::command::MigrateCommand)), or a remote call.
//!
//! Implementations own database-level locking around each step and must update the
//! persisted version/dirty record atomically with the step's SQL.

use crate::migration::{DatabaseState, Migration, MigrationError};

/// Trait for applying migration steps and reading migration state
///
/// # Examples
///
/// ```no_run
/// use stepwise::executor::MigrationExecutor;
/// use stepwise::migration::{Migration, MigrationError};
///
/// # fn example(executor: &dyn MigrationExecutor) -> Result<(), MigrationError> {
/// let state = executor.query_status()?;
/// if state.is_clean() {
///     let after = executor.apply_step(&Migration::up(1, "init"))?;
///     assert_eq!(after.version, Some(1));
/// }
/// # Ok(())
/// # }
/// ```
pub trait MigrationExecutor {
    /// Execute exactly one migration file against the database
    ///
    /// # Returns
    ///
    /// Returns the state recorded after the step.
    ///
    /// # Errors
    ///
    /// - `MigrationError::ExecutionFailed` if the SQL fails; the database must then
    ///   be left dirty.
    /// - `MigrationError::LockTimeout` if the database lock could not be taken; no
    ///   SQL ran.
    /// - `MigrationError::Connection` if the database is unreachable.
    fn apply_step(&self, migration: &Migration) -> Result<DatabaseState, MigrationError>;

    /// Read the persisted version and dirty flag
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Connection` if the database is unreachable.
    fn query_status(&self) -> Result<DatabaseState, MigrationError>;

    /// Overwrite the persisted version and clear the dirty flag, running no SQL
    ///
    /// `None` resets the database to "no migration applied".
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Connection` if the database is unreachable.
    fn force_version(&self, version: Option<i64>) -> Result<(), MigrationError>;

    /// Remove every schema object, including the tracking table
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::ExecutionFailed` or `MigrationError::Connection`.
    fn drop_all(&self) -> Result<(), MigrationError>;
}

impl<T: MigrationExecutor + ?Sized> MigrationExecutor for Box<T> {
    fn apply_step(&self, migration: &Migration) -> Result<DatabaseState, MigrationError> {
        (**self).apply_step(migration)
    }

    fn query_status(&self) -> Result<DatabaseState, MigrationError> {
        (**self).query_status()
    }

    fn force_version(&self, version: Option<i64>) -> Result<(), MigrationError> {
        (**self).force_version(version)
    }

    fn drop_all(&self) -> Result<(), MigrationError> {
        (**self).drop_all()
    }
}
