//! Persisted migration state as observed through the executor

use crate::executor::MigrationExecutor;
use crate::migration::MigrationError;
use serde::Serialize;

/// Wire value meaning "no migration applied" (golang-migrate's nil version)
pub const NIL_VERSION: i64 = -1;

/// Current version and dirty flag, as persisted by the database
///
/// The database owns this record. A copy is only valid until the next step is
/// applied; callers must re-query instead of reusing it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseState {
    /// `None` when no migration has ever been applied
    pub version: Option<i64>,
    /// A step failed part-way; schema state is unknown
    pub dirty: bool,
}

impl DatabaseState {
    pub fn new(version: Option<i64>, dirty: bool) -> Self {
        Self { version, dirty }
    }

    /// Fresh database: no version, clean
    pub fn nil() -> Self {
        Self::new(None, false)
    }

    pub fn clean(version: i64) -> Self {
        Self::new(Some(version), false)
    }

    pub fn dirty(version: i64) -> Self {
        Self::new(Some(version), true)
    }

    /// Build from the wire representation where `-1` means no version
    pub fn from_wire(version: i64, dirty: bool) -> Self {
        let version = if version == NIL_VERSION { None } else { Some(version) };
        Self::new(version, dirty)
    }

    /// Wire representation of the version (`-1` for none)
    pub fn wire_version(&self) -> i64 {
        self.version.unwrap_or(NIL_VERSION)
    }

    pub fn is_clean(&self) -> bool {
        !self.dirty
    }

    /// Fail with `DirtyState` unless clean
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DirtyState` carrying the dirty version.
    pub fn ensure_clean(&self) -> Result<(), MigrationError> {
        if self.dirty {
            Err(MigrationError::DirtyState {
                version: self.version,
            })
        } else {
            Ok(())
        }
    }
}

/// Reads the database's migration state, never caching it
pub struct StateTracker<'a> {
    executor: &'a dyn MigrationExecutor,
}

impl<'a> StateTracker<'a> {
    pub fn new(executor: &'a dyn MigrationExecutor) -> Self {
        Self { executor }
    }

    /// Query the current state
    ///
    /// Every call goes to the database: the dirty flag can change underneath the
    /// caller when another process applies migrations.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Connection` if the database is unreachable.
    pub fn current(&self) -> Result<DatabaseState, MigrationError> {
        let state = self.executor.query_status()?;
        log::trace!(
            "Observed database state: version={:?} dirty={}",
            state.version,
            state.dirty
        );
        Ok(state)
    }

    /// Query the current state and refuse if dirty
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DirtyState` if dirty, or any error from `current()`.
    pub fn current_clean(&self) -> Result<DatabaseState, MigrationError> {
        let state = self.current()?;
        state.ensure_clean()?;
        Ok(state)
    }
}
