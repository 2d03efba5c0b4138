//! In-memory executor with scripted failures
//!
//! Behaves like golang-migrate's bookkeeping: a step first marks the target version
//! dirty, then clears the flag once its SQL succeeded. Clones share state, so a test
//! can hand one clone to the engine and inspect the other.

use crate::executor::MigrationExecutor;
use crate::migration::{DatabaseState, Direction, Migration, MigrationError};
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

/// How a scripted step fails
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Failure {
    /// SQL error: the step returns `ExecutionFailed` and leaves the database dirty
    Sql(String),
    /// Lock contention: nothing runs, state untouched
    LockTimeout,
    /// The step reports success but the tracking table is left dirty
    SilentDirty,
    /// The step reports success but records another version
    WrongVersion(Option<i64>),
}

#[derive(Debug, Default)]
struct Inner {
    state: Option<DatabaseState>,
    versions: BTreeSet<i64>,
    failures: HashMap<(i64, Direction), Failure>,
    unreachable: bool,
    applied: Vec<Migration>,
    forced: Vec<Option<i64>>,
    drops: usize,
    status_queries: usize,
}

/// Scriptable in-memory [`MigrationExecutor`]
#[derive(Debug, Clone, Default)]
pub struct MockExecutor {
    inner: Arc<Mutex<Inner>>,
}

impl MockExecutor {
    pub fn new(state: DatabaseState) -> Self {
        let executor = Self::default();
        executor.lock().state = Some(state);
        executor
    }

    /// Versions known to exist, used to find where a Down step lands
    pub fn with_versions(self, versions: impl IntoIterator<Item = i64>) -> Self {
        self.lock().versions.extend(versions);
        self
    }

    /// Make the step for `version` in `direction` fail
    pub fn fail_on(self, version: i64, direction: Direction, failure: Failure) -> Self {
        self.lock().failures.insert((version, direction), failure);
        self
    }

    /// Remove a scripted failure
    pub fn clear_failure(&self, version: i64, direction: Direction) {
        self.lock().failures.remove(&(version, direction));
    }

    /// Every call fails with `Connection` while set
    pub fn set_unreachable(&self, unreachable: bool) {
        self.lock().unreachable = unreachable;
    }

    /// Overwrite the state as if another process had changed it
    pub fn set_state(&self, state: DatabaseState) {
        self.lock().state = Some(state);
    }

    pub fn state(&self) -> DatabaseState {
        self.lock().state.unwrap_or_else(DatabaseState::nil)
    }

    /// Steps that ran SQL, in order (including the one that failed)
    pub fn applied(&self) -> Vec<Migration> {
        self.lock().applied.clone()
    }

    pub fn forced(&self) -> Vec<Option<i64>> {
        self.lock().forced.clone()
    }

    pub fn drops(&self) -> usize {
        self.lock().drops
    }

    pub fn status_queries(&self) -> usize {
        self.lock().status_queries
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn check_reachable(&self) -> Result<(), MigrationError> {
        if self.unreachable {
            Err(MigrationError::Connection("connection refused".to_string()))
        } else {
            Ok(())
        }
    }

    fn landing_version(&self, migration: &Migration) -> Option<i64> {
        match migration.direction {
            Direction::Up => Some(migration.version),
            Direction::Down => self.versions.range(..migration.version).next_back().copied(),
        }
    }
}

impl MigrationExecutor for MockExecutor {
    fn apply_step(&self, migration: &Migration) -> Result<DatabaseState, MigrationError> {
        let mut inner = self.lock();
        inner.check_reachable()?;

        let failure = inner
            .failures
            .get(&(migration.version, migration.direction))
            .cloned();
        if failure == Some(Failure::LockTimeout) {
            return Err(MigrationError::LockTimeout(
                "can't acquire lock".to_string(),
            ));
        }

        inner.applied.push(migration.clone());
        if migration.direction == Direction::Up {
            inner.versions.insert(migration.version);
        }
        let landing = inner.landing_version(migration);

        let state = match failure {
            Some(Failure::Sql(error)) => {
                inner.state = Some(DatabaseState::new(landing, true));
                return Err(MigrationError::ExecutionFailed {
                    version: migration.version,
                    direction: migration.direction,
                    error,
                });
            }
            Some(Failure::SilentDirty) => DatabaseState::new(landing, true),
            Some(Failure::WrongVersion(version)) => DatabaseState::new(version, false),
            Some(Failure::LockTimeout) | None => DatabaseState::new(landing, false),
        };

        inner.state = Some(state);
        Ok(state)
    }

    fn query_status(&self) -> Result<DatabaseState, MigrationError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        inner.status_queries += 1;
        Ok(inner.state.unwrap_or_else(DatabaseState::nil))
    }

    fn force_version(&self, version: Option<i64>) -> Result<(), MigrationError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        inner.forced.push(version);
        inner.state = Some(DatabaseState::new(version, false));
        Ok(())
    }

    fn drop_all(&self) -> Result<(), MigrationError> {
        let mut inner = self.lock();
        inner.check_reachable()?;
        inner.drops += 1;
        inner.state = Some(DatabaseState::nil());
        Ok(())
    }
}
