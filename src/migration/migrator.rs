//! Migrator - Core migration execution engine

use crate::command::MigrateCommand;
use crate::config::MigrateConfig;
use crate::executor::MigrationExecutor;
use crate::migration::{
    normalize_name, plan_down, plan_goto, plan_up, DatabaseInfo, DatabaseState, DirectorySource,
    DownSteps, FileSource, MigrationCatalog, MigrationError, MigrationPlan, MigrationResult,
    MigrationSet, NewMigration, Operation, ResultReporter, StateTracker, ValidationResult,
    Validator, VersioningScheme, DEFAULT_EXTENSION, NIL_VERSION,
};
#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;
use chrono::Utc;
use std::time::Instant;

/// Core migration execution engine
///
/// The `Migrator` reads the catalog, computes a plan against the state the
/// database reports, and hands the plan to the executor one version at a time.
/// It never caches the catalog or the database state between calls.
///
/// A batch stops at the first step that fails or leaves the database in an
/// unexpected state. Nothing is rolled back automatically: the dirty flag stays
/// visible until an operator runs [`force`](Migrator::force).
pub struct Migrator {
    config: MigrateConfig,
    catalog: MigrationCatalog<Box<dyn FileSource>>,
    executor: Box<dyn MigrationExecutor>,
}

impl Migrator {
    /// Create a Migrator over an arbitrary file source and executor
    pub fn new(
        config: MigrateConfig,
        source: impl FileSource + 'static,
        executor: impl MigrationExecutor + 'static,
    ) -> Self {
        let source: Box<dyn FileSource> = Box::new(source);
        Self {
            config,
            catalog: MigrationCatalog::new(source),
            executor: Box::new(executor),
        }
    }

    /// Create a Migrator reading `migrations_path` and driving the `migrate` binary
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Config` for an invalid configuration, or
    /// `MigrationError::CommandNotFound` if the binary is not installed.
    pub fn from_config(config: MigrateConfig) -> Result<Self, MigrationError> {
        config.validate()?;
        let source = DirectorySource::new(&config.migrations_path);
        let executor = MigrateCommand::new(&config)?;
        Ok(Self::new(config, source, executor))
    }

    pub fn config(&self) -> &MigrateConfig {
        &self.config
    }

    fn tracker(&self) -> StateTracker<'_> {
        StateTracker::new(self.executor.as_ref())
    }

    /// List all available migrations, ascending
    pub fn list(&self) -> Result<MigrationSet, MigrationError> {
        self.catalog.list()
    }

    /// Validate the catalog against the configured numbering scheme
    ///
    /// Touches no database.
    pub fn validate(&self) -> Result<ValidationResult, MigrationError> {
        let set = self.list()?;
        Ok(Validator::new(self.config.scheme()).validate(&set))
    }

    /// Current version and dirty flag
    pub fn status(&self) -> Result<DatabaseInfo, MigrationError> {
        Ok(ResultReporter::info(self.tracker().current()?))
    }

    /// Current version
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::NoMigrationsApplied` on a fresh database.
    pub fn version(&self) -> Result<i64, MigrationError> {
        self.tracker()
            .current()?
            .version
            .ok_or(MigrationError::NoMigrationsApplied)
    }

    /// Steps `up(steps)` would run, without running them
    pub fn plan_up(&self, steps: Option<usize>) -> Result<MigrationPlan, MigrationError> {
        self.prepare(|set, state| plan_up(set, state.version, steps))
            .map(|(plan, _)| plan)
    }

    /// Steps `down(steps)` would run, without running them
    pub fn plan_down(&self, steps: DownSteps) -> Result<MigrationPlan, MigrationError> {
        self.prepare(|set, state| plan_down(set, state.version, steps))
            .map(|(plan, _)| plan)
    }

    /// Steps `goto(version)` would run, without running them
    pub fn plan_goto(&self, version: i64) -> Result<MigrationPlan, MigrationError> {
        self.prepare(|set, state| plan_goto(set, state.version, version))
            .map(|(plan, _)| plan)
    }

    /// Apply up to `steps` pending migrations (all when `None`)
    ///
    /// # Errors
    ///
    /// Pre-flight failures only: `DirtyState`, `InvalidSteps`, `Catalog`,
    /// `Connection`. A step failing mid-batch is reported in the returned
    /// [`MigrationResult`] with `success == false`.
    pub fn up(&self, steps: Option<usize>) -> Result<MigrationResult, MigrationError> {
        let (plan, state) = self.prepare(|set, state| plan_up(set, state.version, steps))?;
        Ok(self.execute(Operation::Up, &plan, state))
    }

    /// Roll back `steps` applied migrations, newest first
    ///
    /// # Errors
    ///
    /// Pre-flight failures only: `DirtyState`, `InvalidSteps`, `UnknownVersion`,
    /// `MissingDownFile`, `Catalog`, `Connection`.
    pub fn down(&self, steps: DownSteps) -> Result<MigrationResult, MigrationError> {
        let (plan, state) = self.prepare(|set, state| plan_down(set, state.version, steps))?;
        Ok(self.execute(Operation::Down, &plan, state))
    }

    /// Migrate up or down to exactly `version`
    ///
    /// Going to the current version succeeds with zero steps.
    ///
    /// # Errors
    ///
    /// Pre-flight failures only: `DirtyState`, `UnknownVersion`, `MissingDownFile`,
    /// `Catalog`, `Connection`.
    pub fn goto(&self, version: i64) -> Result<MigrationResult, MigrationError> {
        let (plan, state) = self.prepare(|set, state| plan_goto(set, state.version, version))?;
        Ok(self.execute(Operation::Goto, &plan, state))
    }

    /// Overwrite the tracked version and clear the dirty flag, running no SQL
    ///
    /// The only way out of a dirty state. `-1` resets to "no migration applied".
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidVersion` below `-1`, or `Connection`.
    pub fn force(&self, version: i64) -> Result<MigrationResult, MigrationError> {
        if version < NIL_VERSION {
            return Err(MigrationError::InvalidVersion(version));
        }
        let target = DatabaseState::from_wire(version, false).version;

        let before = self.tracker().current()?;
        self.executor.force_version(target)?;
        let after = self.tracker().current()?;

        log::warn!(
            "Forced migration version from {:?} (dirty: {}) to {:?}",
            before.version,
            before.dirty,
            after.version
        );
        Ok(ResultReporter::forced(after))
    }

    /// Drop every schema object
    ///
    /// `force` is the caller's confirmation; without it nothing is touched.
    ///
    /// # Errors
    ///
    /// Returns `DropNotConfirmed`, `DirtyState`, or any executor error.
    pub fn drop(&self, force: bool) -> Result<MigrationResult, MigrationError> {
        if !force {
            return Err(MigrationError::DropNotConfirmed);
        }
        self.tracker().current_clean()?;

        self.executor.drop_all()?;
        let after = self.tracker().current()?;

        log::warn!("Dropped all schema objects");
        Ok(ResultReporter::dropped(after))
    }

    /// Allocate the next migration pair
    ///
    /// Returns descriptors only; writing the files is up to the file source
    /// (see [`DirectorySource::persist`]).
    ///
    /// # Errors
    ///
    /// Returns `InvalidName`, `DuplicateVersion`, or `Catalog`.
    pub fn create(
        &self,
        name: &str,
        scheme: VersioningScheme,
        extension: &str,
    ) -> Result<NewMigration, MigrationError> {
        let slug = normalize_name(name)?;
        let extension = match extension.trim().trim_start_matches('.') {
            "" => DEFAULT_EXTENSION,
            ext if ext.chars().all(|c| c.is_ascii_alphanumeric()) => ext,
            other => {
                return Err(MigrationError::InvalidName(format!(
                    "{} (extension '{}')",
                    name, other
                )))
            }
        };

        let set = self.list()?;
        let version = scheme.next_version(set.max_version(), Utc::now())?;
        if set.iter().any(|m| m.version == version) {
            return Err(MigrationError::DuplicateVersion(version));
        }

        let created = NewMigration::new(version, &slug, extension);
        log::info!(
            "Allocated migration {} / {}",
            created.up.file_name(),
            created.down.file_name()
        );
        Ok(created)
    }

    /// Read state (refusing dirty), then the catalog, then build a plan
    fn prepare<F>(&self, plan: F) -> Result<(MigrationPlan, DatabaseState), MigrationError>
    where
        F: FnOnce(&MigrationSet, &DatabaseState) -> Result<MigrationPlan, MigrationError>,
    {
        let state = self.tracker().current_clean()?;
        let set = self.catalog.list()?;
        let plan = plan(&set, &state)?;
        Ok((plan, state))
    }

    /// Run `plan` step by step, re-reading state after every step
    fn execute(&self, operation: Operation, plan: &MigrationPlan, initial: DatabaseState) -> MigrationResult {
        if plan.is_empty() {
            log::debug!("{}: nothing to do at version {:?}", operation, initial.version);
            return ResultReporter::completed(operation, plan, initial);
        }

        log::info!(
            "{}: running {} {} step(s) from version {:?}",
            operation,
            plan.len(),
            plan.direction,
            initial.version
        );

        let tracker = self.tracker();
        let mut observed = initial;

        for (applied, step) in plan.steps.iter().enumerate() {
            if let Err(error) = observed.ensure_clean() {
                return ResultReporter::halted(operation, plan, applied, observed.version, Some(observed), error);
            }
            let last_confirmed = observed.version;

            #[cfg(feature = "tracing")]
            let _span = tracing_helpers::step_span(&step.migration).entered();

            log::debug!("Applying {}", step.migration);
            let start = Instant::now();

            let reported = match self.executor.apply_step(&step.migration) {
                Ok(reported) => reported,
                Err(error) => {
                    Self::record_step(plan, start, false);
                    log::warn!("{}: step {} failed: {}", operation, step.migration, error);
                    let after = tracker.current().ok();
                    return ResultReporter::halted(operation, plan, applied, last_confirmed, after, error);
                }
            };

            observed = match tracker.current() {
                Ok(state) => state,
                Err(error) => {
                    Self::record_step(plan, start, false);
                    log::warn!(
                        "{}: could not re-read state after {}: {}",
                        operation,
                        step.migration,
                        error
                    );
                    return ResultReporter::halted(operation, plan, applied, last_confirmed, None, error);
                }
            };

            if observed != reported {
                log::debug!(
                    "Executor reported {:?}, database reports {:?}; trusting the database",
                    reported,
                    observed
                );
            }

            if observed.dirty || observed.version != step.expected {
                Self::record_step(plan, start, false);
                let error = MigrationError::StateMismatch {
                    expected: step.expected,
                    observed: observed.version,
                    dirty: observed.dirty,
                };
                log::warn!("{}: halting after {}: {}", operation, step.migration, error);
                return ResultReporter::halted(operation, plan, applied, last_confirmed, Some(observed), error);
            }

            Self::record_step(plan, start, true);
        }

        log::info!("{}: now at version {:?}", operation, observed.version);
        ResultReporter::completed(operation, plan, observed)
    }

    #[allow(unused_variables)]
    fn record_step(plan: &MigrationPlan, start: Instant, succeeded: bool) {
        #[cfg(feature = "metrics")]
        METRICS.record_step(plan.direction, start.elapsed(), succeeded);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::{Direction, StaticSource};
    use crate::mock::{Failure, MockExecutor};

    fn files(versions: &[i64]) -> StaticSource {
        let names: Vec<String> = versions
            .iter()
            .flat_map(|v| {
                [
                    format!("{:06}_m{}.up.sql", v, v),
                    format!("{:06}_m{}.down.sql", v, v),
                ]
            })
            .collect();
        StaticSource::from_file_names(names)
    }

    fn migrator(versions: &[i64], executor: &MockExecutor) -> Migrator {
        Migrator::new(MigrateConfig::default(), files(versions), executor.clone())
    }

    #[test]
    fn test_up_applies_all_pending_in_order() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let result = migrator(&[1, 2, 3], &executor).up(None).unwrap();

        assert!(result.success);
        assert_eq!(result.steps_applied, 3);
        assert_eq!(result.version, Some(3));
        let applied: Vec<i64> = executor.applied().iter().map(|m| m.version).collect();
        assert_eq!(applied, vec![1, 2, 3]);
    }

    #[test]
    fn test_each_step_is_followed_by_a_state_read() {
        let executor = MockExecutor::new(DatabaseState::nil());
        migrator(&[1, 2], &executor).up(None).unwrap();
        // one pre-flight read plus one per step
        assert_eq!(executor.status_queries(), 3);
    }

    #[test]
    fn test_up_refuses_dirty_database() {
        let executor = MockExecutor::new(DatabaseState::dirty(1));
        let err = migrator(&[1, 2], &executor).up(None).unwrap_err();

        assert_eq!(err, MigrationError::DirtyState { version: Some(1) });
        assert!(executor.applied().is_empty());
        assert_eq!(executor.state(), DatabaseState::dirty(1));
    }

    #[test]
    fn test_halts_when_executor_reports_success_but_leaves_dirty() {
        let executor = MockExecutor::new(DatabaseState::nil())
            .fail_on(2, Direction::Up, Failure::SilentDirty);
        let result = migrator(&[1, 2, 3], &executor).up(None).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps_applied, 1);
        assert!(result.dirty);
        assert!(matches!(
            result.error,
            Some(MigrationError::StateMismatch { dirty: true, .. })
        ));
        assert_eq!(executor.applied().len(), 2);
    }

    #[test]
    fn test_halts_on_unexpected_version() {
        let executor = MockExecutor::new(DatabaseState::nil())
            .fail_on(1, Direction::Up, Failure::WrongVersion(Some(7)));
        let result = migrator(&[1, 2], &executor).up(None).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps_applied, 0);
        assert_eq!(
            result.error,
            Some(MigrationError::StateMismatch {
                expected: Some(1),
                observed: Some(7),
                dirty: false
            })
        );
    }

    #[test]
    fn test_lock_timeout_is_surfaced_not_retried() {
        let executor = MockExecutor::new(DatabaseState::clean(1))
            .fail_on(2, Direction::Up, Failure::LockTimeout);
        let result = migrator(&[1, 2], &executor).up(None).unwrap();

        assert!(!result.success);
        assert_eq!(result.steps_applied, 0);
        assert!(!result.dirty);
        assert!(result.error.as_ref().is_some_and(MigrationError::is_retryable));
        assert!(executor.applied().is_empty());
    }

    #[test]
    fn test_version_on_fresh_database() {
        let executor = MockExecutor::new(DatabaseState::nil());
        assert_eq!(
            migrator(&[1], &executor).version(),
            Err(MigrationError::NoMigrationsApplied)
        );
        executor.set_state(DatabaseState::clean(0));
        assert_eq!(migrator(&[1], &executor).version(), Ok(0));
    }

    #[test]
    fn test_force_bypasses_dirty_and_runs_no_sql() {
        let executor = MockExecutor::new(DatabaseState::dirty(2));
        let result = migrator(&[1, 2], &executor).force(2).unwrap();

        assert!(result.success);
        assert_eq!(result.version, Some(2));
        assert!(!result.dirty);
        assert!(executor.applied().is_empty());
        assert_eq!(executor.forced(), vec![Some(2)]);
    }

    #[test]
    fn test_force_nil_and_invalid() {
        let executor = MockExecutor::new(DatabaseState::clean(2));
        let m = migrator(&[1, 2], &executor);
        assert_eq!(m.force(-1).unwrap().version, None);
        assert_eq!(m.force(-2), Err(MigrationError::InvalidVersion(-2)));
    }

    #[test]
    fn test_drop_requires_confirmation() {
        let executor = MockExecutor::new(DatabaseState::clean(2));
        let m = migrator(&[1, 2], &executor);

        assert_eq!(m.drop(false), Err(MigrationError::DropNotConfirmed));
        assert_eq!(executor.drops(), 0);

        let result = m.drop(true).unwrap();
        assert!(result.success);
        assert_eq!(result.version, None);
        assert_eq!(executor.drops(), 1);
    }

    #[test]
    fn test_drop_refused_while_dirty() {
        let executor = MockExecutor::new(DatabaseState::dirty(2));
        let err = migrator(&[1, 2], &executor).drop(true).unwrap_err();
        assert_eq!(err, MigrationError::DirtyState { version: Some(2) });
        assert_eq!(executor.drops(), 0);
    }

    #[test]
    fn test_create_sequential_after_highest() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let created = migrator(&[1, 2], &executor)
            .create("add users", VersioningScheme::Sequential, "sql")
            .unwrap();

        assert_eq!(created.version, 3);
        assert_eq!(created.name, "add_users");
        assert_eq!(created.up.file_name(), "000003_add_users.up.sql");
        assert_eq!(created.down.file_name(), "000003_add_users.down.sql");
    }

    #[test]
    fn test_create_on_empty_catalog_and_custom_extension() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let created = migrator(&[], &executor)
            .create("init", VersioningScheme::Sequential, ".go")
            .unwrap();
        assert_eq!(created.version, 1);
        assert_eq!(created.up.extension, "go");
    }

    #[test]
    fn test_create_timestamp_version() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let created = migrator(&[1], &executor)
            .create("init", VersioningScheme::Timestamp, "")
            .unwrap();
        assert!(crate::migration::is_timestamp_version(created.version));
        assert_eq!(created.up.extension, "sql");
    }

    #[test]
    fn test_create_rejects_bad_input() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let m = migrator(&[1], &executor);
        assert!(matches!(
            m.create("", VersioningScheme::Sequential, "sql"),
            Err(MigrationError::InvalidName(_))
        ));
        assert!(matches!(
            m.create("init", VersioningScheme::Sequential, "s/q"),
            Err(MigrationError::InvalidName(_))
        ));
    }

    #[test]
    fn test_plan_is_a_dry_run() {
        let executor = MockExecutor::new(DatabaseState::clean(1));
        let plan = migrator(&[1, 2, 3], &executor).plan_up(None).unwrap();
        assert_eq!(plan.len(), 2);
        assert!(executor.applied().is_empty());
        assert_eq!(executor.state(), DatabaseState::clean(1));
    }

    #[test]
    fn test_validate_uses_configured_scheme() {
        let executor = MockExecutor::new(DatabaseState::nil());
        let result = migrator(&[1, 3], &executor).validate().unwrap();
        assert_eq!(result.gaps, vec![2]);
        assert!(!result.valid);
    }
}
