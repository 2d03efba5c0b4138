//! End-to-end engine behaviour against the in-memory executor

use std::fs;
use std::path::Path;
use stepwise::config::MigrateConfig;
use stepwise::migration::{
    validate, DatabaseState, Direction, DirectorySource, DownSteps, MigrationCatalog,
    MigrationError, Migrator, StaticSource,
};
use stepwise::mock::{Failure, MockExecutor};
use tempfile::TempDir;

fn write_pair(dir: &Path, version: i64, name: &str) {
    fs::write(
        dir.join(format!("{:06}_{}.up.sql", version, name)),
        format!("-- up {}\n", name),
    )
    .unwrap();
    fs::write(
        dir.join(format!("{:06}_{}.down.sql", version, name)),
        format!("-- down {}\n", name),
    )
    .unwrap();
}

fn pairs(versions: &[i64]) -> StaticSource {
    StaticSource::from_file_names(versions.iter().flat_map(|v| {
        [
            format!("{:06}_step{}.up.sql", v, v),
            format!("{:06}_step{}.down.sql", v, v),
        ]
    }))
}

fn migrator(source: StaticSource, executor: &MockExecutor) -> Migrator {
    Migrator::new(MigrateConfig::default(), source, executor.clone())
}

#[test]
fn test_gap_between_init_and_add_idx() {
    let temp_dir = TempDir::new().unwrap();
    write_pair(temp_dir.path(), 1, "init");
    write_pair(temp_dir.path(), 3, "add_idx");

    let set = MigrationCatalog::new(DirectorySource::new(temp_dir.path()))
        .list()
        .unwrap();
    let result = validate(&set);

    assert_eq!(result.gaps, vec![2]);
    assert!(result.missing_down_files.is_empty());
    assert_eq!(result.total_migrations, 2);
    assert!(!result.valid);
}

#[test]
fn test_validate_with_malformed_timestamp_directory() {
    let temp_dir = TempDir::new().unwrap();
    write_pair(temp_dir.path(), 1, "init");
    write_pair(temp_dir.path(), 20241340120000, "bad_ts");
    write_pair(temp_dir.path(), 100_000_000_000_000, "too_long");

    let migrator = Migrator::new(
        MigrateConfig::new("sqlite3://test.db", temp_dir.path()),
        DirectorySource::new(temp_dir.path()),
        MockExecutor::new(DatabaseState::nil()),
    );
    let result = migrator.validate().unwrap();

    assert!(result.gaps.is_empty());
    assert_eq!(result.mixed_versions, vec![20241340120000, 100_000_000_000_000]);
    assert_eq!(result.total_migrations, 3);
    assert!(!result.valid);
}

#[test]
fn test_up_from_fresh_database() {
    let temp_dir = TempDir::new().unwrap();
    write_pair(temp_dir.path(), 1, "init");

    let executor = MockExecutor::new(DatabaseState::nil());
    let migrator = Migrator::new(
        MigrateConfig::new("sqlite3://test.db", temp_dir.path()),
        DirectorySource::new(temp_dir.path()),
        executor.clone(),
    );

    let result = migrator.up(None).unwrap();
    assert!(result.success);
    assert_eq!(result.steps_applied, 1);
    assert_eq!(result.version, Some(1));

    let info = migrator.status().unwrap();
    assert_eq!(info.version, Some(1));
    assert!(!info.dirty);
}

#[test]
fn test_failure_mid_batch_then_force() {
    let executor = MockExecutor::new(DatabaseState::clean(0))
        .fail_on(2, Direction::Up, Failure::Sql("relation already exists".into()));
    let migrator = migrator(pairs(&[1, 2, 3]), &executor);

    let result = migrator.up(Some(3)).unwrap();
    assert!(!result.success);
    assert_eq!(result.steps_applied, 1);
    assert!(result.dirty);
    assert!(matches!(
        result.error,
        Some(MigrationError::ExecutionFailed { version: 2, .. })
    ));
    assert!(result.message.contains("halted at version 2"));
    assert_eq!(executor.state(), DatabaseState::dirty(2));

    // Version 3 was never attempted
    let attempted: Vec<i64> = executor.applied().iter().map(|m| m.version).collect();
    assert_eq!(attempted, vec![1, 2]);

    assert_eq!(
        migrator.up(None).unwrap_err(),
        MigrationError::DirtyState { version: Some(2) }
    );

    let forced = migrator.force(2).unwrap();
    assert!(forced.success);
    assert_eq!(executor.state(), DatabaseState::clean(2));
    assert_eq!(executor.applied().len(), 2);

    executor.clear_failure(2, Direction::Up);
    let resumed = migrator.up(None).unwrap();
    assert!(resumed.success);
    assert_eq!(resumed.steps_applied, 1);
    assert_eq!(resumed.version, Some(3));
}

#[test]
fn test_up_then_down_restores_version() {
    for k in 1..=4 {
        let executor = MockExecutor::new(DatabaseState::clean(1)).with_versions([1]);
        let migrator = migrator(pairs(&[1, 2, 3, 4, 5]), &executor);

        let up = migrator.up(Some(k)).unwrap();
        assert!(up.success);
        assert_eq!(up.steps_applied, k);

        let down = migrator.down(DownSteps::Count(k)).unwrap();
        assert!(down.success);
        assert_eq!(down.steps_applied, k);
        assert_eq!(executor.state(), DatabaseState::clean(1), "k = {}", k);
    }
}

#[test]
fn test_down_all_reaches_nil() {
    let executor = MockExecutor::new(DatabaseState::nil());
    let migrator = migrator(pairs(&[1, 2, 3]), &executor);
    migrator.up(None).unwrap();

    let result = migrator.down(DownSteps::All).unwrap();
    assert!(result.success);
    assert_eq!(result.steps_applied, 3);
    assert_eq!(result.version, None);
    assert_eq!(migrator.version(), Err(MigrationError::NoMigrationsApplied));

    let rolled_back: Vec<i64> = executor
        .applied()
        .iter()
        .filter(|m| m.direction == Direction::Down)
        .map(|m| m.version)
        .collect();
    assert_eq!(rolled_back, vec![3, 2, 1]);
}

#[test]
fn test_down_after_force_zero_is_a_no_op() {
    let executor = MockExecutor::new(DatabaseState::nil());
    let migrator = migrator(pairs(&[1, 2]), &executor);
    migrator.force(0).unwrap();

    let result = migrator.down(DownSteps::All).unwrap();
    assert!(result.success);
    assert_eq!(result.steps_applied, 0);
    assert_eq!(result.version, Some(0));
    assert!(executor.applied().is_empty());
}

#[test]
fn test_goto_current_is_idempotent() {
    let executor = MockExecutor::new(DatabaseState::clean(2)).with_versions([1, 2]);
    let migrator = migrator(pairs(&[1, 2, 3]), &executor);

    for _ in 0..2 {
        let result = migrator.goto(2).unwrap();
        assert!(result.success);
        assert_eq!(result.steps_applied, 0);
        assert_eq!(result.version, Some(2));
    }
    assert!(executor.applied().is_empty());
}

#[test]
fn test_goto_walks_both_directions() {
    let executor = MockExecutor::new(DatabaseState::nil());
    let migrator = migrator(pairs(&[1, 2, 3, 4]), &executor);

    let up = migrator.goto(3).unwrap();
    assert_eq!(up.direction, Some(Direction::Up));
    assert_eq!(up.steps_applied, 3);

    let down = migrator.goto(1).unwrap();
    assert_eq!(down.direction, Some(Direction::Down));
    assert_eq!(down.steps_applied, 2);
    assert_eq!(executor.state(), DatabaseState::clean(1));

    assert_eq!(migrator.goto(9).unwrap_err(), MigrationError::UnknownVersion(9));
}

#[test]
fn test_dirty_database_refuses_everything_but_force() {
    let executor = MockExecutor::new(DatabaseState::dirty(2)).with_versions([1, 2]);
    let migrator = migrator(pairs(&[1, 2, 3]), &executor);
    let dirty = MigrationError::DirtyState { version: Some(2) };

    assert_eq!(migrator.up(None).unwrap_err(), dirty);
    assert_eq!(migrator.up(Some(1)).unwrap_err(), dirty);
    assert_eq!(migrator.down(DownSteps::Count(1)).unwrap_err(), dirty);
    assert_eq!(migrator.down(DownSteps::All).unwrap_err(), dirty);
    assert_eq!(migrator.goto(3).unwrap_err(), dirty);
    assert_eq!(migrator.goto(2).unwrap_err(), dirty);
    assert_eq!(migrator.drop(true).unwrap_err(), dirty);

    assert!(executor.applied().is_empty());
    assert_eq!(executor.drops(), 0);
    assert_eq!(executor.state(), DatabaseState::dirty(2));

    // Reads still report the dirty state
    let info = migrator.status().unwrap();
    assert!(info.dirty);

    assert!(migrator.force(1).unwrap().success);
    assert_eq!(executor.state(), DatabaseState::clean(1));
}

#[test]
fn test_missing_down_file_fails_before_any_step() {
    let source = StaticSource::from_file_names([
        "000001_init.up.sql",
        "000001_init.down.sql",
        "000002_seed.up.sql",
    ]);
    let executor = MockExecutor::new(DatabaseState::nil());
    let migrator = migrator(source, &executor);
    migrator.up(None).unwrap();

    assert_eq!(
        migrator.down(DownSteps::All).unwrap_err(),
        MigrationError::MissingDownFile {
            version: 2,
            name: "seed".into()
        }
    );
    assert_eq!(executor.state(), DatabaseState::clean(2));
    assert_eq!(executor.applied().len(), 2);
}

#[test]
fn test_unreachable_database() {
    let executor = MockExecutor::new(DatabaseState::nil());
    executor.set_unreachable(true);
    let migrator = migrator(pairs(&[1]), &executor);

    assert!(matches!(migrator.up(None), Err(MigrationError::Connection(_))));
    assert!(matches!(migrator.status(), Err(MigrationError::Connection(_))));
}

#[test]
fn test_create_persists_next_pair() {
    let temp_dir = TempDir::new().unwrap();
    write_pair(temp_dir.path(), 1, "init");
    let source = DirectorySource::new(temp_dir.path());
    let migrator = Migrator::new(
        MigrateConfig::new("sqlite3://test.db", temp_dir.path()),
        source.clone(),
        MockExecutor::new(DatabaseState::nil()),
    );

    let created = migrator
        .create("add users", migrator.config().scheme(), "sql")
        .unwrap();
    let paths = source.persist(&created).unwrap();

    assert_eq!(paths.len(), 2);
    assert!(temp_dir.path().join("000002_add_users.up.sql").exists());
    assert!(temp_dir.path().join("000002_add_users.down.sql").exists());
    assert_eq!(migrator.list().unwrap().max_version(), Some(2));
    assert_eq!(
        source.persist(&created).unwrap_err(),
        MigrationError::DuplicateVersion(2)
    );
}
