//! In-process migration execution helpers

use crate::migration::{MigrationError, Migrator};

/// Run migrations on application startup
///
/// Intended to be called during application initialization. It:
/// - Logs catalog problems found by validation (gaps, missing Down files)
/// - Applies every pending migration
/// - Fails fast if any step fails, so the application does not start on a
///   half-migrated schema
///
/// Concurrent instances are serialized by the executor's database lock; a
/// `LockTimeout` is returned as-is.
///
/// # Returns
///
/// Number of migrations applied.
///
/// # Example
///
/// ```rust,no_run
/// use stepwise::config::MigrateConfig;
/// use stepwise::migration::{startup_migrations, Migrator};
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let migrator = Migrator::from_config(MigrateConfig::load()?)?;
///
///     // Run migrations on startup
///     startup_migrations(&migrator)?;
///
///     // Continue with application startup...
///     Ok(())
/// }
/// ```
pub fn startup_migrations(migrator: &Migrator) -> Result<usize, MigrationError> {
    let validation = migrator.validate()?;
    if !validation.valid {
        log::warn!(
            "Migration catalog has issues: gaps={:?} missing_down={} duplicates={}",
            validation.gaps,
            validation.missing_down_files.len(),
            validation.duplicates.len()
        );
    }

    let result = migrator.up(None)?;
    if !result.success {
        log::error!("{}", result.message);
        return Err(result.error.unwrap_or(MigrationError::StateMismatch {
            expected: None,
            observed: result.version,
            dirty: result.dirty,
        }));
    }

    if result.steps_applied > 0 {
        log::info!("Applied {} migration(s) on startup", result.steps_applied);
    } else {
        log::debug!("No pending migrations to apply");
    }

    Ok(result.steps_applied)
}
