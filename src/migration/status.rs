//! Result and status objects returned to callers
//!
//! The builders here are mechanical: they never decide anything, they only record
//! what the engine observed.

use crate::migration::{DatabaseState, Direction, MigrationError, MigrationPlan};
use serde::{Serialize, Serializer};
use std::fmt;

/// Public operation that produced a result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Up,
    Down,
    Goto,
    Force,
    Drop,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Up => "up",
            Operation::Down => "down",
            Operation::Goto => "goto",
            Operation::Force => "force",
            Operation::Drop => "drop",
        };
        f.write_str(name)
    }
}

/// Outcome of a state-changing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationResult {
    pub operation: Operation,
    /// Every planned step succeeded
    pub success: bool,
    /// Version observed after the operation (`None`: no migration applied)
    pub version: Option<i64>,
    /// Direction of the executed steps, if any step was planned
    pub direction: Option<Direction>,
    /// Steps that completed and were confirmed by the database
    pub steps_applied: usize,
    /// Dirty flag observed after the operation
    pub dirty: bool,
    pub message: String,
    /// Error that halted the batch
    #[serde(serialize_with = "serialize_error")]
    pub error: Option<MigrationError>,
}

impl MigrationResult {
    pub fn is_success(&self) -> bool {
        self.success
    }
}

fn serialize_error<S: Serializer>(
    error: &Option<MigrationError>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match error {
        Some(e) => serializer.serialize_some(&e.to_string()),
        None => serializer.serialize_none(),
    }
}

/// Current database migration information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DatabaseInfo {
    pub version: Option<i64>,
    pub dirty: bool,
}

impl DatabaseInfo {
    pub fn is_clean(&self) -> bool {
        !self.dirty
    }
}

impl From<DatabaseState> for DatabaseInfo {
    fn from(state: DatabaseState) -> Self {
        Self {
            version: state.version,
            dirty: state.dirty,
        }
    }
}

/// Builds [`MigrationResult`] and [`DatabaseInfo`] values
pub struct ResultReporter;

impl ResultReporter {
    /// Every step of `plan` ran and was confirmed
    pub fn completed(operation: Operation, plan: &MigrationPlan, state: DatabaseState) -> MigrationResult {
        let message = match (operation, plan.is_empty()) {
            (Operation::Goto, true) => format!("Already at version {}", describe(state.version)),
            (_, true) => "No migrations to apply".to_string(),
            (Operation::Goto, false) => format!("Migrated to version {}", describe(state.version)),
            (_, false) if plan.direction == Direction::Down => {
                format!("Rolled back {} migration(s) successfully", plan.len())
            }
            (_, false) => format!("Applied {} migration(s) successfully", plan.len()),
        };

        MigrationResult {
            operation,
            success: true,
            version: state.version,
            direction: (!plan.is_empty()).then_some(plan.direction),
            steps_applied: plan.len(),
            dirty: state.dirty,
            message,
            error: None,
        }
    }

    /// The batch stopped at a failing step
    ///
    /// `state` is the state observed after the failure; when the database could
    /// not even be re-read, the last confirmed version is reported as dirty since
    /// nothing is known about the failed step.
    pub fn halted(
        operation: Operation,
        plan: &MigrationPlan,
        steps_applied: usize,
        last_confirmed: Option<i64>,
        state: Option<DatabaseState>,
        error: MigrationError,
    ) -> MigrationResult {
        let state = state.unwrap_or(DatabaseState::new(last_confirmed, true));
        let failed_version = plan
            .steps
            .get(steps_applied)
            .map(|s| s.migration.version);

        let message = match failed_version {
            Some(v) => format!(
                "{} halted at version {} after {} step(s): {}",
                operation, v, steps_applied, error
            ),
            None => format!("{} failed after {} step(s): {}", operation, steps_applied, error),
        };

        MigrationResult {
            operation,
            success: false,
            version: state.version,
            direction: Some(plan.direction),
            steps_applied,
            dirty: state.dirty,
            message,
            error: Some(error),
        }
    }

    /// Version overwritten without running SQL
    pub fn forced(state: DatabaseState) -> MigrationResult {
        MigrationResult {
            operation: Operation::Force,
            success: true,
            version: state.version,
            direction: None,
            steps_applied: 0,
            dirty: state.dirty,
            message: format!("Forced version to {}", describe(state.version)),
            error: None,
        }
    }

    /// Schema dropped
    pub fn dropped(state: DatabaseState) -> MigrationResult {
        MigrationResult {
            operation: Operation::Drop,
            success: true,
            version: state.version,
            direction: None,
            steps_applied: 0,
            dirty: state.dirty,
            message: "Database dropped successfully".to_string(),
            error: None,
        }
    }

    pub fn info(state: DatabaseState) -> DatabaseInfo {
        DatabaseInfo::from(state)
    }
}

fn describe(version: Option<i64>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}
