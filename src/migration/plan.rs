//! Step planning: the exact sequence of single-version steps for an operation
//!
//! Plans are computed and checked against the `MigrationSet` before anything runs,
//! so an unknown target or a missing Down file is reported up front instead of
//! being discovered half-way through a batch.

use crate::migration::{Direction, Migration, MigrationError, MigrationSet};
use serde::Serialize;

/// How many Down steps to apply
///
/// No default exists; callers choose between a count and everything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownSteps {
    /// Roll back at most this many applied migrations
    Count(usize),
    /// Roll back every applied migration
    All,
}

/// One step of a plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    /// The file to execute
    pub migration: Migration,
    /// Version the database must report once the step succeeded
    pub expected: Option<i64>,
}

/// Ordered steps from the current version towards a target
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationPlan {
    pub direction: Direction,
    /// Version observed when the plan was made
    pub from: Option<i64>,
    pub steps: Vec<PlannedStep>,
}

impl MigrationPlan {
    fn empty(direction: Direction, from: Option<i64>) -> Self {
        Self {
            direction,
            from,
            steps: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Version the database reaches if every step succeeds
    pub fn target(&self) -> Option<i64> {
        self.steps.last().map_or(self.from, |step| step.expected)
    }
}

/// Plan up to `steps` pending Up migrations above `current` (all when `None`)
///
/// # Errors
///
/// Returns `MigrationError::InvalidSteps` for `Some(0)`.
pub fn plan_up(
    set: &MigrationSet,
    current: Option<i64>,
    steps: Option<usize>,
) -> Result<MigrationPlan, MigrationError> {
    if steps == Some(0) {
        return Err(MigrationError::InvalidSteps(0));
    }

    let pending = set
        .up_versions()
        .into_iter()
        .filter(|v| current.map_or(true, |c| *v > c));

    let limited: Vec<i64> = match steps {
        Some(n) => pending.take(n).collect(),
        None => pending.collect(),
    };

    up_steps(set, current, &limited)
}

/// Plan Down migrations from `current` downward
///
/// # Errors
///
/// - `MigrationError::InvalidSteps` for `DownSteps::Count(0)`.
/// - `MigrationError::UnknownVersion` if `current` has no migration entry.
/// - `MigrationError::MissingDownFile` if any step lacks its Down file.
pub fn plan_down(
    set: &MigrationSet,
    current: Option<i64>,
    steps: DownSteps,
) -> Result<MigrationPlan, MigrationError> {
    if steps == DownSteps::Count(0) {
        return Err(MigrationError::InvalidSteps(0));
    }

    let Some(current_version) = current else {
        return Ok(MigrationPlan::empty(Direction::Down, None));
    };
    // Version 0 is what `force 0` records: nothing applied, nothing to roll back
    if current_version == 0 && !set.contains_version(0) {
        return Ok(MigrationPlan::empty(Direction::Down, current));
    }
    if !set.contains_version(current_version) {
        return Err(MigrationError::UnknownVersion(current_version));
    }

    let applied = set
        .up_versions()
        .into_iter()
        .rev()
        .filter(|v| *v <= current_version);

    let limited: Vec<i64> = match steps {
        DownSteps::Count(n) => applied.take(n).collect(),
        DownSteps::All => applied.collect(),
    };

    down_steps(set, current, &limited)
}

/// Plan the walk from `current` to `target`, up or down
///
/// # Errors
///
/// - `MigrationError::UnknownVersion` if `target` (or, when walking down, `current`)
///   has no migration entry.
/// - `MigrationError::MissingDownFile` if a Down step lacks its file.
pub fn plan_goto(
    set: &MigrationSet,
    current: Option<i64>,
    target: i64,
) -> Result<MigrationPlan, MigrationError> {
    if current == Some(target) {
        return Ok(MigrationPlan::empty(Direction::Up, current));
    }
    if !set.contains_version(target) {
        return Err(MigrationError::UnknownVersion(target));
    }

    match current {
        Some(c) if target < c => {
            if !set.contains_version(c) {
                return Err(MigrationError::UnknownVersion(c));
            }
            let versions: Vec<i64> = set
                .up_versions()
                .into_iter()
                .rev()
                .filter(|v| *v <= c && *v > target)
                .collect();
            down_steps(set, current, &versions)
        }
        _ => {
            let versions: Vec<i64> = set
                .up_versions()
                .into_iter()
                .filter(|v| current.map_or(true, |c| *v > c) && *v <= target)
                .collect();
            up_steps(set, current, &versions)
        }
    }
}

fn up_steps(
    set: &MigrationSet,
    current: Option<i64>,
    versions: &[i64],
) -> Result<MigrationPlan, MigrationError> {
    let steps = versions
        .iter()
        .map(|v| {
            let migration = set
                .find(*v, Direction::Up)
                .ok_or(MigrationError::UnknownVersion(*v))?;
            Ok(PlannedStep {
                migration: migration.clone(),
                expected: Some(*v),
            })
        })
        .collect::<Result<Vec<_>, MigrationError>>()?;

    Ok(MigrationPlan {
        direction: Direction::Up,
        from: current,
        steps,
    })
}

fn down_steps(
    set: &MigrationSet,
    current: Option<i64>,
    versions: &[i64],
) -> Result<MigrationPlan, MigrationError> {
    let steps = versions
        .iter()
        .map(|v| {
            let up = set
                .find(*v, Direction::Up)
                .ok_or(MigrationError::UnknownVersion(*v))?;
            let migration = set
                .by_direction(Direction::Down)
                .find(|m| m.version == *v && m.name == up.name)
                .ok_or_else(|| MigrationError::MissingDownFile {
                    version: *v,
                    name: up.name.clone(),
                })?;
            Ok(PlannedStep {
                migration: migration.clone(),
                expected: set.prev_version(*v),
            })
        })
        .collect::<Result<Vec<_>, MigrationError>>()?;

    Ok(MigrationPlan {
        direction: Direction::Down,
        from: current,
        steps,
    })
}
