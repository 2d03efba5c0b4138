//! Structural validation of a `MigrationSet`
//!
//! Pure functions over the catalog; no database access, so integrity can be
//! checked in CI before any deployment.

use crate::migration::{Direction, MigrationSet, VersioningScheme};
use serde::Serialize;
use std::collections::BTreeMap;

/// Most missing versions a single validation reports
pub const MAX_REPORTED_GAPS: usize = 1000;

/// An Up migration without a matching Down
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingDownFile {
    pub version: i64,
    pub name: String,
}

/// A version used more than once within one direction
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateVersion {
    pub version: i64,
    pub direction: Direction,
    pub names: Vec<String>,
}

/// Result of migration validation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// No defect of any kind
    pub valid: bool,
    /// Number of distinct Up versions
    pub total_migrations: usize,
    /// Missing versions between the lowest and highest Up version, lowest first and
    /// at most `MAX_REPORTED_GAPS` of them
    pub gaps: Vec<i64>,
    /// Up migrations without a Down of the same version and name
    pub missing_down_files: Vec<MissingDownFile>,
    /// Versions listed twice in the same direction
    pub duplicates: Vec<DuplicateVersion>,
    /// Versions that do not fit the numbering scheme
    pub mixed_versions: Vec<i64>,
}

impl ValidationResult {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }

    pub fn has_missing_down_files(&self) -> bool {
        !self.missing_down_files.is_empty()
    }
}

/// Validates a migration set against one numbering scheme
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    scheme: VersioningScheme,
}

impl Default for Validator {
    fn default() -> Self {
        Self::new(VersioningScheme::Sequential)
    }
}

impl Validator {
    pub fn new(scheme: VersioningScheme) -> Self {
        Self { scheme }
    }

    /// Inspect `set` for gaps, unpaired Up files, duplicates and mixed numbering
    pub fn validate(&self, set: &MigrationSet) -> ValidationResult {
        let up_versions = set.up_versions();

        let mixed_versions: Vec<i64> = up_versions
            .iter()
            .copied()
            .filter(|v| !self.scheme.accepts(*v))
            .collect();

        // Timestamp versions are sparse; gaps are computed for sequential numbers only
        let gaps = match self.scheme {
            VersioningScheme::Sequential => {
                let in_scheme: Vec<i64> = up_versions
                    .iter()
                    .copied()
                    .filter(|v| self.scheme.accepts(*v))
                    .collect();
                find_gaps(&in_scheme)
            }
            VersioningScheme::Timestamp => Vec::new(),
        };

        let missing_down_files = find_missing_down_files(set);
        let duplicates = find_duplicates(set);

        let valid = gaps.is_empty()
            && missing_down_files.is_empty()
            && duplicates.is_empty()
            && mixed_versions.is_empty();

        ValidationResult {
            valid,
            total_migrations: up_versions.len(),
            gaps,
            missing_down_files,
            duplicates,
            mixed_versions,
        }
    }
}

/// Validate with sequential numbering
pub fn validate(set: &MigrationSet) -> ValidationResult {
    Validator::default().validate(set)
}

/// Integers strictly between adjacent entries of a sorted, distinct slice
///
/// Stops after `MAX_REPORTED_GAPS` values.
pub fn find_gaps(sorted_versions: &[i64]) -> Vec<i64> {
    sorted_versions
        .windows(2)
        .flat_map(|pair| (pair[0] + 1)..pair[1])
        .take(MAX_REPORTED_GAPS)
        .collect()
}

fn find_missing_down_files(set: &MigrationSet) -> Vec<MissingDownFile> {
    let mut missing: Vec<MissingDownFile> = set
        .by_direction(Direction::Up)
        .filter(|up| {
            !set.by_direction(Direction::Down)
                .any(|down| down.version == up.version && down.name == up.name)
        })
        .map(|up| MissingDownFile {
            version: up.version,
            name: up.name.clone(),
        })
        .collect();
    missing.dedup();
    missing
}

fn find_duplicates(set: &MigrationSet) -> Vec<DuplicateVersion> {
    let mut seen: BTreeMap<(i64, Direction), Vec<String>> = BTreeMap::new();
    for migration in set {
        seen.entry((migration.version, migration.direction))
            .or_default()
            .push(migration.name.clone());
    }

    seen.into_iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|((version, direction), names)| DuplicateVersion {
            version,
            direction,
            names,
        })
        .collect()
}
