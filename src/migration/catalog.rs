//! Migration catalog: raw listings parsed into an ordered `MigrationSet`

use crate::migration::{Direction, FileSource, Migration, MigrationError, RawEntry, DEFAULT_EXTENSION};
use serde::Serialize;
use std::collections::BTreeSet;

/// Ordered, immutable view of every migration file
///
/// Sorted ascending by version, Up before Down at the same version. Duplicate
/// versions within one direction are kept so validation can report them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MigrationSet {
    migrations: Vec<Migration>,
}

impl MigrationSet {
    /// Build a set from migrations in any order
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        migrations.sort_by(|a, b| {
            a.version
                .cmp(&b.version)
                .then(a.direction.cmp(&b.direction))
                .then_with(|| a.name.cmp(&b.name))
        });
        Self { migrations }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    /// All migrations of one direction, ascending by version
    pub fn by_direction(&self, direction: Direction) -> impl Iterator<Item = &Migration> {
        self.migrations.iter().filter(move |m| m.direction == direction)
    }

    /// Distinct Up versions, ascending
    pub fn up_versions(&self) -> Vec<i64> {
        self.by_direction(Direction::Up)
            .map(|m| m.version)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// First migration with this version and direction
    pub fn find(&self, version: i64, direction: Direction) -> Option<&Migration> {
        self.migrations
            .iter()
            .find(|m| m.version == version && m.direction == direction)
    }

    /// Whether an Up migration exists for `version`
    pub fn contains_version(&self, version: i64) -> bool {
        self.find(version, Direction::Up).is_some()
    }

    /// Highest version of either direction
    pub fn max_version(&self) -> Option<i64> {
        self.migrations.iter().map(|m| m.version).max()
    }

    /// Highest Up version strictly below `version`
    pub fn prev_version(&self, version: i64) -> Option<i64> {
        self.by_direction(Direction::Up)
            .map(|m| m.version)
            .filter(|v| *v < version)
            .max()
    }
}

impl<'a> IntoIterator for &'a MigrationSet {
    type Item = &'a Migration;
    type IntoIter = std::slice::Iter<'a, Migration>;

    fn into_iter(self) -> Self::IntoIter {
        self.migrations.iter()
    }
}

/// Parses a file source's listing into a [`MigrationSet`]
///
/// Nothing is cached: every `list()` reads the source again.
pub struct MigrationCatalog<S> {
    source: S,
}

impl<S: FileSource> MigrationCatalog<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Read the source and build the ordered migration set
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Catalog` if the source is unreadable or any entry
    /// is malformed. Malformed entries are never skipped.
    pub fn list(&self) -> Result<MigrationSet, MigrationError> {
        let entries = self.source.list_entries()?;
        let migrations = entries
            .iter()
            .map(parse_entry)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(MigrationSet::new(migrations))
    }
}

/// Turn one raw entry into a `Migration`
///
/// # Errors
///
/// Returns `MigrationError::Catalog` for a non-integer or zero version token, an
/// empty name, or an unknown direction marker.
pub fn parse_entry(entry: &RawEntry) -> Result<Migration, MigrationError> {
    let describe = || {
        format!(
            "{}_{}.{}.{}",
            entry.version, entry.name, entry.direction, entry.extension
        )
    };

    if entry.version.is_empty() || !entry.version.bytes().all(|b| b.is_ascii_digit()) {
        return Err(MigrationError::Catalog(format!(
            "Migration '{}' has a non-numeric version prefix '{}'",
            describe(),
            entry.version
        )));
    }

    let version = entry.version.parse::<i64>().map_err(|e| {
        MigrationError::Catalog(format!(
            "Migration '{}' has an out-of-range version '{}': {}",
            describe(),
            entry.version,
            e
        ))
    })?;

    if version == 0 {
        return Err(MigrationError::Catalog(format!(
            "Migration '{}' has version 0; versions start at 1",
            describe()
        )));
    }

    if entry.name.is_empty() {
        return Err(MigrationError::Catalog(format!(
            "Migration '{}' is missing a name after the version prefix",
            describe()
        )));
    }

    let direction = Direction::parse(&entry.direction).ok_or_else(|| {
        MigrationError::Catalog(format!(
            "Migration '{}' has unknown direction '{}' (expected up or down)",
            describe(),
            entry.direction
        ))
    })?;

    let extension = if entry.extension.is_empty() {
        DEFAULT_EXTENSION
    } else {
        entry.extension.as_str()
    };

    Ok(Migration::new(version, entry.name.clone(), direction, extension))
}
