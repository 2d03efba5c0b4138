//! Migration descriptors and version numbering

use crate::migration::MigrationError;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Serialize;
use std::fmt;

/// Extension used when an entry does not name one
pub const DEFAULT_EXTENSION: &str = "sql";

/// Width used for zero-padded sequential versions (`000001_init.up.sql`)
pub const SEQUENTIAL_WIDTH: usize = 6;

/// Format of timestamp versions (`20240120120000`)
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Smallest version with a timestamp-length (14 digit) token
const TIMESTAMP_LENGTH_FLOOR: i64 = 10_000_000_000_000;

/// Direction of a migration file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Apply the migration
    Up,
    /// Roll the migration back
    Down,
}

impl Direction {
    /// Token used in file names
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }

    /// Parse the `up` / `down` file name marker
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "up" => Some(Direction::Up),
            "down" => Some(Direction::Down),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single versioned migration file
///
/// Immutable once built by the catalog. Up and Down files of the same change share
/// `version` and `name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Migration {
    /// Positive version number (sequential or timestamp)
    pub version: i64,

    /// Human-readable slug
    pub name: String,

    /// Up or Down
    pub direction: Direction,

    /// File format tag, `sql` unless stated otherwise
    pub extension: String,
}

impl Migration {
    /// Create a new `Migration`
    pub fn new(
        version: i64,
        name: impl Into<String>,
        direction: Direction,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            version,
            name: name.into(),
            direction,
            extension: extension.into(),
        }
    }

    /// Up migration with the default extension
    pub fn up(version: i64, name: impl Into<String>) -> Self {
        Self::new(version, name, Direction::Up, DEFAULT_EXTENSION)
    }

    /// Down migration with the default extension
    pub fn down(version: i64, name: impl Into<String>) -> Self {
        Self::new(version, name, Direction::Down, DEFAULT_EXTENSION)
    }

    /// Canonical file name: `{version}_{name}.{direction}.{extension}`
    ///
    /// Versions narrower than [`SEQUENTIAL_WIDTH`] digits are zero-padded.
    pub fn file_name(&self) -> String {
        format!(
            "{:0width$}_{}.{}.{}",
            self.version,
            self.name,
            self.direction,
            self.extension,
            width = SEQUENTIAL_WIDTH
        )
    }

    /// The other half of this migration's up/down pair
    pub fn counterpart(&self) -> Self {
        let direction = match self.direction {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
        };
        Self::new(self.version, self.name.clone(), direction, self.extension.clone())
    }
}

impl fmt::Display for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.file_name())
    }
}

/// Version numbering scheme used when creating migrations
///
/// Resolved once from configuration; never inferred from the files on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum VersioningScheme {
    /// `1, 2, 3, ...`
    Sequential,
    /// `YYYYMMDDHHMMSS` in UTC
    Timestamp,
}

impl VersioningScheme {
    /// Scheme selected by the `sequential` configuration flag
    pub fn from_sequential(sequential: bool) -> Self {
        if sequential {
            VersioningScheme::Sequential
        } else {
            VersioningScheme::Timestamp
        }
    }

    /// Allocate the version following `highest`
    ///
    /// # Errors
    ///
    /// - `MigrationError::InvalidVersion` if the sequence has no next number.
    /// - `MigrationError::DuplicateVersion` if a timestamp token does not sort
    ///   strictly after the highest existing version.
    pub fn next_version(
        &self,
        highest: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<i64, MigrationError> {
        match self {
            VersioningScheme::Sequential => match highest {
                None => Ok(1),
                Some(v) => v.checked_add(1).ok_or(MigrationError::InvalidVersion(v)),
            },
            VersioningScheme::Timestamp => {
                let token = now.format(TIMESTAMP_FORMAT).to_string();
                let version = token
                    .parse::<i64>()
                    .map_err(|_| MigrationError::InvalidVersion(0))?;
                match highest {
                    Some(h) if version <= h => Err(MigrationError::DuplicateVersion(version)),
                    _ => Ok(version),
                }
            }
        }
    }

    /// Whether `version` looks like it was produced by this scheme
    pub fn accepts(&self, version: i64) -> bool {
        match self {
            VersioningScheme::Sequential => version < TIMESTAMP_LENGTH_FLOOR,
            VersioningScheme::Timestamp => is_timestamp_version(version),
        }
    }
}

/// A version that reads as a valid `YYYYMMDDHHMMSS` timestamp
pub fn is_timestamp_version(version: i64) -> bool {
    let token = version.to_string();
    token.len() == 14 && NaiveDateTime::parse_from_str(&token, TIMESTAMP_FORMAT).is_ok()
}

/// The up/down descriptor pair allocated by `create`
///
/// Writing the files is the file source's job; see
/// [`DirectorySource::persist`](crate::migration::DirectorySource::persist).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewMigration {
    pub version: i64,
    pub name: String,
    pub up: Migration,
    pub down: Migration,
}

impl NewMigration {
    pub fn new(version: i64, name: &str, extension: &str) -> Self {
        Self {
            version,
            name: name.to_string(),
            up: Migration::new(version, name, Direction::Up, extension),
            down: Migration::new(version, name, Direction::Down, extension),
        }
    }
}

/// Normalise a user-supplied migration name into a file name slug
///
/// Whitespace runs become `_`. Empty names and names containing path separators
/// are rejected.
pub fn normalize_name(name: &str) -> Result<String, MigrationError> {
    let slug = name.split_whitespace().collect::<Vec<_>>().join("_");
    if slug.is_empty() || slug.contains('/') || slug.contains('\\') || slug.starts_with('.') {
        return Err(MigrationError::InvalidName(name.to_string()));
    }
    Ok(slug)
}
