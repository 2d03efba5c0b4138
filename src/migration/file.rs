//! Migration file sources
//!
//! A [`FileSource`] enumerates raw migration descriptors. [`DirectorySource`] reads
//! them from a directory on disk; [`StaticSource`] serves a fixed in-memory listing.

use crate::migration::{MigrationError, NewMigration};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// `{version}_{name}.{up|down}.{ext}`, split into stem, direction and extension.
/// The stem is split into version token and name by the catalog.
#[allow(clippy::expect_used)] // Literal pattern, checked by tests
static ENTRY_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<stem>.+)\.(?P<direction>up|down)\.(?P<ext>[A-Za-z0-9]+)$")
        .expect("valid migration entry pattern")
});

/// Raw, unvalidated migration descriptor as listed by a file source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    /// Version token exactly as listed (may be zero-padded, may be garbage)
    pub version: String,
    /// Name slug (empty when the listing had none)
    pub name: String,
    /// Direction token (`up` / `down` for well-formed entries)
    pub direction: String,
    /// Extension; empty means the default
    pub extension: String,
}

impl RawEntry {
    pub fn new(
        version: impl Into<String>,
        name: impl Into<String>,
        direction: impl Into<String>,
        extension: impl Into<String>,
    ) -> Self {
        Self {
            version: version.into(),
            name: name.into(),
            direction: direction.into(),
            extension: extension.into(),
        }
    }

    /// Split a migration file name into its raw tokens
    ///
    /// Returns `None` for files that are not migration entries at all (no
    /// `.up.<ext>` / `.down.<ext>` suffix). A file that has the suffix but a broken
    /// prefix is still returned, so the catalog can reject it.
    ///
    /// # Example
    /// - `000001_create_users.up.sql` → (`000001`, `create_users`, `up`, `sql`)
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let caps = ENTRY_PATTERN.captures(file_name)?;
        let stem = caps.name("stem")?.as_str();
        let direction = caps.name("direction")?.as_str();
        let extension = caps.name("ext")?.as_str();

        let (version, name) = match stem.split_once('_') {
            Some((version, name)) => (version, name),
            None => (stem, ""),
        };

        Some(Self::new(version, name, direction, extension))
    }
}

/// Read-only enumeration of migration descriptors
///
/// Implementations must not cache: the catalog calls `list_entries()` on every
/// operation because the underlying files may change between calls.
pub trait FileSource {
    /// List every migration entry currently available
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Catalog` if the source cannot be read.
    fn list_entries(&self) -> Result<Vec<RawEntry>, MigrationError>;
}

impl<T: FileSource + ?Sized> FileSource for Box<T> {
    fn list_entries(&self) -> Result<Vec<RawEntry>, MigrationError> {
        (**self).list_entries()
    }
}

/// Migrations stored as individual files in one directory
#[derive(Debug, Clone)]
pub struct DirectorySource {
    migrations_dir: PathBuf,
}

impl DirectorySource {
    pub fn new(migrations_dir: impl AsRef<Path>) -> Self {
        Self {
            migrations_dir: migrations_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.migrations_dir
    }

    /// Write the empty up/down files allocated by `create`
    ///
    /// Existing files are never overwritten.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::DuplicateVersion` if either file already exists, or
    /// `MigrationError::Catalog` on any other I/O failure.
    pub fn persist(&self, migration: &NewMigration) -> Result<Vec<PathBuf>, MigrationError> {
        fs::create_dir_all(&self.migrations_dir).map_err(|e| {
            MigrationError::Catalog(format!(
                "Failed to create migrations directory {}: {}",
                self.migrations_dir.display(),
                e
            ))
        })?;

        let mut written = Vec::with_capacity(2);
        for descriptor in [&migration.up, &migration.down] {
            let path = self.migrations_dir.join(descriptor.file_name());
            let mut file = fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .map_err(|e| match e.kind() {
                    std::io::ErrorKind::AlreadyExists => {
                        MigrationError::DuplicateVersion(descriptor.version)
                    }
                    _ => MigrationError::Catalog(format!(
                        "Failed to write migration file {}: {}",
                        path.display(),
                        e
                    )),
                })?;
            file.flush().map_err(|e| {
                MigrationError::Catalog(format!("Failed to flush {}: {}", path.display(), e))
            })?;
            log::debug!("Created migration file {}", path.display());
            written.push(path);
        }

        Ok(written)
    }
}

impl FileSource for DirectorySource {
    fn list_entries(&self) -> Result<Vec<RawEntry>, MigrationError> {
        if !self.migrations_dir.exists() {
            return Err(MigrationError::Catalog(format!(
                "Migrations directory not found: {}",
                self.migrations_dir.display()
            )));
        }

        if !self.migrations_dir.is_dir() {
            return Err(MigrationError::Catalog(format!(
                "Path is not a directory: {}",
                self.migrations_dir.display()
            )));
        }

        let entries = fs::read_dir(&self.migrations_dir).map_err(|e| {
            MigrationError::Catalog(format!(
                "Failed to read migrations directory {}: {}",
                self.migrations_dir.display(),
                e
            ))
        })?;

        let mut raw = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MigrationError::Catalog(format!("Failed to read directory entry: {}", e))
            })?;

            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let file_name = path.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                MigrationError::Catalog(format!("Invalid filename: {}", path.display()))
            })?;

            match RawEntry::from_file_name(file_name) {
                Some(parsed) => raw.push(parsed),
                None => log::trace!("Skipping non-migration file {}", file_name),
            }
        }

        Ok(raw)
    }
}

/// Fixed in-memory listing, for embedded migrations and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    entries: Vec<RawEntry>,
}

impl StaticSource {
    pub fn new(entries: Vec<RawEntry>) -> Self {
        Self { entries }
    }

    /// Build from file names; names that are not migration entries are ignored
    pub fn from_file_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(
            names
                .into_iter()
                .filter_map(|n| RawEntry::from_file_name(n.as_ref()))
                .collect(),
        )
    }
}

impl FileSource for StaticSource {
    fn list_entries(&self) -> Result<Vec<RawEntry>, MigrationError> {
        Ok(self.entries.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_from_file_name_well_formed() {
        let entry = RawEntry::from_file_name("000001_create_users.up.sql").unwrap();
        assert_eq!(entry, RawEntry::new("000001", "create_users", "up", "sql"));

        let entry = RawEntry::from_file_name("20240120120000_add_idx.down.go").unwrap();
        assert_eq!(entry, RawEntry::new("20240120120000", "add_idx", "down", "go"));
    }

    #[test]
    fn test_from_file_name_keeps_broken_prefix_for_catalog() {
        let entry = RawEntry::from_file_name("abc_init.up.sql").unwrap();
        assert_eq!(entry.version, "abc");

        let entry = RawEntry::from_file_name("init.up.sql").unwrap();
        assert_eq!(entry.version, "init");
        assert_eq!(entry.name, "");
    }

    #[test]
    fn test_from_file_name_ignores_other_files() {
        assert!(RawEntry::from_file_name("README.md").is_none());
        assert!(RawEntry::from_file_name("000001_init.sql").is_none());
        assert!(RawEntry::from_file_name(".keep").is_none());
    }

    #[test]
    fn test_directory_source_lists_migration_files_only() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("000001_init.up.sql"), "CREATE TABLE t (id INT);").unwrap();
        fs::write(temp_dir.path().join("000001_init.down.sql"), "DROP TABLE t;").unwrap();
        fs::write(temp_dir.path().join("README.md"), "docs").unwrap();
        fs::create_dir(temp_dir.path().join("000002_nested.up.sql")).unwrap();

        let source = DirectorySource::new(temp_dir.path());
        let mut entries = source.list_entries().unwrap();
        entries.sort_by(|a, b| a.direction.cmp(&b.direction));

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].direction, "down");
        assert_eq!(entries[1].direction, "up");
    }

    #[test]
    fn test_directory_source_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectorySource::new(temp_dir.path().join("missing"));
        assert!(matches!(source.list_entries(), Err(MigrationError::Catalog(_))));
    }

    #[test]
    fn test_persist_writes_pair_and_refuses_overwrite() {
        let temp_dir = TempDir::new().unwrap();
        let source = DirectorySource::new(temp_dir.path().join("migrations"));
        let migration = NewMigration::new(1, "init", "sql");

        let written = source.persist(&migration).unwrap();
        assert_eq!(written.len(), 2);
        assert!(written[0].ends_with("000001_init.up.sql"));
        assert!(written[1].ends_with("000001_init.down.sql"));
        assert_eq!(source.list_entries().unwrap().len(), 2);

        assert_eq!(
            source.persist(&migration),
            Err(MigrationError::DuplicateVersion(1))
        );
    }
}
