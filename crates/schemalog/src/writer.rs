//! Migration log writer.
//!
//! Writes the records of one version as a new log source, `<version>.json`,
//! in the log directory.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::autodetector::SchemaDiff;
use crate::error::{MigrateError, Result};
use crate::history::LOG_EXTENSION;
use crate::migration::Migration;

/// Writes one version of the migration log.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    version: u32,
    migrations: Vec<Migration>,
}

impl MigrationWriter {
    /// Creates a writer for records already stamped with `version`.
    #[must_use]
    pub fn new(version: u32, migrations: Vec<Migration>) -> Self {
        Self {
            version,
            migrations,
        }
    }

    /// Creates a writer for the records describing `diff`.
    #[must_use]
    pub fn from_diff(version: u32, diff: &SchemaDiff) -> Self {
        Self::new(version, diff.to_migrations(version))
    }

    /// Version being written.
    #[must_use]
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Records to write.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// File name of the log source.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{LOG_EXTENSION}", self.version)
    }

    /// Renders the log source.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let mut json = serde_json::to_string_pretty(&self.migrations)?;
        json.push('\n');
        Ok(json)
    }

    /// Writes the log source into `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::SourceExists`] if a source for this version
    /// is already there, or an IO error.
    pub fn write_to_dir(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;

        let path = dir.join(self.file_name());
        if path.exists() {
            return Err(MigrateError::SourceExists(path));
        }

        fs::write(&path, self.to_json()?)?;
        info!(
            path = %path.display(),
            records = self.migrations.len(),
            "Wrote migration log source"
        );
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::MigrationLog;
    use crate::migration::MigrationType;

    fn records() -> Vec<Migration> {
        vec![
            Migration::new(
                Some(3),
                "t",
                MigrationType::AlterTableAddColumn,
                "ALTER TABLE t ADD COLUMN c TEXT;",
            )
            .with_column("c", "string")
            .last_in_set(),
        ]
    }

    #[test]
    fn test_file_name() {
        assert_eq!(MigrationWriter::new(3, records()).file_name(), "3.json");
    }

    #[test]
    fn test_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let log_dir = dir.path().join("log");
        let writer = MigrationWriter::new(3, records());

        let path = writer.write_to_dir(&log_dir).unwrap();
        assert_eq!(path, log_dir.join("3.json"));

        let log = MigrationLog::from_dir(&log_dir).unwrap();
        assert_eq!(log.migrations(), records().as_slice());
        assert!(log.diagnostics().is_empty());
    }

    #[test]
    fn test_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MigrationWriter::new(3, records());
        writer.write_to_dir(dir.path()).unwrap();
        assert!(matches!(
            writer.write_to_dir(dir.path()),
            Err(MigrateError::SourceExists(_))
        ));
    }
}
