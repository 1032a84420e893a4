//! Migration log store.
//!
//! The log is spread over one or more sources (typically one JSON file per
//! database version). Loading merges every source into a single list of
//! [`Migration`]s ordered by version. Records that cannot be used are
//! dropped with a warning and kept as [`LogDiagnostic`]s on the result.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LogError, Result};
use crate::migration::{sort_by_version, Migration, MigrationRecord};

/// File extension of log sources in a log directory.
pub const LOG_EXTENSION: &str = "json";

/// A source of migration log records.
pub trait LogSource {
    /// Identifier used for ordering and diagnostics.
    fn id(&self) -> &str;

    /// Reads the raw source text.
    fn read(&self) -> io::Result<String>;
}

impl<T: LogSource + ?Sized> LogSource for Box<T> {
    fn id(&self) -> &str {
        (**self).id()
    }

    fn read(&self) -> io::Result<String> {
        (**self).read()
    }
}

/// A log source backed by a file.
#[derive(Debug, Clone)]
pub struct FileSource {
    id: String,
    path: PathBuf,
}

impl FileSource {
    /// Creates a source for the given file. Its id is the file name.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let id = path.file_name().map_or_else(
            || path.display().to_string(),
            |name| name.to_string_lossy().into_owned(),
        );
        Self { id, path }
    }

    /// Path of the file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSource for FileSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self) -> io::Result<String> {
        fs::read_to_string(&self.path)
    }
}

/// A log source held in memory.
#[derive(Debug, Clone)]
pub struct MemorySource {
    id: String,
    contents: String,
}

impl MemorySource {
    /// Creates a source from its id and text.
    pub fn new(id: impl Into<String>, contents: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            contents: contents.into(),
        }
    }
}

impl LogSource for MemorySource {
    fn id(&self) -> &str {
        &self.id
    }

    fn read(&self) -> io::Result<String> {
        Ok(self.contents.clone())
    }
}

/// Why part of the log was not loaded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogDiagnostic {
    /// The source could not be read.
    #[error("Log source '{source_id}' could not be read: {message}")]
    UnreadableSource {
        /// Source identifier.
        source_id: String,
        /// Underlying error.
        message: String,
    },

    /// The source is not a JSON array of records.
    #[error("Log source '{source_id}' is malformed: {message}")]
    MalformedSource {
        /// Source identifier.
        source_id: String,
        /// Underlying error.
        message: String,
    },

    /// A single record was rejected.
    #[error("Record {index} of log source '{source_id}' was dropped: {reason}")]
    MalformedRecord {
        /// Source identifier.
        source_id: String,
        /// Position of the record within its source.
        index: usize,
        /// What was wrong with it.
        reason: LogError,
    },
}

/// Accepted layouts of a log source.
#[derive(Deserialize)]
#[serde(untagged)]
enum LogDocument {
    Records(Vec<serde_json::Value>),
    Wrapped { migrations: Vec<serde_json::Value> },
}

impl LogDocument {
    fn into_records(self) -> Vec<serde_json::Value> {
        match self {
            Self::Records(records) | Self::Wrapped { migrations: records } => records,
        }
    }
}

/// Queue key of a source: numbered ids first by number, then by name.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SourceKey {
    unnumbered: bool,
    number: u64,
    id: String,
    index: usize,
}

impl SourceKey {
    fn new(id: &str, index: usize) -> Self {
        let digits: String = id.chars().take_while(char::is_ascii_digit).collect();
        let number = digits.parse::<u64>().ok();
        Self {
            unnumbered: number.is_none(),
            number: number.unwrap_or(0),
            id: id.to_string(),
            index,
        }
    }
}

/// The loaded migration log.
#[derive(Debug, Clone, Default)]
pub struct MigrationLog {
    migrations: Vec<Migration>,
    diagnostics: Vec<LogDiagnostic>,
}

impl MigrationLog {
    /// An empty log.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a log from records already in memory, sorted by version.
    #[must_use]
    pub fn from_migrations(mut migrations: Vec<Migration>) -> Self {
        sort_by_version(&mut migrations);
        Self {
            migrations,
            diagnostics: Vec::new(),
        }
    }

    /// Loads and merges the given sources.
    ///
    /// Sources are consumed in ascending id order, so records from
    /// different sources sharing a version keep their source order.
    pub fn load<S, I>(sources: I) -> Self
    where
        S: LogSource,
        I: IntoIterator<Item = S>,
    {
        let sources: Vec<S> = sources.into_iter().collect();
        let mut queue: BinaryHeap<Reverse<SourceKey>> = sources
            .iter()
            .enumerate()
            .map(|(index, source)| Reverse(SourceKey::new(source.id(), index)))
            .collect();

        let mut log = Self::empty();
        while let Some(Reverse(key)) = queue.pop() {
            log.read_source(&sources[key.index]);
        }
        sort_by_version(&mut log.migrations);

        info!(
            sources = sources.len(),
            records = log.migrations.len(),
            dropped = log.diagnostics.len(),
            "Loaded migration log"
        );
        log
    }

    /// Loads every `*.json` file in `dir`.
    ///
    /// A missing directory is an empty log.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory exists but cannot be listed.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            debug!(dir = %dir.display(), "Log directory does not exist");
            return Ok(Self::empty());
        }

        let mut sources = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == LOG_EXTENSION) {
                sources.push(FileSource::new(path));
            }
        }
        Ok(Self::load(sources))
    }

    fn read_source<S: LogSource>(&mut self, source: &S) {
        let source_id = source.id().to_string();
        let text = match source.read() {
            Ok(text) => text,
            Err(err) => {
                warn!(source = %source_id, error = %err, "Skipping unreadable log source");
                self.diagnostics.push(LogDiagnostic::UnreadableSource {
                    source_id,
                    message: err.to_string(),
                });
                return;
            }
        };

        if text.trim().is_empty() {
            debug!(source = %source_id, "Log source is empty");
            return;
        }

        let records = match serde_json::from_str::<LogDocument>(&text) {
            Ok(document) => document.into_records(),
            Err(err) => {
                warn!(source = %source_id, error = %err, "Skipping malformed log source");
                self.diagnostics.push(LogDiagnostic::MalformedSource {
                    source_id,
                    message: err.to_string(),
                });
                return;
            }
        };

        debug!(source = %source_id, records = records.len(), "Reading log source");
        for (index, value) in records.into_iter().enumerate() {
            match decode_record(value) {
                Ok(migration) => self.migrations.push(migration),
                Err(reason) => {
                    warn!(
                        source = %source_id,
                        index,
                        reason = %reason,
                        "Dropping malformed migration record"
                    );
                    self.diagnostics.push(LogDiagnostic::MalformedRecord {
                        source_id: source_id.clone(),
                        index,
                        reason,
                    });
                }
            }
        }
    }

    /// Records ordered by version.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// Consumes the log, returning its records.
    #[must_use]
    pub fn into_migrations(self) -> Vec<Migration> {
        self.migrations
    }

    /// Everything that was dropped while loading.
    #[must_use]
    pub fn diagnostics(&self) -> &[LogDiagnostic] {
        &self.diagnostics
    }

    /// Highest version present in the log.
    #[must_use]
    pub fn latest_version(&self) -> Option<u32> {
        self.migrations.iter().filter_map(Migration::db_version).max()
    }

    /// Version the next set of changes should be written as.
    #[must_use]
    pub fn next_version(&self) -> u32 {
        self.latest_version().map_or(1, |v| v.saturating_add(1))
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    /// Returns true if the log has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }
}

fn decode_record(value: serde_json::Value) -> std::result::Result<Migration, LogError> {
    let record: MigrationRecord =
        serde_json::from_value(value).map_err(|err| LogError::Decode(err.to_string()))?;
    Migration::try_from(record)
}
