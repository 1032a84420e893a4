//! Error types for the migration engine.

use std::path::PathBuf;

/// Errors raised while building schema model values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    /// A foreign key column was declared without a target table or column.
    #[error("Foreign key column '{column}' must name both a target table and a target column")]
    ForeignKeyTarget {
        /// The offending column.
        column: String,
    },

    /// A table or column was declared with an empty name.
    #[error("{kind} name must not be empty")]
    EmptyName {
        /// What was being named ("Table" or "Column").
        kind: &'static str,
    },
}

/// Reasons a migration log record is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogError {
    /// The record could not be decoded at all.
    #[error("Undecodable record: {0}")]
    Decode(String),

    /// The record has no table name.
    #[error("Record is missing its table name")]
    MissingTableName,

    /// The record has no query text.
    #[error("Record for table '{table}' is missing its query")]
    MissingQuery {
        /// Table named by the record.
        table: String,
    },

    /// The version number is present but not a positive integer.
    #[error("Invalid database version '{0}'")]
    InvalidVersion(String),

    /// The record has no migration type.
    #[error("Record for table '{table}' is missing its migration type")]
    MissingMigrationType {
        /// Table named by the record.
        table: String,
    },

    /// The migration type is not one this engine knows.
    #[error("Unknown migration type '{0}'")]
    UnknownMigrationType(String),

    /// A last-in-set record for a column change names no column.
    #[error("{migration_type} record for table '{table}' is missing its column name")]
    MissingColumnName {
        /// Table named by the record.
        table: String,
        /// Type of the record.
        migration_type: String,
    },

    /// A last-in-set foreign key record lacks its target.
    #[error("Foreign key record for '{table}.{column}' is missing its target table or column")]
    MissingForeignKeyTarget {
        /// Table named by the record.
        table: String,
        /// Column named by the record.
        column: String,
    },
}

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// Invalid schema declaration.
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    /// IO error (reading/writing log sources).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A log source for this version already exists.
    #[error("Log source already exists: {0}")]
    SourceExists(PathBuf),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
