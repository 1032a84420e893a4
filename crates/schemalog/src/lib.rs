//! Log-driven schema migrations for SQLite.
//!
//! `schemalog` keeps an append-only migration log and derives everything
//! else from it:
//! - The current schema is reconstructed by replaying the log, without
//!   opening a database connection
//! - The SQL needed to reach a desired schema is computed by diffing the
//!   replayed schema against it
//! - Each change is written back to the log as records, so the next replay
//!   sees it
//!
//! # Architecture
//!
//! - **Schema** - `TableContext`, `TableInfo` and `ColumnInfo` describe tables
//! - **History** - Loads the log from JSON sources, ordered by version
//! - **State** - Replays the log into a `TableContext`
//! - **Autodetector** - Diffs two schemas into statement generators
//! - **Operations** - Statement generators and their log records
//! - **Dialect** - SQLite SQL rendering
//! - **Writer** - Writes one version of the log
//!
//! # Example
//!
//! ```rust
//! use schemalog::prelude::*;
//!
//! let log = MigrationLog::load(Vec::<MemorySource>::new());
//! let context = MigrationContext::from_log(&log);
//!
//! let desired = TableContext::new().table(
//!     TableInfo::builder("user")
//!         .column(ColumnInfo::builder("name", "string").build().unwrap())
//!         .build()
//!         .unwrap(),
//! );
//!
//! let diff = DiffGenerator::new(context.table_context().clone()).analyze_diff(&desired);
//! assert!(diff.sql()[0].starts_with("CREATE TABLE user("));
//!
//! let records = diff.to_migrations(log.next_version());
//! assert!(records.iter().any(Migration::is_last_in_set));
//! ```
//!
//! Rebuilding a table to add a foreign key drops and recreates it, so hosts
//! should apply the statements with `PRAGMA foreign_keys=OFF`.
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the schema the log describes
//! schemalog --log-dir migrations show
//!
//! # Print the SQL that reaches a desired schema
//! schemalog --log-dir migrations plan --schema schema.json
//!
//! # Same, and append the change to the log
//! schemalog --log-dir migrations make --schema schema.json
//! ```

pub mod autodetector;
pub mod dialect;
pub mod error;
pub mod history;
pub mod migration;
pub mod operations;
pub mod schema;
pub mod state;
pub mod types;
pub mod writer;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::autodetector::{DiffGenerator, DiffOptions, SchemaDiff};
    pub use crate::dialect::{MigrationDialect, SqliteDialect};
    pub use crate::error::{LogError, MigrateError, Result, SchemaError};
    pub use crate::history::{FileSource, LogDiagnostic, LogSource, MemorySource, MigrationLog};
    pub use crate::migration::{Migration, MigrationType};
    pub use crate::operations::QueryGenerator;
    pub use crate::schema::{
        ColumnBuilder, ColumnInfo, ForeignKeyAction, ForeignKeyRef, TableBuilder, TableContext,
        TableInfo,
    };
    pub use crate::state::{project, MigrationContext, SchemaProjector};
    pub use crate::types::{LogicalType, StorageClass};
    pub use crate::writer::MigrationWriter;
}
