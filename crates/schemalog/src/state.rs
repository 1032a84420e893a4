//! Schema reconstruction from the migration log.
//!
//! Replaying the replayable (last-in-set) records of the log yields the
//! schema the database currently has, without touching the database. The
//! diff engine compares this projection against the desired schema.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::{debug, warn};

use crate::history::MigrationLog;
use crate::migration::{sort_by_version, Migration, MigrationType};
use crate::schema::{ColumnBuilder, TableContext, TableInfo};

/// Logical type assumed when a column record carries none.
pub const DEFAULT_COLUMN_TYPE: &str = "string";

/// Folds migration records into table definitions.
#[derive(Debug, Default)]
pub struct SchemaProjector {
    tables: BTreeMap<String, BTreeMap<String, ColumnBuilder>>,
}

impl SchemaProjector {
    /// Creates a projector with no tables.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies one record. Records that are not last in their set are ignored.
    pub fn apply(&mut self, migration: &Migration) {
        if !migration.is_last_in_set() {
            return;
        }

        let table = migration.table_name();
        match migration.migration_type() {
            MigrationType::CreateTable => {
                self.tables.entry(table.to_string()).or_default();
            }
            MigrationType::DropTable => {
                if self.tables.remove(table).is_none() {
                    debug!(table, "Dropped table was never created");
                }
            }
            MigrationType::AddUniqueIndex => self.mark_unique(migration),
            MigrationType::AlterTableAddColumn
            | MigrationType::AlterTableAddUnique
            | MigrationType::AddForeignKeyReference => self.upsert_column(migration),
        }
    }

    /// Applies every record in order.
    pub fn apply_all<'a>(&mut self, migrations: impl IntoIterator<Item = &'a Migration>) {
        for migration in migrations {
            self.apply(migration);
        }
    }

    fn columns_of(&mut self, table: &str) -> &mut BTreeMap<String, ColumnBuilder> {
        if !self.tables.contains_key(table) {
            debug!(table, "Creating table implicitly for column record");
        }
        self.tables.entry(table.to_string()).or_default()
    }

    fn upsert_column(&mut self, migration: &Migration) {
        let table = migration.table_name();
        let Some(name) = migration.column_name() else {
            warn!(
                table,
                migration_type = %migration.migration_type(),
                "Skipping column record without a column name"
            );
            return;
        };

        let columns = self.columns_of(table);
        // An existing column keeps its type and flags; the record can only raise them.
        let mut builder = columns.remove(name).unwrap_or_else(|| {
            ColumnBuilder::new(
                name,
                migration
                    .column_qualified_type()
                    .unwrap_or(DEFAULT_COLUMN_TYPE),
            )
        });

        match migration.migration_type() {
            MigrationType::AlterTableAddUnique => builder = builder.unique(),
            MigrationType::AddForeignKeyReference => {
                builder = builder.foreign_key_parts(
                    migration.foreign_key_table().map(str::to_string),
                    migration.foreign_key_column().map(str::to_string),
                );
                if let Some(action) = migration.on_update() {
                    builder = builder.on_update(action);
                }
                if let Some(action) = migration.on_delete() {
                    builder = builder.on_delete(action);
                }
            }
            _ => {}
        }
        if let Some(default) = migration.default_value() {
            builder = builder.default_value(default);
        }

        columns.insert(name.to_string(), builder);
    }

    fn mark_unique(&mut self, migration: &Migration) {
        let table = migration.table_name();
        let column = migration.column_name().unwrap_or_default();
        let builder = self
            .tables
            .get_mut(table)
            .and_then(|columns| columns.remove_entry(column));
        match builder {
            Some((name, builder)) => {
                if let Some(columns) = self.tables.get_mut(table) {
                    columns.insert(name, builder.unique());
                }
            }
            None => warn!(table, column, "Unique index names an unknown column"),
        }
    }

    /// Builds the projected tables.
    ///
    /// Columns or tables that fail validation are skipped with a warning.
    #[must_use]
    pub fn finish(self) -> TableContext {
        let mut context = TableContext::new();
        for (table, columns) in self.tables {
            let mut built = Vec::with_capacity(columns.len());
            for (name, builder) in columns {
                match builder.build() {
                    Ok(column) => built.push(column),
                    Err(err) => warn!(
                        table = %table,
                        column = %name,
                        error = %err,
                        "Skipping invalid column"
                    ),
                }
            }
            match TableInfo::builder(table.as_str()).columns(built).build() {
                Ok(info) => {
                    context.insert(info);
                }
                Err(err) => warn!(table = %table, error = %err, "Skipping invalid table"),
            }
        }
        context
    }
}

/// Replays records into a schema.
#[must_use]
pub fn project(migrations: &[Migration]) -> TableContext {
    let mut projector = SchemaProjector::new();
    projector.apply_all(migrations);
    projector.finish()
}

/// The migration log together with its lazily projected schema.
///
/// The projection is computed on first use and then reused.
#[derive(Debug)]
pub struct MigrationContext {
    migrations: Vec<Migration>,
    tables: OnceLock<TableContext>,
}

impl MigrationContext {
    /// Creates a context from records, sorting them by version.
    #[must_use]
    pub fn new(mut migrations: Vec<Migration>) -> Self {
        sort_by_version(&mut migrations);
        Self {
            migrations,
            tables: OnceLock::new(),
        }
    }

    /// Creates a context from a loaded log.
    #[must_use]
    pub fn from_log(log: &MigrationLog) -> Self {
        Self::new(log.migrations().to_vec())
    }

    /// Records in replay order.
    #[must_use]
    pub fn migrations(&self) -> &[Migration] {
        &self.migrations
    }

    /// The projected schema.
    pub fn table_context(&self) -> &TableContext {
        self.tables.get_or_init(|| {
            let context = project(&self.migrations);
            debug!(
                records = self.migrations.len(),
                tables = context.len(),
                "Projected schema from migration log"
            );
            context
        })
    }

    /// Consumes the context, returning the projected schema.
    #[must_use]
    pub fn into_table_context(self) -> TableContext {
        match self.tables.into_inner() {
            Some(context) => context,
            None => project(&self.migrations),
        }
    }
}

impl From<MigrationLog> for MigrationContext {
    fn from(log: MigrationLog) -> Self {
        Self::new(log.into_migrations())
    }
}
