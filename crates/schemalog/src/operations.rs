//! Statement generators.
//!
//! A [`QueryGenerator`] is one schema change: it knows the table it
//! touches, the priority it runs at, the SQL statements that perform it,
//! and the migration log records that describe it.

use std::collections::BTreeSet;

use crate::dialect::{MigrationDialect, SqliteDialect};
use crate::migration::{Migration, MigrationType};
use crate::schema::{ColumnInfo, TableInfo};

/// A schema change and the SQL that performs it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryGenerator {
    /// Create a table with all of its columns.
    CreateTable {
        /// Table to create.
        table: TableInfo,
        /// Whether to create the `modified` trigger.
        modified_trigger: bool,
    },
    /// Add a plain column.
    AddColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: ColumnInfo,
    },
    /// Add a column and a unique index on it.
    ///
    /// The index is named after the column alone. SQLite index names are
    /// global to the database, so two tables adding a unique column of the
    /// same name collide on the second `CREATE UNIQUE INDEX`.
    AddUniqueColumn {
        /// Table name.
        table: String,
        /// Column to add.
        column: ColumnInfo,
    },
    /// Make an existing column unique.
    AddUniqueIndex {
        /// Table name.
        table: String,
        /// Column name.
        column: String,
    },
    /// Add a foreign key column by rebuilding the table.
    AddForeignKey {
        /// The table as it looks after the change.
        table: TableInfo,
        /// The foreign key column being added.
        column: ColumnInfo,
        /// Whether to recreate the `modified` trigger.
        modified_trigger: bool,
    },
    /// Drop a table.
    DropTable {
        /// Table name.
        table: String,
    },
    /// Copy a table into `temp_<table>`, leaving out some columns.
    CreateTempTable {
        /// Table to copy.
        table: TableInfo,
        /// Columns not copied.
        excluded: BTreeSet<String>,
    },
}

impl QueryGenerator {
    /// Creates a table-creation generator.
    #[must_use]
    pub fn create_table(table: TableInfo) -> Self {
        Self::CreateTable {
            table,
            modified_trigger: true,
        }
    }

    /// Creates a generator adding a plain column.
    #[must_use]
    pub fn add_column(table: impl Into<String>, column: ColumnInfo) -> Self {
        Self::AddColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a generator adding a unique column.
    #[must_use]
    pub fn add_unique_column(table: impl Into<String>, column: ColumnInfo) -> Self {
        Self::AddUniqueColumn {
            table: table.into(),
            column,
        }
    }

    /// Creates a generator making an existing column unique.
    #[must_use]
    pub fn add_unique_index(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self::AddUniqueIndex {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a generator adding a foreign key column to `table`.
    ///
    /// `table` must already contain `column`.
    #[must_use]
    pub fn add_foreign_key(table: TableInfo, column: ColumnInfo) -> Self {
        Self::AddForeignKey {
            table,
            column,
            modified_trigger: true,
        }
    }

    /// Creates a generator dropping a table.
    #[must_use]
    pub fn drop_table(table: impl Into<String>) -> Self {
        Self::DropTable {
            table: table.into(),
        }
    }

    /// Creates a generator copying a table into its temporary table.
    #[must_use]
    pub fn create_temp_table(
        table: TableInfo,
        excluded: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self::CreateTempTable {
            table,
            excluded: excluded.into_iter().map(Into::into).collect(),
        }
    }

    /// Sets whether table (re)creation includes the `modified` trigger.
    #[must_use]
    pub fn with_modified_trigger(mut self, enabled: bool) -> Self {
        match &mut self {
            Self::CreateTable {
                modified_trigger, ..
            }
            | Self::AddForeignKey {
                modified_trigger, ..
            } => *modified_trigger = enabled,
            _ => {}
        }
        self
    }

    /// Name of the table this generator touches.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::CreateTable { table, .. }
            | Self::AddForeignKey { table, .. }
            | Self::CreateTempTable { table, .. } => table.name(),
            Self::AddColumn { table, .. }
            | Self::AddUniqueColumn { table, .. }
            | Self::AddUniqueIndex { table, .. }
            | Self::DropTable { table } => table,
        }
    }

    /// Migration type this generator is logged as.
    #[must_use]
    pub fn migration_type(&self) -> MigrationType {
        match self {
            Self::CreateTable { .. } | Self::CreateTempTable { .. } => MigrationType::CreateTable,
            Self::AddColumn { .. } => MigrationType::AlterTableAddColumn,
            Self::AddUniqueColumn { .. } => MigrationType::AlterTableAddUnique,
            Self::AddUniqueIndex { .. } => MigrationType::AddUniqueIndex,
            Self::AddForeignKey { .. } => MigrationType::AddForeignKeyReference,
            Self::DropTable { .. } => MigrationType::DropTable,
        }
    }

    /// Execution priority; lower runs first.
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.migration_type().priority()
    }

    /// Generates the SQL statements, each ending in `;`.
    #[must_use]
    pub fn generate(&self) -> Vec<String> {
        SqliteDialect::new().generate_sql(self)
    }

    /// Returns a short description for logs.
    #[must_use]
    pub fn description(&self) -> String {
        match self {
            Self::CreateTable { table, .. } => format!("Create table {}", table.name()),
            Self::AddColumn { table, column } => {
                format!("Add column {}.{}", table, column.name())
            }
            Self::AddUniqueColumn { table, column } => {
                format!("Add unique column {}.{}", table, column.name())
            }
            Self::AddUniqueIndex { table, column } => {
                format!("Make {table}.{column} unique")
            }
            Self::AddForeignKey { table, column, .. } => format!(
                "Add foreign key {}.{} -> {}.{}",
                table.name(),
                column.name(),
                column.foreign_key_table().unwrap_or_default(),
                column.foreign_key_column().unwrap_or_default()
            ),
            Self::DropTable { table } => format!("Drop table {table}"),
            Self::CreateTempTable { table, .. } => {
                format!("Copy table {} to temporary table", table.name())
            }
        }
    }

    /// Describes this change as migration log records for `version`.
    ///
    /// Every statement becomes one record. Statements are grouped into
    /// sets, one per logical operation, and only the last record of a set
    /// carries the detail needed to replay it.
    #[must_use]
    pub fn to_migrations(&self, version: u32) -> Vec<Migration> {
        let dialect = SqliteDialect::new();
        let mut sets = RecordSets::new(version, self.table_name());
        match self {
            Self::CreateTable {
                table,
                modified_trigger,
            } => {
                let create = dialect.create_table_statements(table, *modified_trigger);
                let create_sql = create.first().cloned().unwrap_or_default();
                sets.push(MigrationType::CreateTable, create, None);

                // Foreign keys are declared by the CREATE TABLE statement itself.
                for column in table.foreign_key_columns() {
                    sets.push(
                        MigrationType::AddForeignKeyReference,
                        vec![create_sql.clone()],
                        Some(column),
                    );
                }
                for column in dialect.added_columns(table) {
                    let ty = if column.is_unique() {
                        MigrationType::AlterTableAddUnique
                    } else {
                        MigrationType::AlterTableAddColumn
                    };
                    sets.push(
                        ty,
                        dialect.column_statements(table.name(), column),
                        Some(column),
                    );
                }
                sets.push_foreign_key_indexes(&dialect, table);
                sets.into_records()
            }
            Self::AddColumn { column, .. } | Self::AddUniqueColumn { column, .. } => {
                sets.push(self.migration_type(), self.generate(), Some(column));
                sets.into_records()
            }
            Self::AddUniqueIndex { table, column } => self
                .generate()
                .into_iter()
                .map(|sql| {
                    Migration::new(
                        Some(version),
                        table.as_str(),
                        MigrationType::AddUniqueIndex,
                        sql,
                    )
                    .with_column_name(column.as_str())
                    .last_in_set()
                })
                .collect(),
            Self::AddForeignKey {
                table,
                column,
                modified_trigger,
            } => {
                let mut statements = dialect.add_foreign_key_sql(table, column, *modified_trigger);
                // Trailing index statements are logged as sets of their own.
                let indexes = dialect.foreign_key_index_statements(table);
                statements.truncate(statements.len().saturating_sub(indexes.len()));
                sets.push(MigrationType::AddForeignKeyReference, statements, Some(column));
                sets.push_foreign_key_indexes(&dialect, table);
                sets.into_records()
            }
            Self::DropTable { .. } => {
                sets.push(MigrationType::DropTable, self.generate(), None);
                sets.into_records()
            }
            Self::CreateTempTable { table, .. } => self
                .generate()
                .into_iter()
                .map(|sql| {
                    Migration::new(Some(version), table.name(), MigrationType::CreateTable, sql)
                })
                .collect(),
        }
    }
}

/// Accumulates record sets for one generator.
struct RecordSets<'a> {
    version: u32,
    table: &'a str,
    records: Vec<Migration>,
}

impl<'a> RecordSets<'a> {
    fn new(version: u32, table: &'a str) -> Self {
        Self {
            version,
            table,
            records: Vec::new(),
        }
    }

    fn push(&mut self, ty: MigrationType, statements: Vec<String>, column: Option<&ColumnInfo>) {
        let count = statements.len();
        for (i, sql) in statements.into_iter().enumerate() {
            let record = Migration::new(Some(self.version), self.table, ty, sql);
            let record = if i + 1 == count {
                describe(record, column).last_in_set()
            } else {
                record
            };
            self.records.push(record);
        }
    }

    fn push_foreign_key_indexes(&mut self, dialect: &SqliteDialect, table: &TableInfo) {
        for column in table.foreign_key_columns() {
            if column.is_unique() {
                let sql = dialect.unique_index_sql(
                    &dialect.unique_index_name(table.name(), column.name()),
                    table.name(),
                    column.name(),
                );
                self.push(MigrationType::AddUniqueIndex, vec![sql], Some(column));
            }
        }
    }

    fn into_records(self) -> Vec<Migration> {
        self.records
    }
}

fn describe(record: Migration, column: Option<&ColumnInfo>) -> Migration {
    let Some(column) = column else {
        return record;
    };
    let record = record
        .with_column(column.name(), column.qualified_type())
        .with_default(column.default_value().map(str::to_string));
    match column.foreign_key() {
        Some(fk) => record
            .with_foreign_key(fk.table.as_str(), fk.column.as_str())
            .with_foreign_key_actions(fk.on_update, fk.on_delete),
        None => record,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::project;

    fn column(name: &str, ty: &str) -> ColumnInfo {
        ColumnInfo::builder(name, ty).build().unwrap()
    }

    fn post() -> TableInfo {
        TableInfo::builder("post")
            .column(ColumnInfo::builder("title", "string").unique().build().unwrap())
            .column(column("views", "long"))
            .column(
                ColumnInfo::builder("author_id", "long")
                    .foreign_key("user", "_id")
                    .build()
                    .unwrap(),
            )
            .build()
            .unwrap()
    }

    #[test]
    fn test_priorities() {
        assert_eq!(QueryGenerator::create_table(post()).priority(), 0);
        assert_eq!(QueryGenerator::add_column("t", column("c", "long")).priority(), 1);
        assert_eq!(QueryGenerator::add_unique_index("t", "c").priority(), 1);
        let fk = post().column("author_id").unwrap().clone();
        assert_eq!(QueryGenerator::add_foreign_key(post(), fk).priority(), 2);
        assert_eq!(QueryGenerator::drop_table("t").priority(), 3);
    }

    #[test]
    fn test_add_unique_column() {
        let generator = QueryGenerator::add_unique_column("t", column("code", "string"));
        assert_eq!(
            generator.generate(),
            vec![
                "ALTER TABLE t ADD COLUMN code TEXT;".to_string(),
                "CREATE UNIQUE INDEX code ON t(code);".to_string(),
            ]
        );
        assert_eq!(generator.table_name(), "t");
    }

    #[test]
    fn test_drop_table() {
        assert_eq!(
            QueryGenerator::drop_table("t").generate(),
            vec!["DROP TABLE IF EXISTS t;".to_string()]
        );
    }

    #[test]
    fn test_create_temp_table() {
        let generator = QueryGenerator::create_temp_table(post(), ["title", "views"]);
        assert_eq!(
            generator.generate(),
            vec![
                "DROP TABLE IF EXISTS temp_post;".to_string(),
                "CREATE TEMP TABLE temp_post AS SELECT _id, created, deleted, modified, author_id FROM post;"
                    .to_string(),
            ]
        );
        let records = generator.to_migrations(1);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| !r.is_last_in_set()));
    }

    #[test]
    fn test_create_table_records_replay() {
        let generator = QueryGenerator::create_table(post());
        let records = generator.to_migrations(1);
        let statements = generator.generate();

        assert!(records.iter().all(|r| r.db_version() == Some(1)));
        assert_eq!(records.iter().filter(|r| r.is_last_in_set()).count(), 4);
        for sql in &statements {
            assert!(records.iter().any(|r| r.query() == sql), "{sql}");
        }

        let fk = records
            .iter()
            .find(|r| r.migration_type() == MigrationType::AddForeignKeyReference)
            .unwrap();
        assert_eq!(fk.query(), statements[0]);
        assert_eq!(fk.foreign_key_table(), Some("user"));

        let projected = project(&records);
        assert_eq!(projected.get("post"), Some(&post()));
    }

    #[test]
    fn test_add_foreign_key_records() {
        let table = post();
        let fk = table.column("author_id").unwrap().clone();
        let generator = QueryGenerator::add_foreign_key(table, fk);
        let statements = generator.generate();
        let records = generator.to_migrations(4);

        assert_eq!(records.len(), statements.len());
        assert!(records
            .iter()
            .all(|r| r.migration_type() == MigrationType::AddForeignKeyReference));
        let last = records.last().unwrap();
        assert!(last.is_last_in_set());
        assert_eq!(last.column_name(), Some("author_id"));
        assert_eq!(last.foreign_key_column(), Some("_id"));
        assert_eq!(records.iter().filter(|r| r.is_last_in_set()).count(), 1);
    }

    #[test]
    fn test_unique_foreign_key_gets_index_set() {
        let owner = ColumnInfo::builder("owner_id", "long")
            .foreign_key("user", "_id")
            .unique()
            .build()
            .unwrap();
        let table = TableInfo::builder("pet").column(owner.clone()).build().unwrap();
        let generator = QueryGenerator::add_foreign_key(table.clone(), owner);
        let statements = generator.generate();
        assert_eq!(
            statements.last().unwrap(),
            "CREATE UNIQUE INDEX pet_owner_id ON pet(owner_id);"
        );

        let records = generator.to_migrations(2);
        let last = records.last().unwrap();
        assert_eq!(last.migration_type(), MigrationType::AddUniqueIndex);
        assert_eq!(last.column_name(), Some("owner_id"));

        let created = QueryGenerator::create_table(table.clone()).to_migrations(1);
        assert_eq!(project(&created).get("pet"), Some(&table));
    }

    #[test]
    fn test_modified_trigger_toggle() {
        let generator = QueryGenerator::create_table(post()).with_modified_trigger(false);
        assert!(generator
            .generate()
            .iter()
            .all(|sql| !sql.starts_with("CREATE TRIGGER")));
    }
}
