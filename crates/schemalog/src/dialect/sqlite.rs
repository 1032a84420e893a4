//! SQLite dialect for migrations.
//!
//! SQLite cannot add a foreign key to an existing table, so that change is
//! made by rebuilding the table: copy its rows to a temporary table, drop
//! and recreate it with every foreign key declared inline, then copy the
//! rows back.
//!
//! Every rendering of a table lays its columns out in canonical order
//! (`_id`, default columns, foreign keys, the rest), so a freshly created
//! table and a rebuilt one have the same physical column order and rows
//! can be copied back without a column list.

use std::collections::BTreeSet;

use crate::operations::QueryGenerator;
use crate::schema::{ColumnInfo, TableInfo, MODIFIED_COLUMN};
use crate::types::LogicalType;

use super::MigrationDialect;

/// Prefix of the temporary table used while rebuilding.
pub const TEMP_TABLE_PREFIX: &str = "temp_";

/// SQLite migration dialect.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// Creates a new SQLite dialect.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Generates a column definition as used in `CREATE TABLE` and `ADD COLUMN`.
    #[must_use]
    pub fn column_definition(&self, column: &ColumnInfo) -> String {
        let mut sql = format!(
            "{} {}",
            column.name(),
            self.type_name(&column.logical_type())
        );
        if column.is_primary_key() {
            sql.push_str(" PRIMARY KEY");
        }
        if let Some(default) = column.default_value() {
            sql.push_str(" DEFAULT ");
            sql.push_str(default);
        }
        sql
    }

    /// Generates `CREATE TABLE` with the implicit columns and every foreign key.
    #[must_use]
    pub fn create_table_sql(&self, table: &TableInfo) -> String {
        let mut parts: Vec<String> = table
            .columns()
            .into_iter()
            .filter(|c| c.is_implicit() || c.is_foreign_key())
            .map(|c| self.column_definition(c))
            .collect();

        for column in table.foreign_key_columns() {
            if let Some(fk) = column.foreign_key() {
                parts.push(format!(
                    "FOREIGN KEY({}) REFERENCES {}({}) ON UPDATE {} ON DELETE {}",
                    column.name(),
                    fk.table,
                    fk.column,
                    fk.on_update.as_sql(),
                    fk.on_delete.as_sql()
                ));
            }
        }

        format!("CREATE TABLE {}({});", table.name(), parts.join(", "))
    }

    /// Generates the trigger keeping the `modified` column current.
    #[must_use]
    pub fn modified_trigger_sql(&self, table: &str) -> String {
        format!(
            "CREATE TRIGGER {table}_{MODIFIED_COLUMN} AFTER UPDATE ON {table} FOR EACH ROW \
             BEGIN UPDATE {table} SET {MODIFIED_COLUMN}=CURRENT_TIMESTAMP WHERE _id=NEW._id; END;"
        )
    }

    /// Generates `ALTER TABLE ... ADD COLUMN`.
    #[must_use]
    pub fn add_column_sql(&self, table: &str, column: &ColumnInfo) -> String {
        format!(
            "ALTER TABLE {table} ADD COLUMN {};",
            self.column_definition(column)
        )
    }

    /// Generates `CREATE UNIQUE INDEX`.
    #[must_use]
    pub fn unique_index_sql(&self, index: &str, table: &str, column: &str) -> String {
        format!("CREATE UNIQUE INDEX {index} ON {table}({column});")
    }

    /// Name of the unique index on `table.column`.
    #[must_use]
    pub fn unique_index_name(&self, table: &str, column: &str) -> String {
        format!("{table}_{column}")
    }

    /// Generates `DROP TABLE IF EXISTS`.
    #[must_use]
    pub fn drop_table_sql(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {table};")
    }

    /// Name of the temporary copy of `table`.
    #[must_use]
    pub fn temp_table_name(&self, table: &str) -> String {
        format!("{TEMP_TABLE_PREFIX}{table}")
    }

    /// Comma separated column names of `table` in canonical order.
    #[must_use]
    pub fn select_list(&self, table: &TableInfo, excluded: &BTreeSet<String>) -> String {
        table
            .column_names()
            .into_iter()
            .filter(|name| !excluded.contains(*name))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Generates `CREATE TEMP TABLE temp_<t> AS SELECT ...`.
    #[must_use]
    pub fn create_temp_table_sql(&self, table: &str, select_list: &str) -> String {
        format!(
            "CREATE TEMP TABLE {} AS SELECT {select_list} FROM {table};",
            self.temp_table_name(table)
        )
    }

    /// Generates the copy back from the temporary table.
    #[must_use]
    pub fn insert_from_temp_sql(&self, table: &str, select_list: &str) -> String {
        format!(
            "INSERT INTO {table} SELECT {select_list} FROM {};",
            self.temp_table_name(table)
        )
    }

    /// Statements creating the table itself and its trigger.
    #[must_use]
    pub fn create_table_statements(
        &self,
        table: &TableInfo,
        modified_trigger: bool,
    ) -> Vec<String> {
        let mut sql = vec![self.create_table_sql(table)];
        if modified_trigger {
            sql.push(self.modified_trigger_sql(table.name()));
        }
        sql
    }

    /// Unique indexes on foreign key columns, created once the rows are in place.
    #[must_use]
    pub fn foreign_key_index_statements(&self, table: &TableInfo) -> Vec<String> {
        table
            .foreign_key_columns()
            .into_iter()
            .filter(|c| c.is_unique())
            .map(|c| {
                self.unique_index_sql(
                    &self.unique_index_name(table.name(), c.name()),
                    table.name(),
                    c.name(),
                )
            })
            .collect()
    }

    /// Statements adding one non foreign key column to a created table.
    #[must_use]
    pub fn column_statements(&self, table: &str, column: &ColumnInfo) -> Vec<String> {
        let mut sql = vec![self.add_column_sql(table, column)];
        if column.is_unique() {
            sql.push(self.unique_index_sql(
                &self.unique_index_name(table, column.name()),
                table,
                column.name(),
            ));
        }
        sql
    }

    /// Columns added after `CREATE TABLE`, in canonical order.
    #[must_use]
    pub fn added_columns<'a>(&self, table: &'a TableInfo) -> Vec<&'a ColumnInfo> {
        table
            .non_foreign_key_columns()
            .into_iter()
            .filter(|c| !c.is_implicit())
            .collect()
    }

    /// Statements creating `table` from nothing.
    #[must_use]
    pub fn create_table_full(&self, table: &TableInfo, modified_trigger: bool) -> Vec<String> {
        let mut sql = self.create_table_statements(table, modified_trigger);
        for column in self.added_columns(table) {
            sql.extend(self.column_statements(table.name(), column));
        }
        sql.extend(self.foreign_key_index_statements(table));
        sql
    }

    /// Statements adding the foreign key column `column` to `table` by rebuilding it.
    ///
    /// `table` is the table as it should look afterwards, `column` included.
    #[must_use]
    pub fn add_foreign_key_sql(
        &self,
        table: &TableInfo,
        column: &ColumnInfo,
        modified_trigger: bool,
    ) -> Vec<String> {
        let name = table.name();
        let temp = self.temp_table_name(name);
        let list = self.select_list(table, &BTreeSet::new());

        let mut sql = vec![
            self.drop_table_sql(&temp),
            // The copy selects the new column, so it has to exist first.
            self.add_column_sql(name, column),
            self.create_temp_table_sql(name, &list),
            self.drop_table_sql(name),
        ];
        sql.extend(self.create_table_statements(table, modified_trigger));
        for other in self.added_columns(table) {
            sql.extend(self.column_statements(name, other));
        }
        sql.push(self.insert_from_temp_sql(name, &list));
        sql.push(self.drop_table_sql(&temp));
        sql.extend(self.foreign_key_index_statements(table));
        sql
    }
}

impl MigrationDialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn type_name(&self, logical_type: &LogicalType) -> &'static str {
        logical_type.storage_class().as_sql()
    }

    fn generate_sql(&self, generator: &QueryGenerator) -> Vec<String> {
        match generator {
            QueryGenerator::CreateTable {
                table,
                modified_trigger,
            } => self.create_table_full(table, *modified_trigger),
            QueryGenerator::AddColumn { table, column } => vec![self.add_column_sql(table, column)],
            QueryGenerator::AddUniqueColumn { table, column } => vec![
                self.add_column_sql(table, column),
                self.unique_index_sql(column.name(), table, column.name()),
            ],
            QueryGenerator::AddUniqueIndex { table, column } => vec![self.unique_index_sql(
                &self.unique_index_name(table, column),
                table,
                column,
            )],
            QueryGenerator::AddForeignKey {
                table,
                column,
                modified_trigger,
            } => self.add_foreign_key_sql(table, column, *modified_trigger),
            QueryGenerator::DropTable { table } => vec![self.drop_table_sql(table)],
            QueryGenerator::CreateTempTable { table, excluded } => {
                let list = self.select_list(table, excluded);
                vec![
                    self.drop_table_sql(&self.temp_table_name(table.name())),
                    self.create_temp_table_sql(table.name(), &list),
                ]
            }
        }
    }
}
