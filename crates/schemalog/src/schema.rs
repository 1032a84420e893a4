//! Schema representation types.
//!
//! These types describe tables and columns. They are used both for the
//! desired schema declared by the host application and for the schema
//! reconstructed by replaying the migration log.
//!
//! Every table implicitly owns a row id column (`_id`) and three default
//! columns (`created`, `deleted`, `modified`). Columns are totally ordered
//! so that every rendered column list comes out byte-identical across runs:
//! `_id` first, then the default columns, then foreign keys, then the rest,
//! each group sorted by name.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::SchemaError;
use crate::types::{LogicalType, StorageClass};

/// Name of the synthetic row id column.
pub const ID_COLUMN: &str = "_id";
/// Creation timestamp column.
pub const CREATED_COLUMN: &str = "created";
/// Soft-delete flag column.
pub const DELETED_COLUMN: &str = "deleted";
/// Modification timestamp column, maintained by a trigger.
pub const MODIFIED_COLUMN: &str = "modified";
/// The default columns every table carries besides `_id`.
pub const DEFAULT_COLUMNS: [&str; 3] = [CREATED_COLUMN, DELETED_COLUMN, MODIFIED_COLUMN];

/// Returns true if `name` is one of the default columns.
#[must_use]
pub fn is_default_column(name: &str) -> bool {
    DEFAULT_COLUMNS.contains(&name)
}

/// Returns true if `name` is `_id` or a default column.
#[must_use]
pub fn is_implicit_column(name: &str) -> bool {
    name == ID_COLUMN || is_default_column(name)
}

/// Foreign key action (ON DELETE, ON UPDATE).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ForeignKeyAction {
    /// No action (error if referenced row is deleted/updated).
    NoAction,
    /// Restrict (same as NoAction but checked immediately).
    Restrict,
    /// Cascade the delete/update to referencing rows.
    #[default]
    Cascade,
    /// Set the foreign key column to NULL.
    SetNull,
    /// Set the foreign key column to its default value.
    SetDefault,
}

impl ForeignKeyAction {
    /// Returns the SQL representation of this action.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::NoAction => "NO ACTION",
            Self::Restrict => "RESTRICT",
            Self::Cascade => "CASCADE",
            Self::SetNull => "SET NULL",
            Self::SetDefault => "SET DEFAULT",
        }
    }
}

/// Target of a foreign key column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ForeignKeyRef {
    /// Referenced table.
    pub table: String,
    /// Referenced column.
    pub column: String,
    /// Action on update of the referenced row.
    pub on_update: ForeignKeyAction,
    /// Action on delete of the referenced row.
    pub on_delete: ForeignKeyAction,
}

/// Ordering tier of a column within its table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ColumnRank {
    /// The `_id` column.
    Id,
    /// One of the default columns.
    Default,
    /// A foreign key column.
    ForeignKey,
    /// Any other column.
    Other,
}

/// Schema definition for a column.
///
/// Built through [`ColumnInfo::builder`], which rejects a foreign key
/// without a complete target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "ColumnDecl", into = "ColumnDecl")]
pub struct ColumnInfo {
    name: String,
    qualified_type: String,
    primary_key: bool,
    unique: bool,
    foreign_key: Option<ForeignKeyRef>,
    default_value: Option<String>,
}

impl ColumnInfo {
    /// Starts building a column with the given name and logical type.
    #[must_use]
    pub fn builder(name: impl Into<String>, qualified_type: impl Into<String>) -> ColumnBuilder {
        ColumnBuilder::new(name, qualified_type)
    }

    /// Column name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Logical type name as declared.
    #[must_use]
    pub fn qualified_type(&self) -> &str {
        &self.qualified_type
    }

    /// Parsed logical type.
    #[must_use]
    pub fn logical_type(&self) -> LogicalType {
        LogicalType::parse(&self.qualified_type)
    }

    /// SQLite storage class of this column.
    #[must_use]
    pub fn storage_class(&self) -> StorageClass {
        self.logical_type().storage_class()
    }

    /// Whether this column is the primary key.
    #[must_use]
    pub fn is_primary_key(&self) -> bool {
        self.primary_key
    }

    /// Whether this column carries a unique index.
    #[must_use]
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Whether this column references another table.
    #[must_use]
    pub fn is_foreign_key(&self) -> bool {
        self.foreign_key.is_some()
    }

    /// Foreign key target, if any.
    #[must_use]
    pub fn foreign_key(&self) -> Option<&ForeignKeyRef> {
        self.foreign_key.as_ref()
    }

    /// Referenced table, if this is a foreign key.
    #[must_use]
    pub fn foreign_key_table(&self) -> Option<&str> {
        self.foreign_key.as_ref().map(|fk| fk.table.as_str())
    }

    /// Referenced column, if this is a foreign key.
    #[must_use]
    pub fn foreign_key_column(&self) -> Option<&str> {
        self.foreign_key.as_ref().map(|fk| fk.column.as_str())
    }

    /// Raw SQL default, if any.
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Whether this is `_id` or one of the default columns.
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        is_implicit_column(&self.name)
    }

    /// Ordering tier of this column.
    #[must_use]
    pub fn rank(&self) -> ColumnRank {
        if self.name == ID_COLUMN {
            ColumnRank::Id
        } else if is_default_column(&self.name) {
            ColumnRank::Default
        } else if self.foreign_key.is_some() {
            ColumnRank::ForeignKey
        } else {
            ColumnRank::Other
        }
    }

    /// Returns a builder pre-filled with this column's definition.
    #[must_use]
    pub fn to_builder(&self) -> ColumnBuilder {
        let mut builder = ColumnBuilder::new(self.name.clone(), self.qualified_type.clone());
        builder.primary_key = self.primary_key;
        builder.unique = self.unique;
        builder.default_value = self.default_value.clone();
        if let Some(fk) = &self.foreign_key {
            builder.foreign_key = true;
            builder.foreign_key_table = Some(fk.table.clone());
            builder.foreign_key_column = Some(fk.column.clone());
            builder.on_update = fk.on_update;
            builder.on_delete = fk.on_delete;
        }
        builder
    }

    fn implicit(name: &str, qualified_type: &str, default_value: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            qualified_type: qualified_type.to_string(),
            primary_key: name == ID_COLUMN,
            unique: false,
            foreign_key: None,
            default_value: default_value.map(str::to_string),
        }
    }
}

impl PartialOrd for ColumnInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ColumnInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        // Rank and name decide; the rest only keeps the order total.
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.name.cmp(&other.name))
            .then_with(|| self.qualified_type.cmp(&other.qualified_type))
            .then_with(|| self.primary_key.cmp(&other.primary_key))
            .then_with(|| self.unique.cmp(&other.unique))
            .then_with(|| self.foreign_key.cmp(&other.foreign_key))
            .then_with(|| self.default_value.cmp(&other.default_value))
    }
}

/// Returns the implicit columns every table carries, in canonical order.
#[must_use]
pub fn implicit_columns() -> [ColumnInfo; 4] {
    [
        ColumnInfo::implicit(ID_COLUMN, "long", None),
        ColumnInfo::implicit(CREATED_COLUMN, "date", Some("CURRENT_TIMESTAMP")),
        ColumnInfo::implicit(DELETED_COLUMN, "boolean", Some("0")),
        ColumnInfo::implicit(MODIFIED_COLUMN, "date", Some("CURRENT_TIMESTAMP")),
    ]
}

/// Fluent builder for [`ColumnInfo`].
#[derive(Debug, Clone)]
pub struct ColumnBuilder {
    name: String,
    qualified_type: String,
    primary_key: bool,
    unique: bool,
    foreign_key: bool,
    foreign_key_table: Option<String>,
    foreign_key_column: Option<String>,
    on_update: ForeignKeyAction,
    on_delete: ForeignKeyAction,
    default_value: Option<String>,
}

impl ColumnBuilder {
    /// Creates a new column builder with name and type.
    #[must_use]
    pub fn new(name: impl Into<String>, qualified_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            qualified_type: qualified_type.into(),
            primary_key: false,
            unique: false,
            foreign_key: false,
            foreign_key_table: None,
            foreign_key_column: None,
            on_update: ForeignKeyAction::default(),
            on_delete: ForeignKeyAction::default(),
            default_value: None,
        }
    }

    /// Replaces the logical type.
    #[must_use]
    pub fn qualified_type(mut self, qualified_type: impl Into<String>) -> Self {
        self.qualified_type = qualified_type.into();
        self
    }

    /// Marks the column as the primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as unique.
    #[must_use]
    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Marks the column as a foreign key referencing `table(column)`.
    #[must_use]
    pub fn foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key = true;
        self.foreign_key_table = Some(table.into());
        self.foreign_key_column = Some(column.into());
        self
    }

    /// Marks the column as a foreign key with a possibly incomplete target.
    ///
    /// [`build`](Self::build) fails unless both parts are present.
    #[must_use]
    pub fn foreign_key_parts(mut self, table: Option<String>, column: Option<String>) -> Self {
        self.foreign_key = true;
        self.foreign_key_table = table;
        self.foreign_key_column = column;
        self
    }

    /// Sets the ON UPDATE action of the foreign key.
    #[must_use]
    pub fn on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }

    /// Sets the ON DELETE action of the foreign key.
    #[must_use]
    pub fn on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    /// Sets the raw SQL default value.
    #[must_use]
    pub fn default_value(mut self, value: impl Into<String>) -> Self {
        self.default_value = Some(value.into());
        self
    }

    /// Builds the column.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyName`] for a blank name and
    /// [`SchemaError::ForeignKeyTarget`] for a foreign key without both a
    /// target table and a target column.
    pub fn build(self) -> Result<ColumnInfo, SchemaError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SchemaError::EmptyName { kind: "Column" });
        }

        let foreign_key = if self.foreign_key {
            let table = non_blank(self.foreign_key_table);
            let column = non_blank(self.foreign_key_column);
            match (table, column) {
                (Some(table), Some(column)) => Some(ForeignKeyRef {
                    table,
                    column,
                    on_update: self.on_update,
                    on_delete: self.on_delete,
                }),
                _ => return Err(SchemaError::ForeignKeyTarget { column: name }),
            }
        } else {
            None
        };

        Ok(ColumnInfo {
            name,
            qualified_type: self.qualified_type.trim().to_string(),
            primary_key: self.primary_key,
            unique: self.unique,
            foreign_key,
            default_value: non_blank(self.default_value),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Schema definition for a table.
///
/// Always contains `_id` and the default columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "TableDecl", into = "TableDecl")]
pub struct TableInfo {
    name: String,
    columns: BTreeMap<String, ColumnInfo>,
}

impl TableInfo {
    /// Starts building a table.
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder::new(name)
    }

    /// Table name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Gets a column by name.
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.get(name)
    }

    /// Returns true if the table has a column with this name.
    #[must_use]
    pub fn contains_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    /// Number of columns, implicit ones included.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// All columns in canonical order.
    #[must_use]
    pub fn columns(&self) -> Vec<&ColumnInfo> {
        let mut columns: Vec<&ColumnInfo> = self.columns.values().collect();
        columns.sort();
        columns
    }

    /// Foreign key columns in canonical order.
    #[must_use]
    pub fn foreign_key_columns(&self) -> Vec<&ColumnInfo> {
        self.columns()
            .into_iter()
            .filter(|c| c.is_foreign_key())
            .collect()
    }

    /// Non foreign key columns in canonical order.
    #[must_use]
    pub fn non_foreign_key_columns(&self) -> Vec<&ColumnInfo> {
        self.columns()
            .into_iter()
            .filter(|c| !c.is_foreign_key())
            .collect()
    }

    /// Column names in canonical order.
    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns().into_iter().map(ColumnInfo::name).collect()
    }

    /// Inserts or replaces a column.
    pub(crate) fn upsert_column(&mut self, column: ColumnInfo) {
        self.columns.insert(column.name.clone(), column);
    }
}

/// Fluent builder for [`TableInfo`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    columns: Vec<ColumnInfo>,
}

impl TableBuilder {
    /// Creates a builder for the named table.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// Adds a column. A later column with the same name replaces an earlier one.
    #[must_use]
    pub fn column(mut self, column: ColumnInfo) -> Self {
        self.columns.push(column);
        self
    }

    /// Adds several columns.
    #[must_use]
    pub fn columns(mut self, columns: impl IntoIterator<Item = ColumnInfo>) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Builds the table, injecting any implicit column not supplied.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError::EmptyName`] for a blank table name.
    pub fn build(self) -> Result<TableInfo, SchemaError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(SchemaError::EmptyName { kind: "Table" });
        }

        let mut columns: BTreeMap<String, ColumnInfo> = self
            .columns
            .into_iter()
            .map(|c| (c.name.clone(), c))
            .collect();
        for implicit in implicit_columns() {
            columns.entry(implicit.name.clone()).or_insert(implicit);
        }

        Ok(TableInfo { name, columns })
    }
}

/// Mapping from table name to table schema.
///
/// This is the unit the diff engine compares: one instance describes the
/// desired schema, another the schema projected from the migration log.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ContextDecl", into = "ContextDecl")]
pub struct TableContext {
    tables: BTreeMap<String, TableInfo>,
}

impl TableContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a table to the context.
    #[must_use]
    pub fn table(mut self, table: TableInfo) -> Self {
        self.insert(table);
        self
    }

    /// Inserts a table, returning the one it replaced.
    pub fn insert(&mut self, table: TableInfo) -> Option<TableInfo> {
        self.tables.insert(table.name.clone(), table)
    }

    /// Removes a table by name.
    pub fn remove(&mut self, name: &str) -> Option<TableInfo> {
        self.tables.remove(name)
    }

    /// Gets a table by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    /// Returns true if the context has a table with this name.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    /// Tables ordered by name.
    pub fn tables(&self) -> impl Iterator<Item = &TableInfo> {
        self.tables.values()
    }

    /// Table names in order.
    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    /// Number of tables.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if there are no tables.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<TableInfo> for TableContext {
    fn from_iter<I: IntoIterator<Item = TableInfo>>(iter: I) -> Self {
        let mut context = Self::new();
        for table in iter {
            context.insert(table);
        }
        context
    }
}

// Serialized forms. Deserialization goes through the builders so a JSON
// document gets the same validation as code.

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColumnDecl {
    name: String,
    #[serde(alias = "type")]
    qualified_type: String,
    #[serde(default, skip_serializing_if = "is_false")]
    primary_key: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    unique: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    foreign_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    foreign_key_table: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    foreign_key_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_update: Option<ForeignKeyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    on_delete: Option<ForeignKeyAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl TryFrom<ColumnDecl> for ColumnInfo {
    type Error = SchemaError;

    fn try_from(decl: ColumnDecl) -> Result<Self, Self::Error> {
        let mut builder = ColumnBuilder::new(decl.name, decl.qualified_type);
        if decl.primary_key {
            builder = builder.primary_key();
        }
        if decl.unique {
            builder = builder.unique();
        }
        // A half-declared target is a foreign key that fails validation.
        if decl.foreign_key || decl.foreign_key_table.is_some() || decl.foreign_key_column.is_some()
        {
            builder = builder.foreign_key_parts(decl.foreign_key_table, decl.foreign_key_column);
        }
        if let Some(action) = decl.on_update {
            builder = builder.on_update(action);
        }
        if let Some(action) = decl.on_delete {
            builder = builder.on_delete(action);
        }
        if let Some(default) = decl.default_value {
            builder = builder.default_value(default);
        }
        builder.build()
    }
}

impl From<ColumnInfo> for ColumnDecl {
    fn from(column: ColumnInfo) -> Self {
        let (foreign_key_table, foreign_key_column, on_update, on_delete) = match column.foreign_key
        {
            Some(fk) => (
                Some(fk.table),
                Some(fk.column),
                Some(fk.on_update),
                Some(fk.on_delete),
            ),
            None => (None, None, None, None),
        };
        Self {
            foreign_key: foreign_key_table.is_some(),
            name: column.name,
            qualified_type: column.qualified_type,
            primary_key: column.primary_key,
            unique: column.unique,
            foreign_key_table,
            foreign_key_column,
            on_update,
            on_delete,
            default_value: column.default_value,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct TableDecl {
    name: String,
    #[serde(default)]
    columns: Vec<ColumnInfo>,
}

impl TryFrom<TableDecl> for TableInfo {
    type Error = SchemaError;

    fn try_from(decl: TableDecl) -> Result<Self, Self::Error> {
        TableBuilder::new(decl.name).columns(decl.columns).build()
    }
}

impl From<TableInfo> for TableDecl {
    fn from(table: TableInfo) -> Self {
        let mut columns: Vec<ColumnInfo> = table.columns.into_values().collect();
        columns.sort();
        Self {
            name: table.name,
            columns,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ContextDecl {
    #[serde(default)]
    tables: Vec<TableInfo>,
}

impl From<ContextDecl> for TableContext {
    fn from(decl: ContextDecl) -> Self {
        decl.tables.into_iter().collect()
    }
}

impl From<TableContext> for ContextDecl {
    fn from(context: TableContext) -> Self {
        Self {
            tables: context.tables.into_values().collect(),
        }
    }
}
