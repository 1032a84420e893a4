//! Migration log entries.
//!
//! A [`Migration`] is one immutable fact in the migration log: a SQL
//! statement that was applied, plus (on the last record of each logical
//! operation) enough detail to replay the operation into a schema.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::LogError;
use crate::schema::ForeignKeyAction;

/// Kind of schema change a migration record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MigrationType {
    /// A new table with its default columns.
    CreateTable,
    /// A plain column added to an existing table.
    AlterTableAddColumn,
    /// A unique column added to an existing table.
    AlterTableAddUnique,
    /// An existing column made unique.
    AddUniqueIndex,
    /// A foreign key column, added by rebuilding the table.
    AddForeignKeyReference,
    /// A dropped table.
    DropTable,
}

impl MigrationType {
    /// All migration types, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::CreateTable,
        Self::AlterTableAddColumn,
        Self::AlterTableAddUnique,
        Self::AddUniqueIndex,
        Self::AddForeignKeyReference,
        Self::DropTable,
    ];

    /// Execution priority; lower runs first.
    #[must_use]
    pub fn priority(self) -> u8 {
        match self {
            Self::CreateTable => 0,
            Self::AlterTableAddColumn | Self::AlterTableAddUnique | Self::AddUniqueIndex => 1,
            Self::AddForeignKeyReference => 2,
            Self::DropTable => 3,
        }
    }

    /// Name used in the log.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateTable => "CREATE_TABLE",
            Self::AlterTableAddColumn => "ALTER_TABLE_ADD_COLUMN",
            Self::AlterTableAddUnique => "ALTER_TABLE_ADD_UNIQUE",
            Self::AddUniqueIndex => "ADD_UNIQUE_INDEX",
            Self::AddForeignKeyReference => "ADD_FOREIGN_KEY_REFERENCE",
            Self::DropTable => "DROP_TABLE",
        }
    }

    /// Whether a replayable record of this type must name a column.
    #[must_use]
    pub fn requires_column(self) -> bool {
        !matches!(self, Self::CreateTable | Self::DropTable)
    }
}

impl FromStr for MigrationType {
    type Err = LogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(trimmed))
            .ok_or_else(|| LogError::UnknownMigrationType(trimmed.to_string()))
    }
}

impl fmt::Display for MigrationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record of the migration log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "MigrationRecord")]
pub struct Migration {
    #[serde(skip_serializing_if = "Option::is_none")]
    db_version: Option<u32>,
    table_name: String,
    migration_type: MigrationType,
    query: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    column_qualified_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_key_table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    foreign_key_column: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_update: Option<ForeignKeyAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    on_delete: Option<ForeignKeyAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_value: Option<String>,
    is_last_in_set: bool,
}

impl Migration {
    /// Creates an audit record. Use [`last_in_set`](Self::last_in_set) to
    /// make it the replayable record of its set.
    #[must_use]
    pub fn new(
        db_version: Option<u32>,
        table_name: impl Into<String>,
        migration_type: MigrationType,
        query: impl Into<String>,
    ) -> Self {
        Self {
            db_version,
            table_name: table_name.into(),
            migration_type,
            query: query.into(),
            column_name: None,
            column_qualified_type: None,
            foreign_key_table: None,
            foreign_key_column: None,
            on_update: None,
            on_delete: None,
            default_value: None,
            is_last_in_set: false,
        }
    }

    /// Sets the column this record touches.
    #[must_use]
    pub fn with_column(
        mut self,
        name: impl Into<String>,
        qualified_type: impl Into<String>,
    ) -> Self {
        self.column_name = Some(name.into());
        self.column_qualified_type = Some(qualified_type.into());
        self
    }

    /// Sets the column name alone.
    #[must_use]
    pub fn with_column_name(mut self, name: impl Into<String>) -> Self {
        self.column_name = Some(name.into());
        self
    }

    /// Sets the foreign key target.
    #[must_use]
    pub fn with_foreign_key(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.foreign_key_table = Some(table.into());
        self.foreign_key_column = Some(column.into());
        self
    }

    /// Sets the foreign key actions.
    #[must_use]
    pub fn with_foreign_key_actions(
        mut self,
        on_update: ForeignKeyAction,
        on_delete: ForeignKeyAction,
    ) -> Self {
        self.on_update = Some(on_update);
        self.on_delete = Some(on_delete);
        self
    }

    /// Sets the column default.
    #[must_use]
    pub fn with_default(mut self, value: Option<String>) -> Self {
        self.default_value = value;
        self
    }

    /// Marks this record as the replayable one of its set.
    #[must_use]
    pub fn last_in_set(mut self) -> Self {
        self.is_last_in_set = true;
        self
    }

    /// Database version, if known.
    #[must_use]
    pub fn db_version(&self) -> Option<u32> {
        self.db_version
    }

    /// Table the record touches.
    #[must_use]
    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    /// Kind of change.
    #[must_use]
    pub fn migration_type(&self) -> MigrationType {
        self.migration_type
    }

    /// SQL statement that was applied. Kept for audit only.
    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Column name, for column-bearing records.
    #[must_use]
    pub fn column_name(&self) -> Option<&str> {
        self.column_name.as_deref()
    }

    /// Logical type of the column.
    #[must_use]
    pub fn column_qualified_type(&self) -> Option<&str> {
        self.column_qualified_type.as_deref()
    }

    /// Referenced table, for foreign key records.
    #[must_use]
    pub fn foreign_key_table(&self) -> Option<&str> {
        self.foreign_key_table.as_deref()
    }

    /// Referenced column, for foreign key records.
    #[must_use]
    pub fn foreign_key_column(&self) -> Option<&str> {
        self.foreign_key_column.as_deref()
    }

    /// Action on update of the referenced row, if one was recorded.
    #[must_use]
    pub fn on_update(&self) -> Option<ForeignKeyAction> {
        self.on_update
    }

    /// Action on delete of the referenced row, if one was recorded.
    #[must_use]
    pub fn on_delete(&self) -> Option<ForeignKeyAction> {
        self.on_delete
    }

    /// Column default, if one was recorded.
    #[must_use]
    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Whether this record is replayed.
    #[must_use]
    pub fn is_last_in_set(&self) -> bool {
        self.is_last_in_set
    }

    /// Checks that a replayable record carries what its type needs.
    ///
    /// # Errors
    ///
    /// Returns the first missing piece of detail.
    pub fn validate(&self) -> Result<(), LogError> {
        if self.table_name.trim().is_empty() {
            return Err(LogError::MissingTableName);
        }
        if self.query.trim().is_empty() {
            return Err(LogError::MissingQuery {
                table: self.table_name.clone(),
            });
        }
        if !self.is_last_in_set || !self.migration_type.requires_column() {
            return Ok(());
        }

        let column = match self.column_name.as_deref().map(str::trim) {
            Some(column) if !column.is_empty() => column,
            _ => {
                return Err(LogError::MissingColumnName {
                    table: self.table_name.clone(),
                    migration_type: self.migration_type.to_string(),
                });
            }
        };

        if self.migration_type == MigrationType::AddForeignKeyReference {
            let table_ok = self
                .foreign_key_table
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            let column_ok = self
                .foreign_key_column
                .as_deref()
                .is_some_and(|c| !c.trim().is_empty());
            if !(table_ok && column_ok) {
                return Err(LogError::MissingForeignKeyTarget {
                    table: self.table_name.clone(),
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }
}

/// A log record as found in a source, before validation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct MigrationRecord {
    #[serde(default)]
    db_version: Option<RecordVersion>,
    #[serde(default)]
    table_name: Option<String>,
    #[serde(default)]
    migration_type: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    column_name: Option<String>,
    #[serde(default)]
    column_qualified_type: Option<String>,
    #[serde(default)]
    foreign_key_table: Option<String>,
    #[serde(default)]
    foreign_key_column: Option<String>,
    #[serde(default)]
    on_update: Option<ForeignKeyAction>,
    #[serde(default)]
    on_delete: Option<ForeignKeyAction>,
    #[serde(default)]
    default_value: Option<String>,
    #[serde(default)]
    is_last_in_set: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RecordVersion {
    Number(i64),
    Text(String),
}

impl RecordVersion {
    fn parse(self) -> Result<u32, LogError> {
        let parsed = match &self {
            Self::Number(n) => u32::try_from(*n).ok(),
            Self::Text(s) => s.trim().parse::<u32>().ok(),
        };
        match parsed {
            Some(version) if version >= 1 => Ok(version),
            _ => Err(LogError::InvalidVersion(match self {
                Self::Number(n) => n.to_string(),
                Self::Text(s) => s,
            })),
        }
    }
}

impl TryFrom<MigrationRecord> for Migration {
    type Error = LogError;

    fn try_from(record: MigrationRecord) -> Result<Self, Self::Error> {
        let table_name = record
            .table_name
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(LogError::MissingTableName)?;
        let query = record
            .query
            .filter(|q| !q.trim().is_empty())
            .ok_or_else(|| LogError::MissingQuery {
                table: table_name.clone(),
            })?;
        let db_version = record.db_version.map(RecordVersion::parse).transpose()?;
        let migration_type = record
            .migration_type
            .ok_or_else(|| LogError::MissingMigrationType {
                table: table_name.clone(),
            })?
            .parse::<MigrationType>()?;

        let migration = Self {
            db_version,
            table_name,
            migration_type,
            query,
            column_name: record.column_name,
            column_qualified_type: record.column_qualified_type,
            foreign_key_table: record.foreign_key_table,
            foreign_key_column: record.foreign_key_column,
            on_update: record.on_update,
            on_delete: record.on_delete,
            default_value: record.default_value,
            is_last_in_set: record.is_last_in_set,
        };
        migration.validate()?;
        Ok(migration)
    }
}

/// Orders two records by version, unknown versions last.
#[must_use]
pub fn cmp_version(a: &Migration, b: &Migration) -> Ordering {
    match (a.db_version, b.db_version) {
        (Some(a), Some(b)) => a.cmp(&b),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Stable-sorts records by version, keeping log order within a version.
pub fn sort_by_version(migrations: &mut [Migration]) {
    migrations.sort_by(cmp_version);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_tiers() {
        assert_eq!(MigrationType::CreateTable.priority(), 0);
        assert_eq!(MigrationType::AlterTableAddColumn.priority(), 1);
        assert_eq!(MigrationType::AlterTableAddUnique.priority(), 1);
        assert_eq!(MigrationType::AddUniqueIndex.priority(), 1);
        assert_eq!(MigrationType::AddForeignKeyReference.priority(), 2);
        assert_eq!(MigrationType::DropTable.priority(), 3);
    }

    #[test]
    fn test_type_names_round_trip() {
        for ty in MigrationType::ALL {
            assert_eq!(ty.as_str().parse::<MigrationType>().unwrap(), ty);
            let json = serde_json::to_string(&ty).unwrap();
            assert_eq!(json, format!("\"{}\"", ty.as_str()));
        }
        assert_eq!(
            "create_table".parse::<MigrationType>().unwrap(),
            MigrationType::CreateTable
        );
        assert_eq!(
            "RENAME_TABLE".parse::<MigrationType>(),
            Err(LogError::UnknownMigrationType("RENAME_TABLE".to_string()))
        );
    }

    #[test]
    fn test_unknown_version_sorts_last() {
        let mut migrations = vec![
            Migration::new(None, "a", MigrationType::CreateTable, "q;"),
            Migration::new(Some(2), "b", MigrationType::CreateTable, "q;"),
            Migration::new(Some(1), "c", MigrationType::CreateTable, "q;"),
            Migration::new(Some(2), "d", MigrationType::CreateTable, "q;"),
        ];
        sort_by_version(&mut migrations);
        let tables: Vec<&str> = migrations.iter().map(Migration::table_name).collect();
        assert_eq!(tables, vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_validate_requires_detail_only_when_last() {
        let audit = Migration::new(Some(1), "t", MigrationType::AlterTableAddColumn, "q;");
        assert!(audit.validate().is_ok());

        let last = audit.clone().last_in_set();
        assert!(matches!(
            last.validate(),
            Err(LogError::MissingColumnName { .. })
        ));

        let fk = Migration::new(Some(1), "t", MigrationType::AddForeignKeyReference, "q;")
            .with_column("owner", "long")
            .last_in_set();
        assert_eq!(
            fk.validate(),
            Err(LogError::MissingForeignKeyTarget {
                table: "t".to_string(),
                column: "owner".to_string()
            })
        );
        assert!(fk.with_foreign_key("user", "_id").validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_missing_query() {
        let record = Migration::new(Some(1), "t", MigrationType::CreateTable, " ").last_in_set();
        assert!(matches!(record.validate(), Err(LogError::MissingQuery { .. })));
    }

    #[test]
    fn test_decode_record_versions() {
        let record: Migration = serde_json::from_str(
            r#"{"dbVersion": "7", "tableName": "t", "migrationType": "CREATE_TABLE",
                "query": "CREATE TABLE t(_id INTEGER PRIMARY KEY);", "isLastInSet": true}"#,
        )
        .unwrap();
        assert_eq!(record.db_version(), Some(7));
        assert!(record.is_last_in_set());

        let record: Migration = serde_json::from_str(
            r#"{"tableName": "t", "migrationType": "DROP_TABLE", "query": "DROP TABLE t;"}"#,
        )
        .unwrap();
        assert_eq!(record.db_version(), None);
        assert!(!record.is_last_in_set());

        let raw: MigrationRecord = serde_json::from_str(
            r#"{"dbVersion": 0, "tableName": "t", "migrationType": "CREATE_TABLE", "query": "q;"}"#,
        )
        .unwrap();
        assert_eq!(
            Migration::try_from(raw),
            Err(LogError::InvalidVersion("0".to_string()))
        );

        let raw: MigrationRecord = serde_json::from_str(
            r#"{"dbVersion": "v2", "tableName": "t", "migrationType": "CREATE_TABLE", "query": "q;"}"#,
        )
        .unwrap();
        assert_eq!(
            Migration::try_from(raw),
            Err(LogError::InvalidVersion("v2".to_string()))
        );
    }

    #[test]
    fn test_serializes_camel_case() {
        let record = Migration::new(Some(3), "t", MigrationType::AlterTableAddColumn, "q;")
            .with_column("c", "string")
            .last_in_set();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["dbVersion"], 3);
        assert_eq!(value["migrationType"], "ALTER_TABLE_ADD_COLUMN");
        assert_eq!(value["columnQualifiedType"], "string");
        assert_eq!(value["isLastInSet"], true);
        assert!(value.get("foreignKeyTable").is_none());
    }

    #[test]
    fn test_foreign_key_actions_round_trip() {
        let record = Migration::new(Some(2), "post", MigrationType::AddForeignKeyReference, "q;")
            .with_column("author_id", "long")
            .with_foreign_key("user", "_id")
            .with_foreign_key_actions(ForeignKeyAction::NoAction, ForeignKeyAction::SetNull)
            .last_in_set();
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["onUpdate"], "NO_ACTION");
        assert_eq!(value["onDelete"], "SET_NULL");

        let decoded: Migration = serde_json::from_value(value).unwrap();
        assert_eq!(decoded, record);
        assert_eq!(decoded.on_delete(), Some(ForeignKeyAction::SetNull));

        let legacy: Migration = serde_json::from_str(
            r#"{"dbVersion": 1, "tableName": "post", "migrationType": "ADD_FOREIGN_KEY_REFERENCE",
                "query": "q;", "columnName": "author_id", "foreignKeyTable": "user",
                "foreignKeyColumn": "_id", "isLastInSet": true}"#,
        )
        .unwrap();
        assert_eq!(legacy.on_update(), None);
        assert_eq!(legacy.on_delete(), None);
    }
}
