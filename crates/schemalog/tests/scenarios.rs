//! Integration tests for the diff engine and statement generators.
//!
//! Each test sets up a current schema (directly, or by replaying a log),
//! diffs it against a desired schema and checks the exact SQL produced.

use schemalog::prelude::*;

const CREATE_T: &str = "CREATE TABLE t(_id INTEGER PRIMARY KEY, \
created DATETIME DEFAULT CURRENT_TIMESTAMP, deleted INTEGER DEFAULT 0, \
modified DATETIME DEFAULT CURRENT_TIMESTAMP);";

const TRIGGER_T: &str = "CREATE TRIGGER t_modified AFTER UPDATE ON t FOR EACH ROW \
BEGIN UPDATE t SET modified=CURRENT_TIMESTAMP WHERE _id=NEW._id; END;";

fn column(name: &str, ty: &str) -> ColumnInfo {
    ColumnInfo::builder(name, ty).build().unwrap()
}

fn table(name: &str, columns: Vec<ColumnInfo>) -> TableInfo {
    TableInfo::builder(name).columns(columns).build().unwrap()
}

fn sql_for(current: &TableContext, desired: &TableContext) -> Vec<String> {
    DiffGenerator::new(current.clone())
        .analyze_diff(desired)
        .sql()
        .to_vec()
}

// =============================================================================
// Scenarios
// =============================================================================

#[test]
fn test_new_table_with_default_columns() {
    let desired = TableContext::new().table(table("t", vec![]));
    assert_eq!(
        sql_for(&TableContext::new(), &desired),
        vec![CREATE_T.to_string(), TRIGGER_T.to_string()]
    );
}

#[test]
fn test_added_decimal_column() {
    let current = TableContext::new().table(table("t", vec![]));
    let desired =
        TableContext::new().table(table("t", vec![column("big_decimal_column", "decimal")]));
    assert_eq!(
        sql_for(&current, &desired),
        vec!["ALTER TABLE t ADD COLUMN big_decimal_column REAL;".to_string()]
    );
}

#[test]
fn test_added_foreign_key_rebuilds_table() {
    let current = TableContext::new()
        .table(table("user", vec![]))
        .table(table("t", vec![]));
    let long_column = ColumnInfo::builder("long_column", "long")
        .foreign_key("user", "_id")
        .build()
        .unwrap();
    let desired = TableContext::new()
        .table(table("user", vec![]))
        .table(table("t", vec![long_column]));

    let list = "_id, created, deleted, modified, long_column";
    assert_eq!(
        sql_for(&current, &desired),
        vec![
            "DROP TABLE IF EXISTS temp_t;".to_string(),
            "ALTER TABLE t ADD COLUMN long_column INTEGER;".to_string(),
            format!("CREATE TEMP TABLE temp_t AS SELECT {list} FROM t;"),
            "DROP TABLE IF EXISTS t;".to_string(),
            "CREATE TABLE t(_id INTEGER PRIMARY KEY, \
             created DATETIME DEFAULT CURRENT_TIMESTAMP, deleted INTEGER DEFAULT 0, \
             modified DATETIME DEFAULT CURRENT_TIMESTAMP, long_column INTEGER, \
             FOREIGN KEY(long_column) REFERENCES user(_id) ON UPDATE CASCADE ON DELETE CASCADE);"
                .to_string(),
            TRIGGER_T.to_string(),
            format!("INSERT INTO t SELECT {list} FROM temp_t;"),
            "DROP TABLE IF EXISTS temp_t;".to_string(),
        ]
    );
}

#[test]
fn test_existing_column_made_unique() {
    let current = TableContext::new().table(table("t", vec![column("string_column", "string")]));
    let desired = TableContext::new().table(table(
        "t",
        vec![ColumnInfo::builder("string_column", "string")
            .unique()
            .build()
            .unwrap()],
    ));
    assert_eq!(
        sql_for(&current, &desired),
        vec!["CREATE UNIQUE INDEX t_string_column ON t(string_column);".to_string()]
    );
}

#[test]
fn test_only_last_record_of_a_set_is_replayed() {
    let log = MigrationLog::load(vec![MemorySource::new(
        "1.json",
        r#"[
            {"dbVersion": 1, "tableName": "t", "migrationType": "CREATE_TABLE",
             "query": "CREATE TABLE t(_id INTEGER PRIMARY KEY);", "isLastInSet": true},
            {"dbVersion": 1, "tableName": "t", "migrationType": "ALTER_TABLE_ADD_UNIQUE",
             "query": "ALTER TABLE t ADD COLUMN code TEXT;", "columnName": "ignored",
             "columnQualifiedType": "string", "isLastInSet": false},
            {"dbVersion": 1, "tableName": "t", "migrationType": "ALTER_TABLE_ADD_UNIQUE",
             "query": "CREATE UNIQUE INDEX code ON t(code);", "columnName": "code",
             "columnQualifiedType": "string", "isLastInSet": true}
        ]"#,
    )]);
    assert!(log.diagnostics().is_empty());

    let context = MigrationContext::from_log(&log);
    let t = context.table_context().get("t").unwrap();
    assert!(!t.contains_column("ignored"));
    assert!(t.column("code").unwrap().is_unique());
}

// =============================================================================
// Properties
// =============================================================================

fn blog() -> TableContext {
    TableContext::new()
        .table(table(
            "user",
            vec![
                ColumnInfo::builder("email", "string").unique().build().unwrap(),
                column("name", "string"),
            ],
        ))
        .table(table(
            "post",
            vec![
                column("title", "string"),
                column("score", "double"),
                ColumnInfo::builder("author_id", "long")
                    .foreign_key("user", "_id")
                    .build()
                    .unwrap(),
                ColumnInfo::builder("editor_id", "long")
                    .foreign_key("user", "_id")
                    .build()
                    .unwrap(),
            ],
        ))
}

#[test]
fn test_repeated_runs_are_byte_identical() {
    let current = TableContext::new().table(table("post", vec![column("title", "string")]));
    let first = sql_for(&current, &blog());
    let second = sql_for(&current.clone(), &blog());
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[test]
fn test_every_statement_is_terminated() {
    let current = TableContext::new().table(table("post", vec![column("title", "string")]));
    for sql in sql_for(&current, &blog()) {
        assert!(sql.ends_with(';'), "{sql}");
    }
}

#[test]
fn test_tables_created_before_rebuilds() {
    let current = TableContext::new().table(table("post", vec![column("title", "string")]));
    let diff = DiffGenerator::new(current).analyze_diff(&blog());

    let priorities: Vec<u8> = diff.generators().iter().map(QueryGenerator::priority).collect();
    let mut sorted = priorities.clone();
    sorted.sort_unstable();
    assert_eq!(priorities, sorted);

    let create_user = diff
        .generators()
        .iter()
        .position(|g| g.migration_type() == MigrationType::CreateTable && g.table_name() == "user")
        .unwrap();
    let first_rebuild = diff
        .generators()
        .iter()
        .position(|g| g.migration_type() == MigrationType::AddForeignKeyReference)
        .unwrap();
    assert!(create_user < first_rebuild);
}

#[test]
fn test_rebuild_copies_same_column_list() {
    let current = TableContext::new().table(table("post", vec![column("title", "string")]));
    let diff = DiffGenerator::new(current).analyze_diff(&blog());

    for generator in diff.generators() {
        if generator.migration_type() != MigrationType::AddForeignKeyReference {
            continue;
        }
        let sql = generator.generate();
        let copy_out = sql
            .iter()
            .find_map(|s| s.strip_prefix("CREATE TEMP TABLE temp_post AS SELECT "))
            .and_then(|s| s.strip_suffix(" FROM post;"))
            .unwrap();
        let copy_back = sql
            .iter()
            .find_map(|s| s.strip_prefix("INSERT INTO post SELECT "))
            .and_then(|s| s.strip_suffix(" FROM temp_post;"))
            .unwrap();
        assert_eq!(copy_out, copy_back);
    }
}

#[test]
fn test_second_rebuild_keeps_first_foreign_key() {
    let current = TableContext::new()
        .table(table("user", vec![]))
        .table(table("post", vec![column("title", "string")]));
    let diff = DiffGenerator::new(current).analyze_diff(&blog());

    let rebuilds: Vec<&QueryGenerator> = diff
        .generators()
        .iter()
        .filter(|g| g.migration_type() == MigrationType::AddForeignKeyReference)
        .collect();
    assert_eq!(rebuilds.len(), 2);

    let last_create = rebuilds[1]
        .generate()
        .into_iter()
        .find(|s| s.starts_with("CREATE TABLE post("))
        .unwrap();
    assert!(last_create.contains("FOREIGN KEY(author_id) REFERENCES user(_id)"));
    assert!(last_create.contains("FOREIGN KEY(editor_id) REFERENCES user(_id)"));
    assert!(rebuilds[1]
        .generate()
        .contains(&"ALTER TABLE post ADD COLUMN score REAL;".to_string()));
}

#[test]
fn test_diff_against_itself_is_empty() {
    let desired = blog();
    assert!(DiffGenerator::new(desired.clone()).analyze_diff(&desired).is_empty());
}

#[test]
fn test_replaying_diff_records_reaches_desired() {
    let current = TableContext::new()
        .table(table("user", vec![]))
        .table(table("post", vec![column("title", "string")]));
    let current_records = DiffGenerator::new(TableContext::new())
        .analyze_diff(&current)
        .to_migrations(1);
    assert_eq!(project(&current_records), current);

    let step = DiffGenerator::new(current).analyze_diff(&blog());
    let mut records = current_records;
    records.extend(step.to_migrations(2));
    assert_eq!(project(&records), blog());
}

#[test]
fn test_foreign_key_actions_survive_replay_and_rebuild() {
    let user = table("user", vec![]);
    let author = ColumnInfo::builder("author_id", "long")
        .foreign_key("user", "_id")
        .on_delete(ForeignKeyAction::SetNull)
        .build()
        .unwrap();
    let first = TableContext::new()
        .table(user.clone())
        .table(table("post", vec![author.clone()]));

    let records = DiffGenerator::new(TableContext::new())
        .analyze_diff(&first)
        .to_migrations(1);
    let replayed = project(&records);
    let target = replayed
        .get("post")
        .unwrap()
        .column("author_id")
        .unwrap()
        .foreign_key()
        .unwrap();
    assert_eq!(target.on_update, ForeignKeyAction::Cascade);
    assert_eq!(target.on_delete, ForeignKeyAction::SetNull);

    let editor = ColumnInfo::builder("editor_id", "long")
        .foreign_key("user", "_id")
        .build()
        .unwrap();
    let second = TableContext::new()
        .table(user)
        .table(table("post", vec![author, editor]));
    let sql = sql_for(&replayed, &second);

    let create = sql
        .iter()
        .find(|s| s.starts_with("CREATE TABLE post("))
        .unwrap();
    assert!(create.contains(
        "FOREIGN KEY(author_id) REFERENCES user(_id) ON UPDATE CASCADE ON DELETE SET NULL"
    ));
    assert!(create.contains(
        "FOREIGN KEY(editor_id) REFERENCES user(_id) ON UPDATE CASCADE ON DELETE CASCADE"
    ));
}
