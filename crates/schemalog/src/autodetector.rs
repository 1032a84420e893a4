//! Autodetector for generating migrations from schema changes.
//!
//! Compares the schema projected from the migration log (the current
//! schema) with the schema the host application declares (the desired
//! schema) and produces the statement generators that bring the former
//! to the latter. Changes are additive only: tables and columns missing
//! from the desired schema are left in place.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use tracing::{debug, info, warn};

use crate::migration::Migration;
use crate::operations::QueryGenerator;
use crate::schema::{TableContext, TableInfo};

/// Options for the diff engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffOptions {
    /// Whether created and rebuilt tables get the `modified` trigger.
    pub modified_trigger: bool,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            modified_trigger: true,
        }
    }
}

impl DiffOptions {
    /// Creates default options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Disables the `modified` trigger.
    #[must_use]
    pub fn without_modified_trigger(mut self) -> Self {
        self.modified_trigger = false;
        self
    }
}

/// The result of a diff: generators in execution order.
///
/// The flattened SQL is rendered once, on first request.
#[derive(Debug, Clone, Default)]
pub struct SchemaDiff {
    generators: Vec<QueryGenerator>,
    sql: OnceLock<Vec<String>>,
}

impl SchemaDiff {
    /// Wraps generators that are already in execution order.
    #[must_use]
    pub fn new(generators: Vec<QueryGenerator>) -> Self {
        Self {
            generators,
            sql: OnceLock::new(),
        }
    }

    /// Generators in execution order.
    #[must_use]
    pub fn generators(&self) -> &[QueryGenerator] {
        &self.generators
    }

    /// Consumes the diff, returning its generators.
    #[must_use]
    pub fn into_generators(self) -> Vec<QueryGenerator> {
        self.generators
    }

    /// All statements of all generators, in execution order.
    pub fn sql(&self) -> &[String] {
        self.sql.get_or_init(|| {
            self.generators
                .iter()
                .flat_map(QueryGenerator::generate)
                .collect()
        })
    }

    /// Log records describing the whole diff as `version`.
    #[must_use]
    pub fn to_migrations(&self, version: u32) -> Vec<Migration> {
        self.generators
            .iter()
            .flat_map(|g| g.to_migrations(version))
            .collect()
    }

    /// Returns true if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// Number of generators.
    #[must_use]
    pub fn len(&self) -> usize {
        self.generators.len()
    }
}

/// Compares desired schemas against a fixed current schema.
#[derive(Debug, Clone)]
pub struct DiffGenerator {
    current: TableContext,
    options: DiffOptions,
}

impl DiffGenerator {
    /// Creates a diff engine against `current` with default options.
    #[must_use]
    pub fn new(current: TableContext) -> Self {
        Self::with_options(current, DiffOptions::default())
    }

    /// Creates a diff engine with custom options.
    #[must_use]
    pub fn with_options(current: TableContext, options: DiffOptions) -> Self {
        Self { current, options }
    }

    /// The schema changes are computed against.
    #[must_use]
    pub fn current(&self) -> &TableContext {
        &self.current
    }

    /// Computes the generators that bring the current schema to `desired`.
    ///
    /// Generators are stably ordered by priority, so every table is
    /// created before any rebuild that may reference it.
    #[must_use]
    pub fn analyze_diff(&self, desired: &TableContext) -> SchemaDiff {
        let mut generators = Vec::new();

        for table in desired.tables() {
            match self.current.get(table.name()) {
                None => {
                    debug!(table = table.name(), "New table");
                    generators.push(
                        QueryGenerator::create_table(table.clone())
                            .with_modified_trigger(self.options.modified_trigger),
                    );
                }
                Some(current) => self.diff_table(current, table, &mut generators),
            }
        }

        for name in self.current.table_names() {
            if !desired.contains(name) {
                debug!(table = name, "Table missing from desired schema is kept");
            }
        }

        warn_on_index_name_clashes(&generators);
        generators.sort_by_key(QueryGenerator::priority);
        info!(changes = generators.len(), "Computed schema diff");
        SchemaDiff::new(generators)
    }

    fn diff_table(&self, current: &TableInfo, desired: &TableInfo, out: &mut Vec<QueryGenerator>) {
        let table = desired.name();
        // What the table looks like once the earlier changes have run.
        let mut working = current.clone();
        let mut foreign_keys = Vec::new();

        for column in desired.columns() {
            match current.column(column.name()) {
                None if column.is_foreign_key() => foreign_keys.push(column.clone()),
                None => {
                    working.upsert_column(column.clone());
                    out.push(if column.is_unique() {
                        QueryGenerator::add_unique_column(table, column.clone())
                    } else {
                        QueryGenerator::add_column(table, column.clone())
                    });
                }
                Some(existing) => {
                    if column.is_unique() && !existing.is_unique() {
                        if let Ok(unique) = existing.to_builder().unique().build() {
                            working.upsert_column(unique);
                        }
                        out.push(QueryGenerator::add_unique_index(table, column.name()));
                    }
                    if column.foreign_key() != existing.foreign_key() {
                        debug!(
                            table,
                            column = column.name(),
                            "Foreign key change on an existing column is not migrated"
                        );
                    }
                }
            }
        }

        for column in foreign_keys {
            working.upsert_column(column.clone());
            out.push(
                QueryGenerator::add_foreign_key(working.clone(), column)
                    .with_modified_trigger(self.options.modified_trigger),
            );
        }
    }
}

/// Unique columns added to existing tables share one index namespace.
fn warn_on_index_name_clashes(generators: &[QueryGenerator]) {
    let mut owners: BTreeMap<&str, &str> = BTreeMap::new();
    for generator in generators {
        if let QueryGenerator::AddUniqueColumn { table, column } = generator {
            if let Some(first) = owners.insert(column.name(), table.as_str()) {
                warn!(
                    index = column.name(),
                    first,
                    second = table.as_str(),
                    "Unique column index name is used by two tables"
                );
            }
        }
    }
}
