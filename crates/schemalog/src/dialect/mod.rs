//! Database dialect implementations.
//!
//! A dialect turns statement generators into SQL text for one database
//! system. SQLite is the only target.

mod sqlite;

pub use sqlite::{SqliteDialect, TEMP_TABLE_PREFIX};

use crate::operations::QueryGenerator;
use crate::types::LogicalType;

/// Trait for database-specific SQL generation.
pub trait MigrationDialect: Send + Sync {
    /// Returns the dialect name.
    fn name(&self) -> &'static str;

    /// Returns the SQL type name for the given logical type.
    fn type_name(&self, logical_type: &LogicalType) -> &'static str;

    /// Generates the statements of one generator, each ending in `;`.
    fn generate_sql(&self, generator: &QueryGenerator) -> Vec<String>;
}
