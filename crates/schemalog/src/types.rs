//! Logical column types and their SQLite storage classes.
//!
//! Columns are declared with a logical type name (`long`, `string`,
//! `date`, ...). The SQLite dialect only cares about the storage class
//! each name resolves to.

use std::fmt;

/// SQLite storage class a logical type is rendered as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageClass {
    /// Integers, longs and booleans.
    Integer,
    /// Floating point and decimal numbers.
    Real,
    /// Strings.
    Text,
    /// Raw bytes.
    Blob,
    /// Dates and timestamps.
    DateTime,
}

impl StorageClass {
    /// Returns the SQL keyword for this storage class.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
            Self::DateTime => "DATETIME",
        }
    }
}

impl fmt::Display for StorageClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Logical type of a column as declared by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LogicalType {
    /// Boolean flag, stored as 0/1.
    Boolean,
    /// 8-bit integer.
    Byte,
    /// 16-bit integer.
    Short,
    /// 32-bit integer.
    Integer,
    /// 64-bit integer.
    Long,
    /// Single precision float.
    Float,
    /// Double precision float.
    Double,
    /// Arbitrary precision decimal.
    Decimal,
    /// Single character.
    Char,
    /// String.
    Text,
    /// Date, time or timestamp.
    Date,
    /// Byte array.
    Blob,
    /// A type name this translator does not recognize, kept verbatim.
    Other(String),
}

impl LogicalType {
    /// Parses a logical type name.
    ///
    /// Matching is case-insensitive and accepts the common qualified
    /// aliases (`java.lang.Long`, `java.util.Date`, `byte[]`, ...).
    /// Unrecognized names become [`LogicalType::Other`].
    #[must_use]
    pub fn parse(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "boolean" | "bool" | "java.lang.boolean" => Self::Boolean,
            "byte" | "java.lang.byte" => Self::Byte,
            "short" | "java.lang.short" => Self::Short,
            "int" | "integer" | "java.lang.integer" => Self::Integer,
            "long" | "java.lang.long" => Self::Long,
            "float" | "java.lang.float" => Self::Float,
            "double" | "java.lang.double" => Self::Double,
            "decimal" | "bigdecimal" | "java.math.bigdecimal" => Self::Decimal,
            "char" | "character" | "java.lang.character" => Self::Char,
            "string" | "text" | "java.lang.string" => Self::Text,
            "date" | "datetime" | "timestamp" | "java.util.date" | "java.sql.date"
            | "java.sql.timestamp" => Self::Date,
            "blob" | "bytes" | "byte[]" | "[b" => Self::Blob,
            _ => Self::Other(name.trim().to_string()),
        }
    }

    /// Returns the canonical name written to the migration log.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Integer => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
            Self::Decimal => "decimal",
            Self::Char => "char",
            Self::Text => "string",
            Self::Date => "date",
            Self::Blob => "blob",
            Self::Other(name) => name,
        }
    }

    /// Returns the SQLite storage class for this type.
    ///
    /// Unrecognized types fall back to [`StorageClass::Text`].
    #[must_use]
    pub fn storage_class(&self) -> StorageClass {
        match self {
            Self::Boolean | Self::Byte | Self::Short | Self::Integer | Self::Long => {
                StorageClass::Integer
            }
            Self::Float | Self::Double | Self::Decimal => StorageClass::Real,
            Self::Char | Self::Text => StorageClass::Text,
            Self::Date => StorageClass::DateTime,
            Self::Blob => StorageClass::Blob,
            Self::Other(_) => StorageClass::Text,
        }
    }

    /// Returns true if the name was not recognized.
    #[must_use]
    pub fn is_other(&self) -> bool {
        matches!(self, Self::Other(_))
    }
}

impl From<&str> for LogicalType {
    fn from(name: &str) -> Self {
        Self::parse(name)
    }
}

impl fmt::Display for LogicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
