//! Column type metadata reported by the primary store.

use std::collections::HashMap;
use std::convert::Infallible;
use std::str::FromStr;

/// Column types keyed by field name.
pub type ColumnTypes = HashMap<String, ColumnType>;

/// Storage type of a primary-store column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    Varchar,
    Char,
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Other(std::string::String),
}

impl ColumnType {
    /// Parse a type tag, case-insensitively. Unknown tags become `Other`.
    pub fn parse(tag: &str) -> Self {
        match tag.trim().to_ascii_lowercase().as_str() {
            "text" | "longtext" | "mediumtext" | "tinytext" => ColumnType::Text,
            "varchar" => ColumnType::Varchar,
            "char" => ColumnType::Char,
            "string" => ColumnType::String,
            "integer" | "int" | "biginteger" | "bigint" | "smallint" => ColumnType::Integer,
            "float" | "double" | "decimal" => ColumnType::Float,
            "boolean" | "bool" => ColumnType::Boolean,
            "datetime" | "timestamp" | "date" | "time" => ColumnType::Datetime,
            other => ColumnType::Other(other.to_string()),
        }
    }

    /// Whether values of this column are eligible for the text index.
    pub fn is_text_like(&self) -> bool {
        matches!(
            self,
            ColumnType::Text | ColumnType::Varchar | ColumnType::Char | ColumnType::String
        )
    }
}

impl FromStr for ColumnType {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}
