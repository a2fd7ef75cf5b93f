//! Table and column definitions.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The fixed scalar type enumeration supported on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Int,
    Double,
    String,
    Date,
    Timestamp,
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScalarType::Bool => "bool",
            ScalarType::Int => "int",
            ScalarType::Double => "double",
            ScalarType::String => "string",
            ScalarType::Date => "date",
            ScalarType::Timestamp => "timestamp",
        };
        write!(f, "{}", name)
    }
}

/// A single column of a table definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub scalar_type: ScalarType,
    pub nullable: bool,
    #[serde(default)]
    pub description: String,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, scalar_type: ScalarType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            scalar_type,
            nullable,
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A table exposed by a provider: a name plus an ordered column list.
/// Read-only to consumers; fixed for the provider instance's lifetime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub columns: Vec<ColumnDef>,
}

impl TableDef {
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDef>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            columns,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Look up a column by name.
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableDef {
        TableDef::new(
            "users",
            vec![
                ColumnDef::new("id", ScalarType::Int, false),
                ColumnDef::new("name", ScalarType::String, true),
            ],
        )
    }

    #[test]
    fn column_lookup() {
        let t = users();
        assert_eq!(t.column("id").unwrap().scalar_type, ScalarType::Int);
        assert!(t.column("id").map(|c| !c.nullable).unwrap());
        assert!(t.column("missing").is_none());
    }

    #[test]
    fn column_names_preserve_order() {
        assert_eq!(users().column_names(), vec!["id", "name"]);
    }

    #[test]
    fn scalar_type_display() {
        assert_eq!(ScalarType::Timestamp.to_string(), "timestamp");
        assert_eq!(ScalarType::Int.to_string(), "int");
    }
}
