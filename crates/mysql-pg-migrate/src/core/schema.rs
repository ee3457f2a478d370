//! Schema and metadata types for columns and foreign keys.
//!
//! These types provide a database-agnostic representation of the catalog
//! metadata that the import pipeline needs. Names are kept exactly as the
//! catalog reports them; nothing here normalizes case.

use serde::{Deserialize, Serialize};

/// Role a column plays in the table's keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyRole {
    /// Not part of a primary or foreign key.
    #[default]
    None,
    /// Part of the primary key.
    Primary,
    /// Part of a foreign key (and not of the primary key).
    Foreign,
}

/// Column metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Column name, case preserved.
    pub name: String,

    /// Declared data type (informational only).
    pub data_type: String,

    /// Whether the column allows NULL.
    pub is_nullable: bool,

    /// Default value expression, if any.
    pub default: Option<String>,

    /// Key role of the column.
    pub key_role: KeyRole,
}

impl Column {
    /// Create a nullable column with no default and no key role.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            is_nullable: true,
            default: None,
            key_role: KeyRole::None,
        }
    }
}

/// One foreign key column pairing, as reported by the catalog.
///
/// Only `table` and `ref_table` matter for ordering; the column detail is
/// kept for logging and for the `plan` output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ForeignKeyEdge {
    /// Dependent (referencing) table.
    pub table: String,

    /// Dependent column.
    pub column: String,

    /// Referenced table.
    pub ref_table: String,

    /// Referenced column.
    pub ref_column: String,
}

impl ForeignKeyEdge {
    /// Create an edge.
    pub fn new(
        table: impl Into<String>,
        column: impl Into<String>,
        ref_table: impl Into<String>,
        ref_column: impl Into<String>,
    ) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            ref_table: ref_table.into(),
            ref_column: ref_column.into(),
        }
    }

    /// Check if the edge points back at its own table.
    pub fn is_self_reference(&self) -> bool {
        self.table == self.ref_table
    }
}
