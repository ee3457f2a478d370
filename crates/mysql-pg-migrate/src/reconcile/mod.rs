//! Column reconciliation between an export artifact and a destination table.
//!
//! Only column names are compared, case-sensitively. Types are never
//! reconciled: the destination schema is authoritative.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{MigrateError, Result};

/// Difference between the artifact's columns and the destination's columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColumnDiff {
    /// In the artifact but not in the destination, artifact order.
    pub missing_in_destination: Vec<String>,

    /// In the destination but not in the artifact, destination order.
    pub extra_in_destination: Vec<String>,
}

impl ColumnDiff {
    /// Compare destination columns against source (artifact) columns.
    pub fn compute(destination: &[String], source: &[String]) -> Self {
        Self {
            missing_in_destination: difference(source, destination),
            extra_in_destination: difference(destination, source),
        }
    }

    /// True when both column sets are equal.
    pub fn is_match(&self) -> bool {
        self.missing_in_destination.is_empty() && self.extra_in_destination.is_empty()
    }

    /// Convert a mismatch into an error for `table`.
    pub fn into_result(self, table: &str) -> Result<()> {
        if self.is_match() {
            return Ok(());
        }
        Err(MigrateError::ColumnMismatch {
            table: table.to_string(),
            missing_in_destination: self.missing_in_destination,
            extra_in_destination: self.extra_in_destination,
        })
    }
}

/// Names in `left` that are absent from `right`, in `left` order, each once.
fn difference(left: &[String], right: &[String]) -> Vec<String> {
    let right: HashSet<&str> = right.iter().map(String::as_str).collect();
    let mut seen = HashSet::new();
    left.iter()
        .filter(|name| !right.contains(name.as_str()) && seen.insert(name.as_str()))
        .cloned()
        .collect()
}

/// Compare column name sets.
pub fn reconcile(destination: &[String], source: &[String]) -> ColumnDiff {
    ColumnDiff::compute(destination, source)
}

/// Fail with [`MigrateError::ColumnMismatch`] unless the sets are equal.
pub fn validate_columns(table: &str, destination: &[String], source: &[String]) -> Result<()> {
    reconcile(destination, source).into_result(table)
}
