//! Identifier validation and quoting.
//!
//! Table and column names come from catalogs and artifact headers, and are
//! spliced into generated SQL. They cannot be bound as parameters, so every
//! name goes through these helpers before it reaches a statement.

use crate::error::{MigrateError, Result};

/// Longest identifier accepted (MySQL allows 64, PostgreSQL 63 bytes).
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Reject empty names, names with NUL bytes, and overlong names.
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::Config("Identifier cannot be empty".to_string()));
    }
    if name.contains('\0') {
        return Err(MigrateError::Config(format!(
            "Identifier contains a null byte: {:?}",
            name
        )));
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::Config(format!(
            "Identifier exceeds {} bytes: {:?}",
            MAX_IDENTIFIER_LENGTH, name
        )));
    }
    Ok(())
}

/// Double-quote a PostgreSQL identifier. Case is preserved.
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Backtick-quote a MySQL identifier.
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// `"schema"."table"`
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// `` `database`.`table` ``
pub fn qualify_mysql(database: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(database)?, quote_mysql(table)?))
}
