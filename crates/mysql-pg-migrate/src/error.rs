//! Error types for the migration library.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Source database connection or query error
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database connection or query error
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Catalog (metadata) query failed. No import is safe without metadata.
    #[error("Catalog query failed ({context}): {message}")]
    Catalog { context: String, message: String },

    /// The foreign key graph contains a cycle.
    #[error("Cyclic foreign key dependency at table {table}: {}", cycle.join(" -> "))]
    CyclicDependency { table: String, cycle: Vec<String> },

    /// Column sets of the artifact and the destination table differ.
    #[error(
        "Column mismatch for table {table}: missing in destination {missing_in_destination:?}, \
         extra in destination {extra_in_destination:?}"
    )]
    ColumnMismatch {
        table: String,
        missing_in_destination: Vec<String>,
        extra_in_destination: Vec<String>,
    },

    /// Destination already holds rows but there is nothing to import.
    #[error(
        "Inconsistent state for table {table}: destination has {row_count} rows \
         but the export artifact is missing or empty"
    )]
    InconsistentState { table: String, row_count: i64 },

    /// Malformed JSON or CSV artifact.
    #[error("Failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    /// An insert batch was rejected by the destination.
    #[error("Insert failed for table {table} (batch {batch}): {message}")]
    Insert {
        table: String,
        batch: usize,
        message: String,
    },

    /// Exporting a table failed.
    #[error("Export failed for table {table}: {message}")]
    Export { table: String, message: String },

    /// Export directory does not exist.
    #[error("Export directory not found: {0}")]
    ExportDirMissing(PathBuf),

    /// No artifact in the export directory matches a destination table.
    #[error("No export artifacts matching destination tables found in {0}")]
    NoArtifacts(PathBuf),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV reading/writing error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Migration was cancelled (SIGINT, etc.)
    #[error("Migration cancelled")]
    Cancelled,
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Catalog error for a failed metadata query.
    pub fn catalog(context: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Catalog {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create an Insert error for a rejected batch (1-based batch number).
    pub fn insert(table: impl Into<String>, batch: usize, message: impl ToString) -> Self {
        MigrateError::Insert {
            table: table.into(),
            batch,
            message: message.to_string(),
        }
    }

    /// Create a Parse error for an artifact.
    pub fn parse(path: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }

    /// Create an Export error
    pub fn export(table: impl Into<String>, message: impl ToString) -> Self {
        MigrateError::Export {
            table: table.into(),
            message: message.to_string(),
        }
    }

    /// Whether the run may continue with the next table after this error.
    ///
    /// Only malformed artifacts are tolerated; everything else aborts the run.
    pub fn is_table_local(&self) -> bool {
        matches!(self, MigrateError::Parse { .. })
    }

    /// Process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
