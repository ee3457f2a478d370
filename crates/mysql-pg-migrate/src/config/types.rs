//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::artifact::ArtifactFormat;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (MySQL).
    pub source: SourceConfig,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Export artifact configuration.
    #[serde(default)]
    pub export: ExportConfig,

    /// Import behavior configuration.
    #[serde(default)]
    pub import: ImportConfig,
}

/// Source database (MySQL/MariaDB) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Database type (always "mysql" for now).
    #[serde(default = "default_mysql")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 3306).
    #[serde(default = "default_mysql_port")]
    pub port: u16,

    /// Database name. Also the schema tables are read from.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,
}

impl fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Database type (always "postgres" for now).
    #[serde(default = "default_postgres")]
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "public").
    #[serde(default = "default_public_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Export artifact configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Directory holding one artifact per table.
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,

    /// Artifact format for this run (json or csv).
    #[serde(default)]
    pub format: ArtifactFormat,

    /// Tables exported concurrently.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Rows fetched from the source per chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
            format: ArtifactFormat::default(),
            workers: default_workers(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// Import behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportConfig {
    /// Rows per INSERT statement.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Tables that are neither exported nor imported.
    #[serde(default)]
    pub ignore_tables: Vec<String>,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            ignore_tables: Vec::new(),
        }
    }
}

impl ImportConfig {
    /// Check whether a table is on the ignore list (exact match).
    pub fn is_ignored(&self, table: &str) -> bool {
        self.ignore_tables.iter().any(|t| t == table)
    }
}

// Default value functions for serde
fn default_mysql() -> String {
    "mysql".to_string()
}

fn default_postgres() -> String {
    "postgres".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

fn default_pg_port() -> u16 {
    5432
}

fn default_public_schema() -> String {
    "public".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("./export")
}

fn default_workers() -> usize {
    4
}

fn default_chunk_size() -> usize {
    10_000
}

fn default_batch_size() -> usize {
    crate::loader::DEFAULT_BATCH_SIZE
}
