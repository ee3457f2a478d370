//! # mysql-pg-migrate
//!
//! Dependency-ordered MySQL to PostgreSQL migration through export artifacts.
//!
//! A migration has two halves:
//!
//! - **Export** writes one JSON or CSV artifact per MySQL table
//! - **Import** loads those artifacts into an existing PostgreSQL schema,
//!   parents before children, after checking that each artifact's columns
//!   match the destination table
//!
//! Inserts use `ON CONFLICT DO NOTHING`, so an interrupted import can be
//! re-run against the same artifacts.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use mysql_pg_migrate::{Config, Importer, PostgresDestination};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> mysql_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let destination = PostgresDestination::new(&config.target).await?;
//!     let report = Importer::new(
//!         Arc::new(destination.catalog()),
//!         Arc::new(destination),
//!         &config.export.dir,
//!     )
//!     .with_import_config(config.import.clone())
//!     .run(CancellationToken::new())
//!     .await?;
//!     println!("Imported {} rows", report.rows_inserted);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod config;
pub mod core;
pub mod dependency;
pub mod drivers;
pub mod error;
pub mod export;
pub mod loader;
pub mod orchestrator;
pub mod reconcile;

#[cfg(test)]
mod testing;

// Re-exports for convenient access
pub use artifact::ArtifactFormat;
pub use config::{Config, ExportConfig, ImportConfig, SourceConfig, TargetConfig};
pub use dependency::{import_order, DependencyGraph};
pub use drivers::{MysqlReader, PostgresCatalog, PostgresDestination};
pub use error::{MigrateError, Result};
pub use export::{ExportReport, Exporter};
pub use loader::{BatchLoader, LoadStats};
pub use orchestrator::{plan_order, ImportReport, Importer, TableStatus};
pub use reconcile::{reconcile, validate_columns};
