//! Import orchestrator - drives tables through validation and loading.
//!
//! Tables are imported one at a time in foreign key order. Each table holds
//! one destination session for its whole validate-and-load cycle; the session
//! is dropped (and its connection returned to the pool) on every exit path.
//!
//! Failure policy is fail-fast: any error aborts the run, except a malformed
//! artifact, which fails only its own table.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::{self, ArtifactFormat, ArtifactReader};
use crate::config::ImportConfig;
use crate::core::traits::{Destination, MetadataReader};
use crate::dependency::import_order;
use crate::error::{MigrateError, Result};
use crate::loader::{BatchLoader, LoadStats};
use crate::reconcile::validate_columns;

/// Per-table import state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Pending,
    Validating,
    Importing,
    Done,
    Skipped,
    Failed,
}

impl TableStatus {
    /// Terminal states.
    pub fn is_finished(&self) -> bool {
        matches!(self, TableStatus::Done | TableStatus::Skipped | TableStatus::Failed)
    }
}

/// Overall run outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Failed,
}

/// Outcome for one table.
#[derive(Debug, Clone, Serialize)]
pub struct TableReport {
    /// Table name.
    pub name: String,

    /// Final (or last reached) state.
    pub status: TableStatus,

    /// Why the table was skipped, if it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Error message, if the table failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Load counters.
    #[serde(flatten)]
    pub stats: LoadStats,
}

impl TableReport {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: TableStatus::Pending,
            reason: None,
            error: None,
            stats: LoadStats::default(),
        }
    }

    fn skipped(name: impl Into<String>, reason: impl Into<String>) -> Self {
        let mut report = Self::new(name);
        report.status = TableStatus::Skipped;
        report.reason = Some(reason.into());
        report
    }

    fn transition(&mut self, status: TableStatus) {
        debug!("{}: {:?} -> {:?}", self.name, self.status, status);
        self.status = status;
    }
}

/// Result of an import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    /// Unique run identifier.
    pub run_id: String,

    /// Final status.
    pub status: RunStatus,

    /// When the import started.
    pub started_at: DateTime<Utc>,

    /// When the import completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    /// Computed import order.
    pub order: Vec<String>,

    /// Per-table outcomes: ordered tables first, then ignored tables and
    /// artifacts with no destination table.
    pub tables: Vec<TableReport>,

    /// Rows inserted across all tables.
    pub rows_inserted: u64,
}

impl ImportReport {
    /// True when no table failed.
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }

    /// Names of failed tables.
    pub fn failed_tables(&self) -> Vec<&str> {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Failed)
            .map(|t| t.name.as_str())
            .collect()
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Compute the import order from a catalog, leaving out ignored tables.
pub async fn plan_order(catalog: &dyn MetadataReader, import: &ImportConfig) -> Result<Vec<String>> {
    let tables: Vec<String> = catalog
        .list_tables()
        .await?
        .into_iter()
        .filter(|t| !import.is_ignored(t))
        .collect();
    let edges = catalog.list_foreign_keys().await?;
    debug!("Planning {} tables with {} foreign key edges", tables.len(), edges.len());
    import_order(&tables, &edges)
}

/// Imports an artifact directory into the destination.
pub struct Importer {
    catalog: Arc<dyn MetadataReader>,
    destination: Arc<dyn Destination>,
    dir: PathBuf,
    format: ArtifactFormat,
    import: ImportConfig,
}

/// How a single table finished when it did not error.
enum TableOutcome {
    Skipped(&'static str),
    Loaded(LoadStats),
}

impl Importer {
    /// Create an importer reading JSON artifacts from `dir`.
    pub fn new(
        catalog: Arc<dyn MetadataReader>,
        destination: Arc<dyn Destination>,
        dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            destination,
            dir: dir.into(),
            format: ArtifactFormat::default(),
            import: ImportConfig::default(),
        }
    }

    /// Set the artifact format.
    pub fn with_format(mut self, format: ArtifactFormat) -> Self {
        self.format = format;
        self
    }

    /// Set batch size and ignore list.
    pub fn with_import_config(mut self, import: ImportConfig) -> Self {
        self.import = import;
        self
    }

    /// Compute the import order without touching any data.
    pub async fn plan(&self) -> Result<Vec<String>> {
        plan_order(self.catalog.as_ref(), &self.import).await
    }

    /// Run the import.
    ///
    /// Returns `Ok` with a report when every table reached a terminal state,
    /// including tables failed by malformed artifacts. Any other error aborts
    /// the run and is returned as-is.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ImportReport> {
        let started_at = Utc::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        info!("Starting import run {} from {}", run_id, self.dir.display());

        if !self.dir.is_dir() {
            return Err(MigrateError::ExportDirMissing(self.dir.clone()));
        }

        let tables = self.catalog.list_tables().await?;
        let artifacts = artifact::discover(&self.dir, self.format)?;

        let known: HashSet<&str> = tables.iter().map(String::as_str).collect();
        let mut extra_reports = Vec::new();

        for name in tables.iter().filter(|t| self.import.is_ignored(t)) {
            info!("{}: on ignore list, skipping", name);
            extra_reports.push(TableReport::skipped(name.clone(), "ignored"));
        }
        for name in artifacts.iter().filter(|a| !known.contains(a.as_str())) {
            warn!(
                "{}: artifact has no matching destination table, skipping",
                name
            );
            extra_reports.push(TableReport::skipped(name.clone(), "unknown destination table"));
        }

        let importable: Vec<String> = tables
            .iter()
            .filter(|t| !self.import.is_ignored(t))
            .cloned()
            .collect();
        let matched = artifacts
            .iter()
            .filter(|a| importable.iter().any(|t| t == *a))
            .count();
        if matched == 0 {
            return Err(MigrateError::NoArtifacts(self.dir.clone()));
        }

        let edges = self.catalog.list_foreign_keys().await?;
        let order = import_order(&importable, &edges)?;
        info!(
            "Import order ({} tables, {} artifacts): {}",
            order.len(),
            matched,
            order.join(", ")
        );

        let loader = BatchLoader::new(self.destination.schema(), self.import.batch_size);
        let mut reports: Vec<TableReport> = order.iter().map(TableReport::new).collect();

        for report in reports.iter_mut() {
            if cancel.is_cancelled() {
                warn!("Import cancelled before table {}", report.name);
                return Err(MigrateError::Cancelled);
            }

            match self.import_table(&loader, report, &cancel).await {
                Ok(TableOutcome::Loaded(stats)) => {
                    report.stats = stats;
                    report.transition(TableStatus::Done);
                    info!(
                        "{}: done, {} rows inserted, {} skipped as duplicates",
                        report.name, stats.rows_inserted, stats.rows_skipped
                    );
                }
                Ok(TableOutcome::Skipped(reason)) => {
                    report.transition(TableStatus::Skipped);
                    report.reason = Some(reason.to_string());
                    info!("{}: skipped ({})", report.name, reason);
                }
                Err(MigrateError::Cancelled) => {
                    warn!("{}: import cancelled", report.name);
                    return Err(MigrateError::Cancelled);
                }
                Err(e) if e.is_table_local() => {
                    error!("{}: {}, continuing with next table", report.name, e);
                    report.transition(TableStatus::Failed);
                    report.error = Some(e.to_string());
                }
                Err(e) => {
                    error!("{}: {}, aborting import", report.name, e);
                    return Err(e);
                }
            }
        }

        let completed_at = Utc::now();
        let rows_inserted = reports.iter().map(|r| r.stats.rows_inserted).sum();
        let status = if reports.iter().any(|r| r.status == TableStatus::Failed) {
            RunStatus::Failed
        } else {
            RunStatus::Completed
        };
        reports.extend(extra_reports);

        let report = ImportReport {
            run_id,
            status,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            order,
            tables: reports,
            rows_inserted,
        };

        info!(
            "Import run {} finished: {:?}, {} rows inserted in {:.1}s",
            report.run_id, report.status, report.rows_inserted, report.duration_seconds
        );
        Ok(report)
    }

    /// Validate and load one table on its own session.
    async fn import_table(
        &self,
        loader: &BatchLoader,
        report: &mut TableReport,
        cancel: &CancellationToken,
    ) -> Result<TableOutcome> {
        let table = report.name.clone();
        let mut session = self.destination.session().await?;

        let row_count = session.row_count(&table).await?;
        let mut reader = match self.open_artifact(&table)? {
            Some(reader) if !reader.is_empty() => reader,
            _ if row_count > 0 => {
                return Err(MigrateError::InconsistentState { table, row_count });
            }
            _ => return Ok(TableOutcome::Skipped("no rows to import")),
        };

        report.transition(TableStatus::Validating);
        let destination_columns: Vec<String> = self
            .catalog
            .list_columns(&table)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        validate_columns(&table, &destination_columns, reader.columns())?;

        report.transition(TableStatus::Importing);
        if row_count > 0 {
            info!("{}: destination already has {} rows, duplicates will be skipped", table, row_count);
        }
        let stats = loader
            .load(session.as_mut(), &table, &destination_columns, &mut reader, cancel)
            .await?;

        Ok(TableOutcome::Loaded(stats))
    }

    fn open_artifact(&self, table: &str) -> Result<Option<ArtifactReader>> {
        let path = artifact::path_for(&self.dir, table, self.format);
        if !path.is_file() {
            debug!("{}: no artifact at {}", table, path.display());
            return Ok(None);
        }
        ArtifactReader::open(&path, self.format).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryCatalog, MemoryDestination};
    use serde_json::json;
    use tempfile::TempDir;

    fn write_json(dir: &TempDir, table: &str, body: serde_json::Value) {
        std::fs::write(
            dir.path().join(format!("{}.json", table)),
            serde_json::to_string(&body).unwrap(),
        )
        .unwrap();
    }

    fn shop_catalog() -> MemoryCatalog {
        MemoryCatalog::new()
            .table("orders", &["id", "customers_id"])
            .table("customers", &["id", "name"])
            .foreign_key("orders", "customers")
    }

    fn shop_artifacts(dir: &TempDir) {
        write_json(
            dir,
            "customers",
            json!([{"id": 1, "name": "Ada"}, {"id": 2, "name": "O'Brien"}]),
        );
        write_json(dir, "orders", json!([{"id": 10, "customers_id": 1}]));
    }

    fn importer(catalog: MemoryCatalog, dest: &MemoryDestination, dir: &TempDir) -> Importer {
        Importer::new(Arc::new(catalog), Arc::new(dest.clone()), dir.path())
    }

    fn status_of<'a>(report: &'a ImportReport, table: &str) -> &'a TableReport {
        report.tables.iter().find(|t| t.name == table).unwrap()
    }

    #[tokio::test]
    async fn test_imports_in_dependency_order() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let dest = MemoryDestination::new();

        let report = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.order, vec!["customers", "orders"]);
        assert_eq!(dest.counted(), vec!["customers", "orders"]);
        assert_eq!(status_of(&report, "customers").status, TableStatus::Done);
        assert_eq!(status_of(&report, "orders").stats.rows_inserted, 1);
        assert_eq!(report.rows_inserted, 3);
        assert_eq!(dest.open_sessions(), 0);

        let json = report.to_json().unwrap();
        assert!(json.contains("\"status\": \"done\""));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let dest = MemoryDestination::new();

        importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();
        let second = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(second.is_success());
        assert_eq!(second.rows_inserted, 0);
        assert_eq!(dest.row_count("customers"), 2);
        assert_eq!(status_of(&second, "customers").stats.rows_skipped, 2);
    }

    #[tokio::test]
    async fn test_empty_destination_and_empty_artifact_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_json(&dir, "customers", json!([]));
        write_json(&dir, "orders", json!([{"id": 10, "customers_id": 1}]));
        let dest = MemoryDestination::new();

        let report = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(status_of(&report, "customers").status, TableStatus::Skipped);
        assert_eq!(status_of(&report, "orders").status, TableStatus::Done);
        assert_eq!(dest.statements().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_artifact_for_empty_table_is_skipped() {
        let dir = TempDir::new().unwrap();
        write_json(&dir, "customers", json!([{"id": 1, "name": "Ada"}]));
        let dest = MemoryDestination::new();

        let report = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(status_of(&report, "orders").status, TableStatus::Skipped);
    }

    #[tokio::test]
    async fn test_populated_destination_with_empty_artifact_aborts_first() {
        let dir = TempDir::new().unwrap();
        write_json(&dir, "customers", json!([]));
        write_json(&dir, "orders", json!([{"id": 10, "customers_id": 1}]));
        let dest = MemoryDestination::new().with_rows("customers", 5);

        let err = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            MigrateError::InconsistentState { table, row_count } => {
                assert_eq!(table, "customers");
                assert_eq!(row_count, 5);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(dest.counted(), vec!["customers"]);
        assert!(dest.statements().is_empty());
        assert_eq!(dest.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_column_mismatch_aborts_run() {
        let dir = TempDir::new().unwrap();
        write_json(&dir, "customers", json!([{"id": 1, "Name": "Ada"}]));
        write_json(&dir, "orders", json!([{"id": 10, "customers_id": 1}]));
        let dest = MemoryDestination::new();

        let err = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            MigrateError::ColumnMismatch {
                table,
                missing_in_destination,
                extra_in_destination,
            } => {
                assert_eq!(table, "customers");
                assert_eq!(missing_in_destination, vec!["Name"]);
                assert_eq!(extra_in_destination, vec!["name"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert!(dest.statements().is_empty());
    }

    #[tokio::test]
    async fn test_parse_error_fails_table_and_continues() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("customers.json"), "[{\"id\": 1,").unwrap();
        write_json(&dir, "orders", json!([{"id": 10, "customers_id": 1}]));
        let dest = MemoryDestination::new();

        let report = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(!report.is_success());
        assert_eq!(report.failed_tables(), vec!["customers"]);
        assert!(status_of(&report, "customers").error.is_some());
        assert_eq!(status_of(&report, "orders").status, TableStatus::Done);
    }

    #[tokio::test]
    async fn test_insert_error_aborts_and_releases_session() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let dest = MemoryDestination::new().fail_inserts_into("customers");

        let err = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, MigrateError::Insert { batch: 1, .. }));
        assert_eq!(dest.counted(), vec!["customers"]);
        assert_eq!(dest.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_unknown_artifact_and_ignored_table_are_skipped() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        write_json(&dir, "legacy_audit", json!([{"id": 1}]));
        let dest = MemoryDestination::new();

        let import = ImportConfig {
            ignore_tables: vec!["orders".to_string()],
            ..ImportConfig::default()
        };
        let report = importer(shop_catalog(), &dest, &dir)
            .with_import_config(import)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.order, vec!["customers"]);
        let orders = status_of(&report, "orders");
        assert_eq!(orders.status, TableStatus::Skipped);
        assert_eq!(orders.reason.as_deref(), Some("ignored"));
        let legacy = status_of(&report, "legacy_audit");
        assert_eq!(legacy.status, TableStatus::Skipped);
        assert_eq!(legacy.reason.as_deref(), Some("unknown destination table"));
        assert_eq!(dest.row_count("orders"), 0);
        assert_eq!(dest.row_count("legacy_audit"), 0);
    }

    #[tokio::test]
    async fn test_missing_export_dir() {
        let dir = TempDir::new().unwrap();
        let dest = MemoryDestination::new();
        let importer = Importer::new(
            Arc::new(shop_catalog()),
            Arc::new(dest),
            dir.path().join("absent"),
        );

        let err = importer.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, MigrateError::ExportDirMissing(_)));
    }

    #[tokio::test]
    async fn test_no_matching_artifacts() {
        let dir = TempDir::new().unwrap();
        write_json(&dir, "unrelated", json!([]));
        // CSV artifacts do not count when importing JSON.
        std::fs::write(dir.path().join("customers.csv"), "id,name\n1,a\n").unwrap();
        let dest = MemoryDestination::new();

        let err = importer(shop_catalog(), &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::NoArtifacts(_)));
    }

    #[tokio::test]
    async fn test_csv_format() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("customers.csv"),
            "name,id\nAda,1\n\\N,2\n,3\n",
        )
        .unwrap();
        std::fs::write(dir.path().join("orders.csv"), "").unwrap();
        let dest = MemoryDestination::new();

        let report = importer(shop_catalog(), &dest, &dir)
            .with_format(ArtifactFormat::Csv)
            .run(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(status_of(&report, "customers").stats.rows_inserted, 3);
        assert_eq!(status_of(&report, "orders").status, TableStatus::Skipped);
        let statements = dest.statements();
        assert!(statements[0].contains("(\"id\", \"name\") VALUES ('1', 'Ada'), ('2', NULL), ('3', '')"));
    }

    #[tokio::test]
    async fn test_cycle_aborts_before_import() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let catalog = shop_catalog().foreign_key("customers", "orders");
        let dest = MemoryDestination::new();

        let err = importer(catalog, &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::CyclicDependency { .. }));
        assert!(dest.counted().is_empty());
    }

    #[tokio::test]
    async fn test_catalog_failure_is_fatal() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let mut catalog = shop_catalog();
        catalog.fail = true;
        let dest = MemoryDestination::new();

        let err = importer(catalog, &dest, &dir)
            .run(CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Catalog { .. }));
    }

    #[tokio::test]
    async fn test_cancelled_run() {
        let dir = TempDir::new().unwrap();
        shop_artifacts(&dir);
        let dest = MemoryDestination::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = importer(shop_catalog(), &dest, &dir)
            .run(cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, MigrateError::Cancelled));
        assert!(dest.statements().is_empty());
        assert_eq!(dest.open_sessions(), 0);
    }

    #[tokio::test]
    async fn test_plan_excludes_ignored_tables() {
        let catalog = shop_catalog().table("sessions", &["id"]);
        let import = ImportConfig {
            ignore_tables: vec!["sessions".to_string()],
            ..ImportConfig::default()
        };
        let order = plan_order(&catalog, &import).await.unwrap();
        assert_eq!(order, vec!["customers", "orders"]);
    }

    #[test]
    fn test_terminal_states() {
        assert!(TableStatus::Done.is_finished());
        assert!(TableStatus::Skipped.is_finished());
        assert!(TableStatus::Failed.is_finished());
        assert!(!TableStatus::Importing.is_finished());
    }
}
