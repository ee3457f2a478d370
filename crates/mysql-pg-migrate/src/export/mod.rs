//! Export source tables into an artifact directory.
//!
//! Each table is exported by its own task; a semaphore bounds how many run at
//! once. Rows are read by the source driver on a background task and written
//! on the blocking pool, so file IO never stalls the runtime.
//!
//! Artifacts are written to `<table>.<ext>.partial` and renamed on success, so
//! an interrupted export never leaves a truncated artifact behind for import.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::artifact::{self, ArtifactFormat, ArtifactWriter};
use crate::config::{ExportConfig, ImportConfig};
use crate::core::traits::SourceReader;
use crate::error::{MigrateError, Result};

/// One exported table.
#[derive(Debug, Clone, Serialize)]
pub struct TableExport {
    pub name: String,
    pub rows: u64,
    pub path: PathBuf,
}

/// Result of an export run.
#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub dir: PathBuf,
    pub format: ArtifactFormat,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_seconds: f64,
    /// Exported tables, in source catalog order.
    pub tables: Vec<TableExport>,
    pub rows_exported: u64,
}

impl ExportReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Exports every non-ignored source table.
pub struct Exporter {
    source: Arc<dyn SourceReader>,
    config: ExportConfig,
    ignore: ImportConfig,
}

impl Exporter {
    pub fn new(source: Arc<dyn SourceReader>, config: ExportConfig) -> Self {
        Self {
            source,
            config,
            ignore: ImportConfig::default(),
        }
    }

    /// Skip the tables on the import ignore list.
    pub fn with_ignore_list(mut self, import: ImportConfig) -> Self {
        self.ignore = import;
        self
    }

    /// Run the export.
    ///
    /// Cancellation stops new tables from starting; tables already running
    /// finish. The first table error is returned after all running tables
    /// have completed.
    pub async fn run(&self, cancel: CancellationToken) -> Result<ExportReport> {
        let started_at = Utc::now();
        let dir = self.config.dir.clone();
        let format = self.config.format;

        tokio::fs::create_dir_all(&dir).await?;

        let tables: Vec<String> = self
            .source
            .list_tables()
            .await?
            .into_iter()
            .filter(|t| {
                let ignored = self.ignore.is_ignored(t);
                if ignored {
                    info!("{}: on ignore list, not exporting", t);
                }
                !ignored
            })
            .collect();

        info!(
            "Exporting {} tables to {} as {} ({} workers)",
            tables.len(),
            dir.display(),
            format,
            self.config.workers
        );

        let semaphore = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut handles = Vec::with_capacity(tables.len());

        for table in tables {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!("Export cancelled before table {}", table);
                    break;
                }
                permit = semaphore.clone().acquire_owned() => {
                    permit.map_err(|e| MigrateError::export(&table, e))?
                }
            };

            let source = self.source.clone();
            let dir = dir.clone();
            let chunk_size = self.config.chunk_size;
            handles.push((
                table.clone(),
                tokio::spawn(async move {
                    let _permit = permit;
                    export_table(source, &table, &dir, format, chunk_size).await
                }),
            ));
        }

        let mut exported = Vec::with_capacity(handles.len());
        let mut first_error = None;
        for (table, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(e) => Err(MigrateError::export(&table, format!("task failed: {}", e))),
            };
            match result {
                Ok(t) => exported.push(t),
                Err(e) => {
                    error!("{}: export failed: {}", table, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if cancel.is_cancelled() {
            return Err(MigrateError::Cancelled);
        }

        let completed_at = Utc::now();
        let rows_exported = exported.iter().map(|t| t.rows).sum();
        let report = ExportReport {
            dir,
            format,
            started_at,
            completed_at,
            duration_seconds: (completed_at - started_at).num_milliseconds() as f64 / 1000.0,
            tables: exported,
            rows_exported,
        };

        info!(
            "Export finished: {} tables, {} rows in {:.1}s",
            report.tables.len(),
            report.rows_exported,
            report.duration_seconds
        );
        Ok(report)
    }
}

async fn export_table(
    source: Arc<dyn SourceReader>,
    table: &str,
    dir: &Path,
    format: ArtifactFormat,
    chunk_size: usize,
) -> Result<TableExport> {
    let columns = source.list_columns(table).await?;
    let names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();
    let expected = source.row_count(table).await?;
    debug!("{}: exporting {} rows, {} columns", table, expected, names.len());

    let path = artifact::path_for(dir, table, format);
    let partial = partial_path(&path);
    let mut rx = source.read_table(table, columns, chunk_size);

    let writer_path = partial.clone();
    let written = tokio::task::spawn_blocking(move || -> Result<u64> {
        let mut writer = ArtifactWriter::create(&writer_path, format, names)?;
        while let Some(chunk) = rx.blocking_recv() {
            for row in chunk? {
                writer.write_row(&row)?;
            }
        }
        writer.finish()
    })
    .await
    .map_err(|e| MigrateError::export(table, format!("writer task failed: {}", e)))
    .and_then(|r| r);

    let rows = match written {
        Ok(rows) => rows,
        Err(e) => {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e);
        }
    };
    tokio::fs::rename(&partial, &path).await?;

    if rows as i64 != expected {
        warn!(
            "{}: wrote {} rows but the source reported {} (table changed during export?)",
            table, rows, expected
        );
    }
    info!("{}: exported {} rows to {}", table, rows, path.display());

    Ok(TableExport {
        name: table.to_string(),
        rows,
        path,
    })
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".partial");
    PathBuf::from(name)
}
