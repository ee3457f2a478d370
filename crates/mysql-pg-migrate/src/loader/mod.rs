//! Batched, conflict-skipping inserts from an artifact into one table.
//!
//! Rows are pulled from an [`ArtifactReader`] in fixed-size batches and each
//! batch becomes one multi-row `INSERT ... ON CONFLICT DO NOTHING` with
//! literal values. Re-running a load against a table that already holds the
//! same rows inserts nothing and succeeds.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactReader;
use crate::core::identifier::{qualify_pg, quote_pg};
use crate::core::traits::DestinationSession;
use crate::core::value::{Batch, Row, RowValue};
use crate::error::{MigrateError, Result};

/// Rows per INSERT statement unless configured otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 1000;

/// Counters for one table load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoadStats {
    /// Rows parsed from the artifact.
    pub rows_read: u64,
    /// Rows the destination reported as inserted.
    pub rows_inserted: u64,
    /// Rows skipped by the conflict clause.
    pub rows_skipped: u64,
    /// INSERT statements executed.
    pub batches: usize,
}

/// Loads artifacts into tables of one destination schema.
#[derive(Debug, Clone)]
pub struct BatchLoader {
    schema: String,
    batch_size: usize,
}

impl BatchLoader {
    pub fn new(schema: impl Into<String>, batch_size: usize) -> Self {
        Self {
            schema: schema.into(),
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Render one multi-row insert for `batch`.
    pub fn build_insert(&self, table: &str, columns: &[String], rows: &[Row]) -> Result<String> {
        let col_list = columns
            .iter()
            .map(|c| quote_pg(c))
            .collect::<Result<Vec<_>>>()?
            .join(", ");

        let value_rows: Vec<String> = rows
            .iter()
            .map(|row| {
                let values: Vec<String> = row.iter().map(RowValue::to_sql_literal).collect();
                format!("({})", values.join(", "))
            })
            .collect();

        Ok(format!(
            "INSERT INTO {} ({}) VALUES {} ON CONFLICT DO NOTHING",
            qualify_pg(&self.schema, table)?,
            col_list,
            value_rows.join(", ")
        ))
    }

    /// Stream every row of `reader` into `table`.
    ///
    /// `columns` is the destination column order; each row is aligned to it.
    /// The first rejected batch stops the load with [`MigrateError::Insert`].
    /// Cancellation is observed between batches, never mid-statement.
    pub async fn load(
        &self,
        session: &mut dyn DestinationSession,
        table: &str,
        columns: &[String],
        reader: &mut ArtifactReader,
        cancel: &CancellationToken,
    ) -> Result<LoadStats> {
        let mut stats = LoadStats::default();

        if reader.is_empty() {
            warn!("{}: artifact {} has no rows, nothing to insert", table, reader.path().display());
            return Ok(stats);
        }

        loop {
            if cancel.is_cancelled() {
                info!("{}: cancelled after {} batches", table, stats.batches);
                return Err(MigrateError::Cancelled);
            }

            let batch = match reader.next_batch(columns, self.batch_size)? {
                Some(rows) => Batch::new(stats.batches + 1, rows),
                None => break,
            };

            let sql = self.build_insert(table, columns, &batch.rows)?;
            debug!("{}: batch {} statement is {} bytes", table, batch.number, sql.len());

            let inserted = session
                .execute(&sql)
                .await
                .map_err(|e| MigrateError::insert(table, batch.number, e))?;

            let read = batch.len() as u64;
            stats.batches = batch.number;
            stats.rows_read += read;
            stats.rows_inserted += inserted;
            stats.rows_skipped += read.saturating_sub(inserted);

            info!(
                "{}: batch {} inserted {}/{} rows ({} rows so far)",
                table, batch.number, inserted, read, stats.rows_read
            );
        }

        if stats.batches == 0 {
            warn!("{}: no rows parsed from {}", table, reader.path().display());
        }

        Ok(stats)
    }
}

impl Default for BatchLoader {
    fn default() -> Self {
        Self::new("public", DEFAULT_BATCH_SIZE)
    }
}
