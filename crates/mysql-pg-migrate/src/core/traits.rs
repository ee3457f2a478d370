//! Core traits for the import pipeline.
//!
//! - [`MetadataReader`]: Reads catalog metadata (tables, columns, FK edges)
//! - [`Destination`]: Hands out scoped sessions on the target database
//! - [`DestinationSession`]: One checked-out connection used for a table
//! - [`SourceReader`]: Streams table rows out of the source for export
//!
//! The orchestrator only talks to these traits, so the pipeline can be
//! exercised against in-memory implementations in tests.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

use super::schema::{Column, ForeignKeyEdge};
use super::value::Row;

/// Read catalog metadata from a database.
///
/// All methods are scoped to the schema the implementation was configured
/// with. Names are returned exactly as the catalog stores them.
#[async_trait]
pub trait MetadataReader: Send + Sync {
    /// List all base tables in the schema.
    async fn list_tables(&self) -> Result<Vec<String>>;

    /// List the columns of a table ordered by ordinal position.
    async fn list_columns(&self, table: &str) -> Result<Vec<Column>>;

    /// List every foreign key edge in the schema in one pass.
    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>>;

    /// Get the database type identifier (e.g., "mysql", "postgres").
    fn db_type(&self) -> &str;
}

/// A source database that can stream table contents.
#[async_trait]
pub trait SourceReader: MetadataReader {
    /// Count the rows in a table.
    async fn row_count(&self, table: &str) -> Result<i64>;

    /// Stream all rows of `table` in chunks of at most `chunk_size` rows.
    ///
    /// Values are in `columns` order. A read error is sent as the last item.
    fn read_table(
        &self,
        table: &str,
        columns: Vec<Column>,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<Vec<Row>>>;
}

/// A target database that hands out sessions.
#[async_trait]
pub trait Destination: Send + Sync {
    /// Check out a session. The connection is released when the session is
    /// dropped, on every exit path.
    async fn session(&self) -> Result<Box<dyn DestinationSession>>;

    /// Schema that inserts are qualified with.
    fn schema(&self) -> &str;

    /// Close the connection pool.
    async fn close(&self);
}

/// A single checked-out destination connection.
#[async_trait]
pub trait DestinationSession: Send {
    /// Count the rows currently in a table.
    async fn row_count(&mut self, table: &str) -> Result<i64>;

    /// Execute a statement and return the number of affected rows.
    async fn execute(&mut self, sql: &str) -> Result<u64>;
}
