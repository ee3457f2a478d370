//! In-memory catalog and destination used by unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::schema::{Column, ForeignKeyEdge};
use crate::core::traits::{Destination, DestinationSession, MetadataReader, SourceReader};
use crate::core::value::Row;
use crate::error::{MigrateError, Result};

/// Catalog fake. Table order is insertion order.
#[derive(Default)]
pub struct MemoryCatalog {
    tables: Vec<String>,
    columns: HashMap<String, Vec<Column>>,
    foreign_keys: Vec<ForeignKeyEdge>,
    pub fail: bool,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(mut self, name: &str, columns: &[&str]) -> Self {
        self.tables.push(name.to_string());
        self.columns.insert(
            name.to_string(),
            columns.iter().map(|c| Column::new(*c, "text")).collect(),
        );
        self
    }

    pub fn foreign_key(mut self, table: &str, ref_table: &str) -> Self {
        self.foreign_keys.push(ForeignKeyEdge::new(
            table,
            format!("{}_id", ref_table),
            ref_table,
            "id",
        ));
        self
    }
}

#[async_trait]
impl MetadataReader for MemoryCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        if self.fail {
            return Err(MigrateError::catalog("list tables", "connection refused"));
        }
        Ok(self.tables.clone())
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        if self.fail {
            return Err(MigrateError::catalog("list columns", "connection refused"));
        }
        Ok(self.columns.get(table).cloned().unwrap_or_default())
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>> {
        if self.fail {
            return Err(MigrateError::catalog("list foreign keys", "connection refused"));
        }
        Ok(self.foreign_keys.clone())
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

/// Shared destination state. Each table is a set of rendered value tuples,
/// which models `ON CONFLICT DO NOTHING` against a full-row unique key.
#[derive(Default)]
pub struct MemoryState {
    pub tables: HashMap<String, BTreeSet<String>>,
    pub statements: Vec<String>,
    pub counted: Vec<String>,
    pub fail_table: Option<String>,
}

/// Destination fake that tracks open sessions.
#[derive(Clone, Default)]
pub struct MemoryDestination {
    pub state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl MemoryDestination {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a table with `rows` distinct rows.
    pub fn with_rows(self, table: &str, rows: usize) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            let set = state.tables.entry(table.to_string()).or_default();
            for i in 0..rows {
                set.insert(format!("'existing-{}'", i));
            }
        }
        self
    }

    pub fn fail_inserts_into(self, table: &str) -> Self {
        self.state.lock().unwrap().fail_table = Some(table.to_string());
        self
    }

    pub fn row_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .tables
            .get(table)
            .map(BTreeSet::len)
            .unwrap_or(0)
    }

    pub fn statements(&self) -> Vec<String> {
        self.state.lock().unwrap().statements.clone()
    }

    /// Tables whose row count was queried, in order.
    pub fn counted(&self) -> Vec<String> {
        self.state.lock().unwrap().counted.clone()
    }

    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Destination for MemoryDestination {
    async fn session(&self) -> Result<Box<dyn DestinationSession>> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemorySession {
            state: self.state.clone(),
            open_sessions: self.open_sessions.clone(),
        }))
    }

    fn schema(&self) -> &str {
        "public"
    }

    async fn close(&self) {}
}

pub struct MemorySession {
    state: Arc<Mutex<MemoryState>>,
    open_sessions: Arc<AtomicUsize>,
}

impl Drop for MemorySession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DestinationSession for MemorySession {
    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let mut state = self.state.lock().unwrap();
        state.counted.push(table.to_string());
        Ok(state.tables.get(table).map(BTreeSet::len).unwrap_or(0) as i64)
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.statements.push(sql.to_string());

        let (table, tuples) = parse_insert(sql)
            .ok_or_else(|| MigrateError::Config(format!("unexpected statement: {}", sql)))?;
        if state.fail_table.as_deref() == Some(table.as_str()) {
            return Err(MigrateError::Config("duplicate key violates constraint".into()));
        }

        let set = state.tables.entry(table).or_default();
        let inserted = tuples.into_iter().filter(|t| set.insert(t.clone())).count();
        Ok(inserted as u64)
    }
}

/// Split `INSERT INTO "s"."t" (...) VALUES (...), (...) ON CONFLICT DO NOTHING`
/// into the table name and the value tuples.
pub fn parse_insert(sql: &str) -> Option<(String, Vec<String>)> {
    let rest = sql.strip_prefix("INSERT INTO ")?;
    let (qualified, rest) = rest.split_once(" (")?;
    let table = qualified.rsplit_once("\".\"")?.1.trim_end_matches('"').to_string();
    let (_, values) = rest.split_once(") VALUES (")?;
    let values = values.strip_suffix(") ON CONFLICT DO NOTHING")?;
    Some((table, values.split("), (").map(str::to_string).collect()))
}

/// Source fake: a catalog plus row data per table.
#[derive(Default)]
pub struct MemorySource {
    pub catalog: MemoryCatalog,
    rows: HashMap<String, Vec<Row>>,
    /// Tables whose read fails after the first chunk.
    pub broken: Vec<String>,
}

impl MemorySource {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            ..Self::default()
        }
    }

    pub fn rows(mut self, table: &str, rows: Vec<Row>) -> Self {
        self.rows.insert(table.to_string(), rows);
        self
    }
}

#[async_trait]
impl MetadataReader for MemorySource {
    async fn list_tables(&self) -> Result<Vec<String>> {
        self.catalog.list_tables().await
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        self.catalog.list_columns(table).await
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>> {
        self.catalog.list_foreign_keys().await
    }

    fn db_type(&self) -> &str {
        "memory"
    }
}

#[async_trait]
impl SourceReader for MemorySource {
    async fn row_count(&self, table: &str) -> Result<i64> {
        Ok(self.rows.get(table).map(Vec::len).unwrap_or(0) as i64)
    }

    fn read_table(
        &self,
        table: &str,
        _columns: Vec<Column>,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<Vec<Row>>> {
        let (tx, rx) = mpsc::channel(2);
        let rows = self.rows.get(table).cloned().unwrap_or_default();
        let broken = self.broken.iter().any(|t| t == table);
        let table = table.to_string();

        tokio::spawn(async move {
            for (i, chunk) in rows.chunks(chunk_size.max(1)).enumerate() {
                if broken && i > 0 {
                    let _ = tx.send(Err(MigrateError::export(table, "lost connection"))).await;
                    return;
                }
                if tx.send(Ok(chunk.to_vec())).await.is_err() {
                    return;
                }
            }
        });
        rx
    }
}
