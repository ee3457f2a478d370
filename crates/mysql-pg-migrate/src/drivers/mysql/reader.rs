//! MySQL/MariaDB source: catalog metadata and chunked row reads.
//!
//! Uses SQLx for pooling. Row values are decoded by the column's catalog
//! `DATA_TYPE` into [`RowValue`]s ready to be written to an artifact.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::{Row as _, ValueRef};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SourceConfig;
use crate::core::identifier::{qualify_mysql, quote_mysql};
use crate::core::schema::{Column, ForeignKeyEdge, KeyRole};
use crate::core::traits::{MetadataReader, SourceReader};
use crate::core::value::{Row, RowValue};
use crate::error::{MigrateError, Result};

/// How long to wait for a pooled connection.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Chunks buffered between the read task and the artifact writer.
const READ_CHANNEL_DEPTH: usize = 4;

/// MySQL/MariaDB source reader.
pub struct MysqlReader {
    pool: MySqlPool,
    database: String,
}

impl MysqlReader {
    /// Connect to the source and check the connection.
    pub async fn new(config: &SourceConfig, max_conns: usize) -> Result<Self> {
        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(MySqlSslMode::Preferred);

        let pool = MySqlPoolOptions::new()
            .max_connections(max_conns.max(1) as u32)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL source pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL source connection"))?;

        info!("Connected to MySQL source: {}", config.display_url());

        Ok(Self {
            pool,
            database: config.database.clone(),
        })
    }

    /// Close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl SourceReader for MysqlReader {
    async fn row_count(&self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_mysql(&self.database, table)?);
        let count: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Tables with a single integer or character primary key are paged by
    /// key (`WHERE pk > last ORDER BY pk`). Other tables are paged by OFFSET
    /// over a total order: all primary key columns, or every column when the
    /// table has no primary key. The channel closes after the last chunk or
    /// after the first error.
    fn read_table(
        &self,
        table: &str,
        columns: Vec<Column>,
        chunk_size: usize,
    ) -> mpsc::Receiver<Result<Vec<Row>>> {
        let (tx, rx) = mpsc::channel(READ_CHANNEL_DEPTH);
        let pool = self.pool.clone();
        let database = self.database.clone();
        let table = table.to_string();

        tokio::spawn(async move {
            let result =
                read_table_chunks(pool, &database, &table, &columns, chunk_size.max(1), &tx).await;
            if let Err(e) = result {
                let _ = tx.send(Err(e)).await;
            }
        });

        rx
    }
}

/// How successive chunks of a table are addressed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Paging {
    /// Seek past the last key read; `index` is the key's column position.
    Keyset { index: usize, key: String },
    /// Skip the rows already read, in `order_by` order.
    Offset { order_by: String },
}

/// Last primary key value of a chunk, bound into the next keyset query.
#[derive(Debug, Clone, PartialEq)]
enum LastKey {
    Int(i64),
    UInt(u64),
    Text(String),
}

impl LastKey {
    fn from_value(value: &RowValue) -> Option<Self> {
        match value {
            RowValue::Number(n) => n
                .as_i64()
                .map(LastKey::Int)
                .or_else(|| n.as_u64().map(LastKey::UInt)),
            RowValue::String(s) => Some(LastKey::Text(s.clone())),
            _ => None,
        }
    }
}

fn is_keyset_type(data_type: &str) -> bool {
    matches!(
        data_type.to_lowercase().as_str(),
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "char" | "varchar"
    )
}

/// Pick the paging strategy for a table.
fn paging_for(table: &str, columns: &[Column]) -> Result<Paging> {
    let pk: Vec<(usize, &Column)> = columns
        .iter()
        .enumerate()
        .filter(|(_, c)| c.key_role == KeyRole::Primary)
        .collect();

    if let [(index, col)] = pk.as_slice() {
        if is_keyset_type(&col.data_type) {
            return Ok(Paging::Keyset {
                index: *index,
                key: quote_mysql(&col.name)?,
            });
        }
    }

    let ordered: Vec<&Column> = if pk.is_empty() {
        warn!(
            "{}: no primary key, paging by OFFSET ordered on every column",
            table
        );
        columns.iter().collect()
    } else {
        debug!("{}: primary key not usable as a cursor, paging by OFFSET", table);
        pk.iter().map(|(_, c)| *c).collect()
    };
    let order_by = ordered
        .iter()
        .map(|c| quote_mysql(&c.name))
        .collect::<Result<Vec<_>>>()?
        .join(", ");

    Ok(Paging::Offset { order_by })
}

/// Select-list entry for one column.
///
/// Temporal values are read as the server's own text: zero dates and TIME
/// values outside a day do not fit chrono types. YEAR is widened to an
/// integer.
fn select_expr(col: &Column) -> Result<String> {
    let name = quote_mysql(&col.name)?;
    Ok(match col.data_type.to_lowercase().as_str() {
        "date" | "time" | "datetime" | "timestamp" => {
            format!("CAST({} AS CHAR) AS {}", name, name)
        }
        "year" => format!("CAST({} AS SIGNED) AS {}", name, name),
        _ => name,
    })
}

/// SQL for the next chunk. `seek` is set once a keyset cursor exists.
fn page_query(base: &str, paging: &Paging, seek: bool, offset: usize, limit: usize) -> String {
    match paging {
        Paging::Keyset { key, .. } if seek => {
            format!("{} WHERE {} > ? ORDER BY {} LIMIT {}", base, key, key, limit)
        }
        Paging::Keyset { key, .. } => format!("{} ORDER BY {} LIMIT {}", base, key, limit),
        Paging::Offset { order_by } => format!(
            "{} ORDER BY {} LIMIT {} OFFSET {}",
            base, order_by, limit, offset
        ),
    }
}

async fn read_table_chunks(
    pool: MySqlPool,
    database: &str,
    table: &str,
    columns: &[Column],
    chunk_size: usize,
    tx: &mpsc::Sender<Result<Vec<Row>>>,
) -> Result<()> {
    let select_list = columns
        .iter()
        .map(select_expr)
        .collect::<Result<Vec<_>>>()?
        .join(", ");
    let base = format!("SELECT {} FROM {}", select_list, qualify_mysql(database, table)?);
    let mut paging = paging_for(table, columns)?;

    let mut last_key: Option<LastKey> = None;
    let mut read = 0usize;
    loop {
        let sql = page_query(&base, &paging, last_key.is_some(), read, chunk_size);
        let mut query = sqlx::query(&sql);
        if let (Paging::Keyset { .. }, Some(key)) = (&paging, &last_key) {
            query = match key {
                LastKey::Int(v) => query.bind(*v),
                LastKey::UInt(v) => query.bind(*v),
                LastKey::Text(v) => query.bind(v.clone()),
            };
        }
        let rows: Vec<MySqlRow> = query
            .fetch_all(&pool)
            .await
            .map_err(|e| MigrateError::export(table, e))?;

        let fetched = rows.len();
        if fetched == 0 {
            break;
        }
        debug!("{}: fetched {} rows after {}", table, fetched, read);

        let chunk = rows
            .iter()
            .map(|row| row_to_values(row, table, columns))
            .collect::<Result<Vec<Row>>>()?;
        read += fetched;

        if let Paging::Keyset { index, key } = &paging {
            last_key = chunk.last().and_then(|row| LastKey::from_value(&row[*index]));
            if last_key.is_none() {
                warn!("{}: primary key value not usable as a cursor, paging by OFFSET", table);
                paging = Paging::Offset {
                    order_by: key.clone(),
                };
            }
        }

        if tx.send(Ok(chunk)).await.is_err() {
            // Writer went away.
            break;
        }

        if fetched < chunk_size {
            break;
        }
    }

    Ok(())
}

/// Decode one MySQL row by catalog data type.
///
/// A value that cannot be decoded fails the table rather than being
/// exported as NULL.
fn row_to_values(row: &MySqlRow, table: &str, columns: &[Column]) -> Result<Row> {
    columns
        .iter()
        .enumerate()
        .map(|(i, col)| {
            let raw = row
                .try_get_raw(i)
                .map_err(|e| MigrateError::export(table, format!("column {}: {}", col.name, e)))?;
            if raw.is_null() {
                return Ok(RowValue::Null);
            }
            decode_value(row, i, &col.data_type.to_lowercase()).ok_or_else(|| {
                MigrateError::export(
                    table,
                    format!("column {}: cannot decode {} value", col.name, col.data_type),
                )
            })
        })
        .collect()
}

fn decode_value(row: &MySqlRow, i: usize, data_type: &str) -> Option<RowValue> {
    let decoded = match data_type {
        "tinyint" | "smallint" | "mediumint" | "int" | "integer" | "bigint" | "year" => row
            .try_get::<i64, _>(i)
            .map(RowValue::from)
            .or_else(|_| row.try_get::<u64, _>(i).map(RowValue::from))
            .ok(),

        "float" => row
            .try_get::<f32, _>(i)
            .ok()
            .map(|v| RowValue::from_f64(f64::from(v))),
        "double" | "real" => row.try_get::<f64, _>(i).ok().map(RowValue::from_f64),

        // Exact numerics travel as text so no precision is lost.
        "decimal" | "numeric" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .ok()
            .map(|d| RowValue::String(d.to_string())),

        "bool" | "boolean" => row.try_get::<bool, _>(i).ok().map(RowValue::Bool),
        "bit" => row
            .try_get::<bool, _>(i)
            .map(RowValue::Bool)
            .or_else(|_| row.try_get::<u64, _>(i).map(RowValue::from))
            .ok(),

        "binary" | "varbinary" | "blob" | "tinyblob" | "mediumblob" | "longblob" => row
            .try_get::<Vec<u8>, _>(i)
            .ok()
            .map(|b| RowValue::String(bytea_hex(&b))),

        "json" => decode_text(row, i).map(|s| json_value(&s)),

        // Temporal columns arrive as text from `select_expr`.
        _ => None,
    };

    decoded.or_else(|| decode_text(row, i).map(RowValue::String))
}

/// Text, or UTF-8 bytes for columns reported with a binary collation.
fn decode_text(row: &MySqlRow, i: usize) -> Option<String> {
    row.try_get::<String, _>(i).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(i)
            .ok()
            .map(|b| String::from_utf8(b.clone()).unwrap_or_else(|_| bytea_hex(&b)))
    })
}

/// JSON column text as a structured value; falls back to plain text.
fn json_value(text: &str) -> RowValue {
    serde_json::from_str::<serde_json::Value>(text)
        .map(RowValue::from)
        .unwrap_or_else(|_| RowValue::String(text.to_string()))
}

/// PostgreSQL bytea hex input format.
fn bytea_hex(bytes: &[u8]) -> String {
    format!("\\x{}", hex::encode(bytes))
}

fn key_role(column_key: &str, is_fk: bool) -> KeyRole {
    if column_key == "PRI" {
        KeyRole::Primary
    } else if is_fk {
        KeyRole::Foreign
    } else {
        KeyRole::None
    }
}

#[async_trait]
impl MetadataReader for MysqlReader {
    async fn list_tables(&self) -> Result<Vec<String>> {
        // CAST to CHAR: some servers report information_schema names as VARBINARY.
        let query = r#"
            SELECT CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME
            FROM INFORMATION_SCHEMA.TABLES
            WHERE TABLE_SCHEMA = ? AND TABLE_TYPE = 'BASE TABLE'
            ORDER BY TABLE_NAME
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::catalog("listing MySQL tables", e))?;

        let tables: Vec<String> = rows.iter().map(|r| r.get("TABLE_NAME")).collect();
        info!("Found {} tables in MySQL database '{}'", tables.len(), self.database);
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let query = r#"
            SELECT
                CAST(c.COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(c.DATA_TYPE AS CHAR(255)) AS DATA_TYPE,
                IF(c.IS_NULLABLE = 'YES', 1, 0) AS is_nullable,
                CAST(c.COLUMN_DEFAULT AS CHAR) AS COLUMN_DEFAULT,
                CAST(c.COLUMN_KEY AS CHAR(3)) AS COLUMN_KEY,
                IF(EXISTS (
                    SELECT 1 FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k
                    WHERE k.TABLE_SCHEMA = c.TABLE_SCHEMA
                      AND k.TABLE_NAME = c.TABLE_NAME
                      AND k.COLUMN_NAME = c.COLUMN_NAME
                      AND k.REFERENCED_TABLE_NAME IS NOT NULL
                ), 1, 0) AS is_fk
            FROM INFORMATION_SCHEMA.COLUMNS c
            WHERE c.TABLE_SCHEMA = ? AND c.TABLE_NAME = ?
            ORDER BY c.ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .bind(table)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::catalog(format!("listing MySQL columns of {}", table), e))?;

        let columns = rows
            .iter()
            .map(|row| {
                let column_key: String = row.try_get("COLUMN_KEY").unwrap_or_default();
                Column {
                    name: row.get("COLUMN_NAME"),
                    data_type: row.get("DATA_TYPE"),
                    is_nullable: row.get::<i64, _>("is_nullable") == 1,
                    default: row
                        .try_get::<Option<String>, _>("COLUMN_DEFAULT")
                        .ok()
                        .flatten(),
                    key_role: key_role(&column_key, row.get::<i64, _>("is_fk") == 1),
                }
            })
            .collect::<Vec<_>>();

        debug!("{}: {} columns", table, columns.len());
        Ok(columns)
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>> {
        let query = r#"
            SELECT
                CAST(TABLE_NAME AS CHAR(255)) AS TABLE_NAME,
                CAST(COLUMN_NAME AS CHAR(255)) AS COLUMN_NAME,
                CAST(REFERENCED_TABLE_NAME AS CHAR(255)) AS REFERENCED_TABLE_NAME,
                CAST(REFERENCED_COLUMN_NAME AS CHAR(255)) AS REFERENCED_COLUMN_NAME
            FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
            WHERE TABLE_SCHEMA = ?
              AND REFERENCED_TABLE_SCHEMA = TABLE_SCHEMA
              AND REFERENCED_TABLE_NAME IS NOT NULL
            ORDER BY TABLE_NAME, CONSTRAINT_NAME, ORDINAL_POSITION
        "#;

        let rows: Vec<MySqlRow> = sqlx::query(query)
            .bind(&self.database)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::catalog("listing MySQL foreign keys", e))?;

        let edges: Vec<ForeignKeyEdge> = rows
            .iter()
            .map(|row| ForeignKeyEdge {
                table: row.get("TABLE_NAME"),
                column: row.get("COLUMN_NAME"),
                ref_table: row.get("REFERENCED_TABLE_NAME"),
                ref_column: row.get("REFERENCED_COLUMN_NAME"),
            })
            .collect();

        let mut per_table: HashMap<&str, usize> = HashMap::new();
        for edge in &edges {
            *per_table.entry(edge.table.as_str()).or_default() += 1;
        }
        debug!(
            "Loaded {} foreign key columns across {} tables",
            edges.len(),
            per_table.len()
        );
        Ok(edges)
    }

    fn db_type(&self) -> &str {
        "mysql"
    }
}
