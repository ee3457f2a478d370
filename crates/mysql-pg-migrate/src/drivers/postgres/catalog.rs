//! PostgreSQL catalog queries for the destination schema.

use async_trait::async_trait;
use deadpool_postgres::Pool;
use tracing::debug;

use crate::core::schema::{Column, ForeignKeyEdge, KeyRole};
use crate::core::traits::MetadataReader;
use crate::error::{MigrateError, Result};

/// Reads tables, columns and foreign keys of one PostgreSQL schema.
#[derive(Clone)]
pub struct PostgresCatalog {
    pool: Pool,
    schema: String,
}

impl PostgresCatalog {
    pub fn new(pool: Pool, schema: impl Into<String>) -> Self {
        Self {
            pool,
            schema: schema.into(),
        }
    }

    async fn client(&self, context: &str) -> Result<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, format!("getting connection for {}", context)))
    }
}

fn parse_key_role(role: &str) -> KeyRole {
    match role {
        "primary" => KeyRole::Primary,
        "foreign" => KeyRole::Foreign,
        _ => KeyRole::None,
    }
}

#[async_trait]
impl MetadataReader for PostgresCatalog {
    async fn list_tables(&self) -> Result<Vec<String>> {
        let client = self.client("list_tables").await?;
        let query = r#"
            SELECT table_name::text
            FROM information_schema.tables
            WHERE table_schema = $1 AND table_type = 'BASE TABLE'
            ORDER BY table_name
        "#;

        let rows = client
            .query(query, &[&self.schema])
            .await
            .map_err(|e| MigrateError::catalog("listing PostgreSQL tables", e))?;

        let tables: Vec<String> = rows.iter().map(|r| r.get(0)).collect();
        debug!("Found {} tables in schema '{}'", tables.len(), self.schema);
        Ok(tables)
    }

    async fn list_columns(&self, table: &str) -> Result<Vec<Column>> {
        let client = self.client("list_columns").await?;
        let query = r#"
            WITH keys AS (
                SELECT a.attname::text AS column_name, k.contype
                FROM pg_catalog.pg_constraint k
                JOIN pg_catalog.pg_class t ON t.oid = k.conrelid
                JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
                JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(k.conkey)
                WHERE n.nspname = $1 AND t.relname = $2 AND k.contype IN ('p', 'f')
            )
            SELECT
                c.column_name::text,
                c.data_type::text,
                c.is_nullable = 'YES',
                c.column_default::text,
                CASE
                    WHEN EXISTS (SELECT 1 FROM keys
                                 WHERE keys.column_name = c.column_name::text
                                   AND keys.contype = 'p') THEN 'primary'
                    WHEN EXISTS (SELECT 1 FROM keys
                                 WHERE keys.column_name = c.column_name::text
                                   AND keys.contype = 'f') THEN 'foreign'
                    ELSE 'none'
                END
            FROM information_schema.columns c
            WHERE c.table_schema = $1 AND c.table_name = $2
            ORDER BY c.ordinal_position
        "#;

        let rows = client
            .query(query, &[&self.schema, &table])
            .await
            .map_err(|e| MigrateError::catalog(format!("listing columns of {}", table), e))?;

        let columns: Vec<Column> = rows
            .iter()
            .map(|row| Column {
                name: row.get(0),
                data_type: row.get(1),
                is_nullable: row.get(2),
                default: row.get(3),
                key_role: parse_key_role(row.get::<_, &str>(4)),
            })
            .collect();

        debug!("{}: {} destination columns", table, columns.len());
        Ok(columns)
    }

    async fn list_foreign_keys(&self) -> Result<Vec<ForeignKeyEdge>> {
        let client = self.client("list_foreign_keys").await?;
        // One row per column pair; multi-column keys yield several edges
        // between the same tables.
        let query = r#"
            SELECT t.relname::text, a.attname::text, rt.relname::text, ra.attname::text
            FROM pg_catalog.pg_constraint c
            JOIN pg_catalog.pg_class t ON t.oid = c.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = t.relnamespace
            JOIN pg_catalog.pg_class rt ON rt.oid = c.confrelid
            JOIN pg_catalog.pg_namespace rn ON rn.oid = rt.relnamespace
            CROSS JOIN LATERAL unnest(c.conkey, c.confkey) AS k(attnum, ref_attnum)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = t.oid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = rt.oid AND ra.attnum = k.ref_attnum
            WHERE c.contype = 'f' AND n.nspname = $1 AND rn.nspname = $1
            ORDER BY t.relname, c.conname
        "#;

        let rows = client
            .query(query, &[&self.schema])
            .await
            .map_err(|e| MigrateError::catalog("listing PostgreSQL foreign keys", e))?;

        let edges: Vec<ForeignKeyEdge> = rows
            .iter()
            .map(|row| ForeignKeyEdge {
                table: row.get(0),
                column: row.get(1),
                ref_table: row.get(2),
                ref_column: row.get(3),
            })
            .collect();

        debug!("Found {} foreign key columns in schema '{}'", edges.len(), self.schema);
        Ok(edges)
    }

    fn db_type(&self) -> &str {
        "postgres"
    }
}
