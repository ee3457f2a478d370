//! PostgreSQL destination: pooled sessions for counting and inserting.
//!
//! Uses deadpool-postgres. A [`PostgresSession`] owns a checked-out
//! `deadpool_postgres::Object`; dropping the session returns the connection
//! to the pool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use tokio_postgres::Config as PgConfig;
use tracing::{info, warn};

use super::catalog::PostgresCatalog;
use crate::config::TargetConfig;
use crate::core::identifier::qualify_pg;
use crate::core::traits::{Destination, DestinationSession};
use crate::drivers::common::{SslMode, TlsBuilder};
use crate::error::{MigrateError, Result};

/// Connection timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// Import is sequential; one connection for the session plus one for catalog
/// queries issued while it is held.
const DEFAULT_MAX_CONNECTIONS: usize = 2;

/// PostgreSQL destination.
pub struct PostgresDestination {
    pool: Pool,
    schema: String,
}

impl PostgresDestination {
    /// Build the pool and check the connection.
    pub async fn new(config: &TargetConfig) -> Result<Self> {
        Self::with_max_connections(config, DEFAULT_MAX_CONNECTIONS).await
    }

    pub async fn with_max_connections(config: &TargetConfig, max_conns: usize) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .dbname(&config.database)
            .user(&config.user)
            .password(&config.password)
            .keepalives(true)
            .keepalives_idle(Duration::from_secs(30))
            .connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let ssl_mode = SslMode::parse(&config.ssl_mode)?;
        let mgr = match TlsBuilder::new(ssl_mode).build()? {
            Some(tls) => Manager::from_config(pg_config, tls, mgr_config),
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config)
            }
        };
        let pool = Pool::builder(mgr)
            .max_size(max_conns.max(1))
            .build()
            .map_err(|e| MigrateError::pool(e, "creating PostgreSQL destination pool"))?;

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL destination connection"))?;
        client.simple_query("SELECT 1").await?;

        info!("Connected to PostgreSQL destination: {}", config.display_url());

        Ok(Self {
            pool,
            schema: config.schema.clone(),
        })
    }

    /// Catalog reader over the same pool and schema.
    pub fn catalog(&self) -> PostgresCatalog {
        PostgresCatalog::new(self.pool.clone(), self.schema.clone())
    }
}

#[async_trait]
impl Destination for PostgresDestination {
    async fn session(&self) -> Result<Box<dyn DestinationSession>> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "checking out destination session"))?;
        Ok(Box::new(PostgresSession {
            client,
            schema: self.schema.clone(),
        }))
    }

    fn schema(&self) -> &str {
        &self.schema
    }

    async fn close(&self) {
        self.pool.close();
    }
}

/// One pooled destination connection.
pub struct PostgresSession {
    client: deadpool_postgres::Object,
    schema: String,
}

#[async_trait]
impl DestinationSession for PostgresSession {
    async fn row_count(&mut self, table: &str) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", qualify_pg(&self.schema, table)?);
        let row = self.client.query_one(sql.as_str(), &[]).await?;
        Ok(row.get(0))
    }

    async fn execute(&mut self, sql: &str) -> Result<u64> {
        Ok(self.client.execute(sql, &[]).await?)
    }
}
