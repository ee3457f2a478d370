//! Database drivers.
//!
//! - [`mysql`]: MySQL/MariaDB source (catalog and row export)
//! - [`postgres`]: PostgreSQL destination (catalog, sessions, inserts)
//! - [`common`]: Shared utilities (TLS)
//!
//! Each driver implements the traits in [`crate::core::traits`], so the
//! orchestrator never depends on a concrete database.

pub mod common;
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mysql::MysqlReader;
pub use postgres::{PostgresCatalog, PostgresDestination, PostgresSession};
