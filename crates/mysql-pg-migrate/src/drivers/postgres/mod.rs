//! PostgreSQL driver.
//!
//! - [`PostgresCatalog`]: Metadata reader for the destination schema
//! - [`PostgresDestination`]: Pooled sessions that count and insert rows

mod catalog;
mod writer;

pub use catalog::PostgresCatalog;
pub use writer::{PostgresDestination, PostgresSession};
