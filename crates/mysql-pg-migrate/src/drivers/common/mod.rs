//! Shared driver utilities.
//!
//! - [`tls`]: rustls setup for PostgreSQL connections

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
