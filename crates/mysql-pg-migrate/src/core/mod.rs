//! Core abstractions for the migration pipeline.
//!
//! - [`schema`]: Column and foreign key metadata types
//! - [`identifier`]: Identifier validation and quoting
//! - [`value`]: Tagged row values parsed from or written to artifacts
//! - [`traits`]: Metadata and destination traits implemented by drivers
//!
//! The core module is database-agnostic; `drivers/mysql` and
//! `drivers/postgres` implement the traits against real databases.

pub mod identifier;
pub mod schema;
pub mod traits;
pub mod value;

pub use identifier::{qualify_mysql, qualify_pg, quote_mysql, quote_pg};
pub use schema::{Column, ForeignKeyEdge, KeyRole};
pub use traits::{Destination, DestinationSession, MetadataReader, SourceReader};
pub use value::{Batch, Row, RowValue};
