//! Export artifacts: one file per table in a single directory.
//!
//! - JSON: `<table>.json`, a top-level array of objects (`[]` when empty).
//!   Parsed wholesale on open.
//! - CSV: `<table>.csv`, header row plus rows (zero-byte file when empty).
//!   Read incrementally.
//!
//! Readers hand out rows already aligned to a caller-supplied column list,
//! so the loader never deals with per-format field lookup.

mod csv_file;
mod json_file;

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::value::Row;
use crate::error::{MigrateError, Result};

pub use csv_file::{CsvArtifactReader, CsvArtifactWriter};
pub use json_file::{JsonArtifactReader, JsonArtifactWriter};

/// On-disk format of the artifacts of one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    #[default]
    Json,
    Csv,
}

impl ArtifactFormat {
    /// File extension, without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ArtifactFormat::Json => "json",
            ArtifactFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ArtifactFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ArtifactFormat {
    type Err = MigrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "json" => Ok(ArtifactFormat::Json),
            "csv" => Ok(ArtifactFormat::Csv),
            other => Err(MigrateError::Config(format!(
                "Invalid artifact format '{}'. Valid values: json, csv",
                other
            ))),
        }
    }
}

/// Path of the artifact for `table`.
pub fn path_for(dir: &Path, table: &str, format: ArtifactFormat) -> PathBuf {
    dir.join(format!("{}.{}", table, format.extension()))
}

/// List the table names that have an artifact of `format` in `dir`, sorted.
///
/// Files with other extensions are ignored.
pub fn discover(dir: &Path, format: ArtifactFormat) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(MigrateError::ExportDirMissing(dir.to_path_buf()));
    }

    let mut tables = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some(format.extension()) {
            continue;
        }
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            tables.push(stem.to_string());
        }
    }
    tables.sort();

    debug!("Found {} {} artifacts in {}", tables.len(), format, dir.display());
    Ok(tables)
}

/// Reader over one artifact.
pub enum ArtifactReader {
    Json(JsonArtifactReader),
    Csv(CsvArtifactReader),
}

impl ArtifactReader {
    /// Open an artifact. A malformed file is a [`MigrateError::Parse`].
    pub fn open(path: &Path, format: ArtifactFormat) -> Result<Self> {
        match format {
            ArtifactFormat::Json => JsonArtifactReader::open(path).map(ArtifactReader::Json),
            ArtifactFormat::Csv => CsvArtifactReader::open(path).map(ArtifactReader::Csv),
        }
    }

    /// Column names: keys of the first JSON element, or the CSV header.
    pub fn columns(&self) -> &[String] {
        match self {
            ArtifactReader::Json(r) => r.columns(),
            ArtifactReader::Csv(r) => r.columns(),
        }
    }

    /// True when the artifact holds no rows.
    pub fn is_empty(&self) -> bool {
        match self {
            ArtifactReader::Json(r) => r.is_empty(),
            ArtifactReader::Csv(r) => r.is_empty(),
        }
    }

    /// Read up to `max` rows aligned to `columns`. `None` once exhausted.
    pub fn next_batch(&mut self, columns: &[String], max: usize) -> Result<Option<Vec<Row>>> {
        match self {
            ArtifactReader::Json(r) => Ok(r.next_batch(columns, max)),
            ArtifactReader::Csv(r) => r.next_batch(columns, max),
        }
    }

    /// Path the reader was opened from.
    pub fn path(&self) -> &Path {
        match self {
            ArtifactReader::Json(r) => r.path(),
            ArtifactReader::Csv(r) => r.path(),
        }
    }
}

/// Writer for one artifact.
pub enum ArtifactWriter {
    Json(JsonArtifactWriter),
    Csv(CsvArtifactWriter),
}

impl ArtifactWriter {
    /// Create (or truncate) the artifact at `path` for rows shaped by `columns`.
    pub fn create(path: &Path, format: ArtifactFormat, columns: Vec<String>) -> Result<Self> {
        match format {
            ArtifactFormat::Json => {
                JsonArtifactWriter::create(path, columns).map(ArtifactWriter::Json)
            }
            ArtifactFormat::Csv => CsvArtifactWriter::create(path, columns).map(ArtifactWriter::Csv),
        }
    }

    /// Append one row.
    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        match self {
            ArtifactWriter::Json(w) => w.write_row(row),
            ArtifactWriter::Csv(w) => w.write_row(row),
        }
    }

    /// Flush and close the artifact, returning the number of rows written.
    pub fn finish(self) -> Result<u64> {
        match self {
            ArtifactWriter::Json(w) => w.finish(),
            ArtifactWriter::Csv(w) => w.finish(),
        }
    }
}
