//! JSON array artifacts.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::core::value::{Row, RowValue};
use crate::error::{MigrateError, Result};

/// Reads a whole JSON artifact into memory and hands it out in batches.
pub struct JsonArtifactReader {
    path: PathBuf,
    columns: Vec<String>,
    rows: VecDeque<Map<String, Value>>,
}

impl JsonArtifactReader {
    /// Parse the artifact. A zero-byte file reads as an empty table.
    pub fn open(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        let parse_err = |message: String| MigrateError::parse(path.display().to_string(), message);

        let rows = if bytes.iter().all(u8::is_ascii_whitespace) {
            VecDeque::new()
        } else {
            let value: Value =
                serde_json::from_slice(&bytes).map_err(|e| parse_err(e.to_string()))?;
            let Value::Array(items) = value else {
                return Err(parse_err("top-level value is not an array".to_string()));
            };

            let mut rows = VecDeque::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                match item {
                    Value::Object(map) => rows.push_back(map),
                    _ => return Err(parse_err(format!("element {} is not an object", i))),
                }
            }
            rows
        };

        // Key order of the first element is preserved (serde_json preserve_order).
        let columns = rows
            .front()
            .map(|first| first.keys().cloned().collect())
            .unwrap_or_default();

        Ok(Self {
            path: path.to_path_buf(),
            columns,
            rows,
        })
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take up to `max` rows. Absent keys become NULL, unknown keys are dropped.
    pub fn next_batch(&mut self, columns: &[String], max: usize) -> Option<Vec<Row>> {
        if self.rows.is_empty() {
            return None;
        }

        let take = max.max(1).min(self.rows.len());
        let batch = self
            .rows
            .drain(..take)
            .map(|mut object| {
                columns
                    .iter()
                    .map(|c| object.remove(c).map(RowValue::from).unwrap_or(RowValue::Null))
                    .collect()
            })
            .collect();
        Some(batch)
    }
}

/// Streams rows into a JSON array, one object per line.
pub struct JsonArtifactWriter {
    out: BufWriter<File>,
    columns: Vec<String>,
    rows: u64,
}

impl JsonArtifactWriter {
    pub fn create(path: &Path, columns: Vec<String>) -> Result<Self> {
        let mut out = BufWriter::new(File::create(path)?);
        out.write_all(b"[")?;
        Ok(Self {
            out,
            columns,
            rows: 0,
        })
    }

    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if self.rows > 0 {
            self.out.write_all(b",")?;
        }
        self.out.write_all(b"\n")?;

        let object: Map<String, Value> = self
            .columns
            .iter()
            .zip(row)
            .map(|(name, value)| (name.clone(), value.to_json()))
            .collect();
        serde_json::to_writer(&mut self.out, &Value::Object(object))?;

        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        if self.rows > 0 {
            self.out.write_all(b"\n")?;
        }
        self.out.write_all(b"]")?;
        self.out.flush()?;
        Ok(self.rows)
    }
}
