//! CSV artifacts: header row plus data rows, read incrementally.
//!
//! SQL NULL is the unquoted field `\N`; an empty field is an empty string.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, WriterBuilder};

use crate::core::value::{Row, RowValue};
use crate::error::{MigrateError, Result};

/// Incremental CSV reader. One record is read ahead so emptiness is known
/// before the first batch.
pub struct CsvArtifactReader {
    path: PathBuf,
    columns: Vec<String>,
    reader: csv::Reader<File>,
    pending: Option<StringRecord>,
}

impl CsvArtifactReader {
    /// Open the artifact and read its header. A zero-byte file has no
    /// columns and no rows.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);

        let columns = reader
            .headers()
            .map_err(|e| MigrateError::parse(path.display().to_string(), e))?
            .iter()
            .map(str::to_string)
            .collect();

        let mut this = Self {
            path: path.to_path_buf(),
            columns,
            reader,
            pending: None,
        };
        this.pending = this.read_record()?;
        Ok(this)
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_none()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_record(&mut self) -> Result<Option<StringRecord>> {
        let mut record = StringRecord::new();
        match self.reader.read_record(&mut record) {
            Ok(true) => Ok(Some(record)),
            Ok(false) => Ok(None),
            Err(e) => Err(MigrateError::parse(self.path.display().to_string(), e)),
        }
    }

    /// Read up to `max` rows aligned to `columns`. Columns absent from the
    /// header read as NULL.
    pub fn next_batch(&mut self, columns: &[String], max: usize) -> Result<Option<Vec<Row>>> {
        let positions: Vec<Option<usize>> = columns
            .iter()
            .map(|c| self.columns.iter().position(|h| h == c))
            .collect();

        let max = max.max(1);
        let mut rows = Vec::with_capacity(max);
        while rows.len() < max {
            let record = match self.pending.take() {
                Some(record) => record,
                None => match self.read_record()? {
                    Some(record) => record,
                    None => break,
                },
            };

            let row: Row = positions
                .iter()
                .map(|pos| {
                    pos.and_then(|i| record.get(i))
                        .map(RowValue::from_csv_field)
                        .unwrap_or(RowValue::Null)
                })
                .collect();
            rows.push(row);
        }

        Ok(if rows.is_empty() { None } else { Some(rows) })
    }
}

/// CSV writer. The header goes out with the first row, so a table with no
/// rows leaves a zero-byte file.
pub struct CsvArtifactWriter {
    writer: csv::Writer<File>,
    columns: Vec<String>,
    rows: u64,
}

impl CsvArtifactWriter {
    pub fn create(path: &Path, columns: Vec<String>) -> Result<Self> {
        let writer = WriterBuilder::new().from_path(path)?;
        Ok(Self {
            writer,
            columns,
            rows: 0,
        })
    }

    pub fn write_row(&mut self, row: &Row) -> Result<()> {
        if self.rows == 0 {
            self.writer.write_record(&self.columns)?;
        }
        self.writer
            .write_record(row.iter().map(RowValue::to_csv_field))?;
        self.rows += 1;
        Ok(())
    }

    pub fn finish(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("t.csv");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_header_is_column_list() {
        let dir = TempDir::new().unwrap();
        let reader = CsvArtifactReader::open(&write(&dir, "id,Name\n1,a\n")).unwrap();
        assert_eq!(reader.columns(), names(&["id", "Name"]).as_slice());
        assert!(!reader.is_empty());
    }

    #[test]
    fn test_rows_aligned_to_requested_columns() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "name,id\nalice,1\n\\N,2\n");

        let mut reader = CsvArtifactReader::open(&path).unwrap();
        let rows = reader
            .next_batch(&names(&["id", "name", "email"]), 10)
            .unwrap()
            .unwrap();
        assert_eq!(
            rows[0],
            vec![RowValue::from("1"), RowValue::from("alice"), RowValue::Null]
        );
        assert_eq!(rows[1], vec![RowValue::from("2"), RowValue::Null, RowValue::Null]);
        assert!(reader.next_batch(&names(&["id"]), 10).unwrap().is_none());
    }

    #[test]
    fn test_incremental_batches() {
        let dir = TempDir::new().unwrap();
        let mut body = String::from("id\n");
        for i in 0..7 {
            body.push_str(&format!("{}\n", i));
        }
        let path = write(&dir, &body);

        let mut reader = CsvArtifactReader::open(&path).unwrap();
        let cols = names(&["id"]);
        let sizes: Vec<usize> = std::iter::from_fn(|| reader.next_batch(&cols, 3).unwrap())
            .map(|b| b.len())
            .collect();
        assert_eq!(sizes, vec![3, 3, 1]);
    }

    #[test]
    fn test_zero_byte_and_header_only_are_empty() {
        let dir = TempDir::new().unwrap();

        let reader = CsvArtifactReader::open(&write(&dir, "")).unwrap();
        assert!(reader.is_empty());
        assert!(reader.columns().is_empty());

        let reader = CsvArtifactReader::open(&write(&dir, "id,name\n")).unwrap();
        assert!(reader.is_empty());
        assert_eq!(reader.columns().len(), 2);
    }

    #[test]
    fn test_ragged_row_is_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "a,b\n1,2\n3\n");

        let mut reader = CsvArtifactReader::open(&path).unwrap();
        let err = reader.next_batch(&names(&["a", "b"]), 10).unwrap_err();
        assert!(matches!(err, MigrateError::Parse { .. }));
    }

    #[test]
    fn test_writer_quotes_embedded_separators() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("w.csv");

        let mut writer = CsvArtifactWriter::create(&path, names(&["id", "note"])).unwrap();
        writer
            .write_row(&vec![RowValue::from(1i64), RowValue::from("a, \"b\"")])
            .unwrap();
        writer.finish().unwrap();

        let mut reader = CsvArtifactReader::open(&path).unwrap();
        let rows = reader.next_batch(&names(&["id", "note"]), 10).unwrap().unwrap();
        assert_eq!(rows[0][1], RowValue::from("a, \"b\""));
    }

    #[test]
    fn test_null_and_empty_string_survive_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("notes.csv");
        let cols = names(&["id", "note"]);

        let mut writer = CsvArtifactWriter::create(&path, cols.clone()).unwrap();
        writer.write_row(&vec![RowValue::from(1i64), RowValue::from("")]).unwrap();
        writer.write_row(&vec![RowValue::from(2i64), RowValue::Null]).unwrap();
        writer.write_row(&vec![RowValue::from(3i64), RowValue::from("\\N")]).unwrap();
        assert_eq!(writer.finish().unwrap(), 3);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[2], "2,\\N");
        assert_eq!(lines[3], "3,\\\\N");

        let mut reader = CsvArtifactReader::open(&path).unwrap();
        let rows = reader.next_batch(&cols, 10).unwrap().unwrap();
        assert_eq!(rows[0][1], RowValue::from(""));
        assert_eq!(rows[1][1], RowValue::Null);
        assert_eq!(rows[2][1], RowValue::from("\\N"));
    }
}
