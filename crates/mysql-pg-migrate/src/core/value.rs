//! Row value types for artifact-based data transfer.
//!
//! Rows parsed out of JSON or CSV artifacts carry heterogeneous field types.
//! [`RowValue`] is the tagged representation produced by the parsers and by
//! the MySQL exporter; rendering it into SQL is an exhaustive match over the
//! variants.

use std::fmt;

use serde_json::{Number, Value};

/// A single field value of an exported row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowValue {
    /// SQL NULL or a missing field.
    Null,

    /// Boolean value.
    Bool(bool),

    /// Integer or floating point number.
    Number(Number),

    /// Text value.
    String(String),

    /// Structured value: a JSON object or array.
    Object(Value),
}

/// A row of values aligned to a column list.
pub type Row = Vec<RowValue>;

impl RowValue {
    /// Check if this value is NULL.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, RowValue::Null)
    }

    /// Render as a PostgreSQL literal for a multi-row INSERT.
    ///
    /// Everything that is not NULL becomes a single-quoted string literal and
    /// PostgreSQL coerces it to the column type.
    ///
    /// - `Object` is serialized compactly, then quoted.
    /// - `String` is quoted as written. Text that looks like a JSON object or
    ///   array is not reparsed or reformatted, so a `json` column receives
    ///   the artifact's exact text; only embedded `'` are doubled.
    pub fn to_sql_literal(&self) -> String {
        match self {
            RowValue::Null => "NULL".to_string(),
            RowValue::Object(value) => quote_literal(&value.to_string()),
            RowValue::String(s) => quote_literal(s),
            RowValue::Number(n) => quote_literal(&n.to_string()),
            RowValue::Bool(b) => quote_literal(if *b { "true" } else { "false" }),
        }
    }

    /// Convert to a JSON value for the JSON artifact writer.
    pub fn to_json(&self) -> Value {
        match self {
            RowValue::Null => Value::Null,
            RowValue::Bool(b) => Value::Bool(*b),
            RowValue::Number(n) => Value::Number(n.clone()),
            RowValue::String(s) => Value::String(s.clone()),
            RowValue::Object(v) => v.clone(),
        }
    }

    /// Convert to a CSV field.
    ///
    /// NULL is written as `\N` so it stays distinct from an empty string.
    /// Text that already reads as the marker (`\N`, `\\N`, ...) gets one
    /// more leading backslash.
    pub fn to_csv_field(&self) -> String {
        match self {
            RowValue::Null => CSV_NULL.to_string(),
            RowValue::Bool(b) => b.to_string(),
            RowValue::Number(n) => n.to_string(),
            RowValue::String(s) if is_escaped_null_marker(s) => format!("\\{}", s),
            RowValue::String(s) => s.clone(),
            RowValue::Object(v) => v.to_string(),
        }
    }

    /// Build a value from a CSV field; the inverse of [`RowValue::to_csv_field`].
    /// An empty field is an empty string.
    pub fn from_csv_field(field: &str) -> Self {
        if field == CSV_NULL {
            RowValue::Null
        } else if is_escaped_null_marker(field) {
            RowValue::String(field[1..].to_string())
        } else {
            RowValue::String(field.to_string())
        }
    }

    /// Build a number from an f64, mapping NaN and infinities to NULL.
    pub fn from_f64(v: f64) -> Self {
        Number::from_f64(v).map(RowValue::Number).unwrap_or(RowValue::Null)
    }
}

/// NULL marker in CSV artifacts, as in PostgreSQL `COPY`.
pub const CSV_NULL: &str = "\\N";

/// One or more backslashes followed by `N`.
fn is_escaped_null_marker(s: &str) -> bool {
    s.len() >= 2 && s.ends_with('N') && s[..s.len() - 1].bytes().all(|b| b == b'\\')
}

/// Wrap text in single quotes, doubling embedded quotes.
fn quote_literal(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

impl From<Value> for RowValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => RowValue::Null,
            Value::Bool(b) => RowValue::Bool(b),
            Value::Number(n) => RowValue::Number(n),
            Value::String(s) => RowValue::String(s),
            v @ (Value::Object(_) | Value::Array(_)) => RowValue::Object(v),
        }
    }
}

impl From<bool> for RowValue {
    fn from(v: bool) -> Self {
        RowValue::Bool(v)
    }
}

impl From<i64> for RowValue {
    fn from(v: i64) -> Self {
        RowValue::Number(v.into())
    }
}

impl From<u64> for RowValue {
    fn from(v: u64) -> Self {
        RowValue::Number(v.into())
    }
}

impl From<String> for RowValue {
    fn from(v: String) -> Self {
        RowValue::String(v)
    }
}

impl From<&str> for RowValue {
    fn from(v: &str) -> Self {
        RowValue::String(v.to_string())
    }
}

impl fmt::Display for RowValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_sql_literal())
    }
}

/// A bounded group of rows inserted with one statement.
#[derive(Debug, Default)]
pub struct Batch {
    /// Rows in this batch, aligned to the loader's column list.
    pub rows: Vec<Row>,

    /// 1-based position of this batch within its table.
    pub number: usize,
}

impl Batch {
    /// Create a new batch with the given rows.
    pub fn new(number: usize, rows: Vec<Row>) -> Self {
        Self { rows, number }
    }

    /// Get the number of rows in this batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the batch is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
