//! Query data types

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A database value passed as a statement parameter or read from a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit signed integer
    Int64(i64),
    /// 64-bit unsigned integer (BIGINT UNSIGNED beyond i64)
    UInt64(u64),
    /// 32-bit floating point
    Float32(f32),
    /// 64-bit floating point
    Float64(f64),
    /// Decimal/Numeric (stored as string for precision)
    Decimal(String),
    /// UTF-8 string
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
    /// Date without time
    Date(NaiveDate),
    /// DateTime without timezone (server-local, as MySQL DATETIME stores it)
    DateTime(NaiveDateTime),
}

impl Value {
    /// Try to get as a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Decimal(s) => Some(s),
            _ => None,
        }
    }

    /// Try to get as i64
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(*v as i64),
            Value::String(s) => s.parse::<i64>().ok(),
            _ => None,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Int64(v) => write!(f, "{}", v),
            Value::UInt64(v) => write!(f, "{}", v),
            Value::Float32(v) => write!(f, "{}", v),
            Value::Float64(v) => write!(f, "{}", v),
            Value::Decimal(v) => write!(f, "{}", v),
            Value::String(v) => write!(f, "{}", v),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
            Value::Date(v) => write!(f, "{}", v),
            Value::DateTime(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Value::Null)
    }
}

/// A row from a query result
#[derive(Debug, Clone)]
pub struct Row {
    /// Column values
    pub values: Vec<Value>,
    /// Column names (shared between all rows of a result)
    columns: Arc<[String]>,
}

impl Row {
    /// Create a new row
    pub fn new(columns: Arc<[String]>, values: Vec<Value>) -> Self {
        Self { values, columns }
    }

    /// Get a value by column index
    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Get column names
    pub fn columns(&self) -> &[String] {
        &self.columns
    }
}

/// Query result
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Column names in result order
    pub columns: Arc<[String]>,
    /// Result rows
    pub rows: Vec<Row>,
    /// Execution time in milliseconds
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Create a new empty query result
    pub fn empty() -> Self {
        Self {
            columns: Arc::from(Vec::<String>::new()),
            rows: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Check if the result has rows
    pub fn has_rows(&self) -> bool {
        !self.rows.is_empty()
    }

    /// Get the number of columns
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Get the number of rows
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// First value of the first row, for scalar queries like `SELECT COUNT(*)`
    pub fn scalar(&self) -> Option<&Value> {
        self.rows.first().and_then(|row| row.get(0))
    }
}

/// Outcome of a data-modifying statement
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatementResult {
    /// Rows affected by INSERT/UPDATE/DELETE
    pub affected_rows: u64,
    /// Auto-increment id generated by an INSERT, if any
    pub last_insert_id: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn sample_row() -> Row {
        let columns: Arc<[String]> = Arc::from(vec!["id".to_string(), "title".to_string()]);
        Row::new(columns, vec![Value::Int64(7), Value::from("hello")])
    }

    #[test]
    fn test_row_lookup() {
        let row = sample_row();
        assert_eq!(row.get(1), Some(&Value::String("hello".into())));
        assert_eq!(row.get(2), None);
        assert_eq!(row.get(0).and_then(Value::as_i64), Some(7));
        assert_eq!(row.columns(), ["id".to_string(), "title".to_string()]);
    }

    #[test]
    fn test_scalar() {
        let row = sample_row();
        let result = QueryResult {
            columns: Arc::from(vec!["id".to_string(), "title".to_string()]),
            rows: vec![row],
            execution_time_ms: 1,
        };
        assert_eq!(result.scalar(), Some(&Value::Int64(7)));
        assert!(QueryResult::empty().scalar().is_none());
    }

    #[test]
    fn test_value_conversions() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::String("x".into()));
        assert_eq!(Value::UInt64(u64::MAX).as_i64(), None);
    }

    #[test]
    fn test_value_display() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Bytes(vec![1, 2, 3]).to_string(), "<3 bytes>");
    }
}
