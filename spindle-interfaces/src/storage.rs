//! SQL-like storage interface
//!
//! Statements are plain SQL strings with positional `$n` placeholders and a
//! slice of dynamically typed [`SqlValue`] arguments. Query results come
//! back as JSON objects keyed by column name so that callers stay
//! independent of the driver's row types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Storage is closed")]
    Closed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// One result row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Outcome of a statement that returns no rows
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub rows_affected: u64,
}

/// Statement argument
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Uuid(Uuid),
    Timestamp(Option<DateTime<Utc>>),
    Json(Value),
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<u32> for SqlValue {
    fn from(value: u32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Float(value)
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<Uuid> for SqlValue {
    fn from(value: Uuid) -> Self {
        SqlValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(Some(value))
    }
}

impl From<Option<DateTime<Utc>>> for SqlValue {
    fn from(value: Option<DateTime<Utc>>) -> Self {
        SqlValue::Timestamp(value)
    }
}

impl From<Value> for SqlValue {
    fn from(value: Value) -> Self {
        SqlValue::Json(value)
    }
}

/// A group of statements executed atomically
#[async_trait]
pub trait Batch: Send {
    /// Queue a statement
    fn add(&mut self, query: &str, args: Vec<SqlValue>);

    /// Number of queued statements
    fn size(&self) -> usize;

    /// Execute every queued statement, all or nothing.
    ///
    /// The queued statements are consumed whatever the outcome.
    async fn execute(&mut self) -> StorageResult<()>;
}

/// Persistent store used for task history and structured logs
#[async_trait]
pub trait Storage: Send + Sync {
    /// Backend name, used to select the SQL dialect (`timescaledb`, `questdb`, ...)
    fn name(&self) -> &str;

    /// Execute a statement that returns no rows
    async fn exec(&self, query: &str, args: &[SqlValue]) -> StorageResult<ExecResult>;

    /// Run a query and collect every row
    async fn query(&self, query: &str, args: &[SqlValue]) -> StorageResult<Vec<Row>>;

    /// Run a query and return its first row, if any
    async fn query_row(&self, query: &str, args: &[SqlValue]) -> StorageResult<Option<Row>> {
        Ok(self.query(query, args).await?.into_iter().next())
    }

    /// Start an empty batch
    fn new_batch(&self) -> Box<dyn Batch>;

    /// Release the connection pool
    async fn close(&self) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct FixedRows(Vec<Row>);

    struct NoopBatch;

    #[async_trait]
    impl Batch for NoopBatch {
        fn add(&mut self, _query: &str, _args: Vec<SqlValue>) {}

        fn size(&self) -> usize {
            0
        }

        async fn execute(&mut self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Storage for FixedRows {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn exec(&self, _query: &str, _args: &[SqlValue]) -> StorageResult<ExecResult> {
            Ok(ExecResult::default())
        }

        async fn query(&self, _query: &str, _args: &[SqlValue]) -> StorageResult<Vec<Row>> {
            Ok(self.0.clone())
        }

        fn new_batch(&self) -> Box<dyn Batch> {
            Box::new(NoopBatch)
        }

        async fn close(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_query_row_returns_first_row() {
        let storage = FixedRows(vec![row(json!({"n": 1})), row(json!({"n": 2}))]);
        let first = storage.query_row("SELECT n", &[]).await.unwrap();
        assert_eq!(first, Some(row(json!({"n": 1}))));

        let empty = FixedRows(Vec::new());
        assert_eq!(empty.query_row("SELECT n", &[]).await.unwrap(), None);
    }

    #[test]
    fn test_sql_value_conversions() {
        let id = Uuid::new_v4();
        assert_eq!(SqlValue::from(id), SqlValue::Uuid(id));
        assert_eq!(SqlValue::from(3u32), SqlValue::Int(3));
        assert_eq!(SqlValue::from("x"), SqlValue::Text("x".to_string()));
        assert_eq!(SqlValue::from(None::<DateTime<Utc>>), SqlValue::Timestamp(None));
    }
}
