//! PostgreSQL wire-protocol storage (TimescaleDB, QuestDB)

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;
use spindle_config::{StorageConfig, StorageDialect};
use spindle_interfaces::{Batch, ExecResult, Row, SqlValue, Storage, StorageError, StorageResult};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::{Arguments, Column, Row as _, TypeInfo};
use tracing::{debug, info};

/// sqlx-backed storage
pub struct PostgresStorage {
    pool: PgPool,
    dialect: StorageDialect,
}

impl PostgresStorage {
    /// Connect a pool using `config.url`
    pub async fn connect(config: &StorageConfig) -> StorageResult<Self> {
        info!(
            "Connecting to {} storage (max {} connections)",
            config.dialect.as_str(),
            config.max_connections
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.connection_timeout)
            .connect(&config.url)
            .await
            .map_err(|e| StorageError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_pool(pool, config.dialect))
    }

    /// Wrap an existing pool
    pub fn from_pool(pool: PgPool, dialect: StorageDialect) -> Self {
        Self { pool, dialect }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Encode dynamic arguments for a prepared statement
fn encode_arguments(args: &[SqlValue]) -> StorageResult<PgArguments> {
    let mut encoded = PgArguments::default();
    for (index, value) in args.iter().enumerate() {
        let added = match value.clone() {
            SqlValue::Null => encoded.add(None::<String>),
            SqlValue::Bool(v) => encoded.add(v),
            SqlValue::Int(v) => encoded.add(v),
            SqlValue::Float(v) => encoded.add(v),
            SqlValue::Text(v) => encoded.add(v),
            SqlValue::Uuid(v) => encoded.add(v),
            SqlValue::Timestamp(v) => encoded.add(v),
            SqlValue::Json(v) => encoded.add(sqlx::types::Json(v)),
        };
        added.map_err(|e| StorageError::InvalidArgument(format!("${}: {}", index + 1, e)))?;
    }
    Ok(encoded)
}

/// How a result column is decoded, keyed by the server's type name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnKind {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Uuid,
    Timestamp,
    TimestampTz,
    Date,
    Json,
    Text,
}

impl ColumnKind {
    /// Unknown types are read as text
    fn from_type_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Self::Bool,
            "INT2" | "SMALLINT" => Self::Int2,
            "INT4" | "INT" | "INTEGER" => Self::Int4,
            "INT8" | "BIGINT" => Self::Int8,
            "FLOAT4" | "REAL" => Self::Float4,
            "FLOAT8" | "DOUBLE PRECISION" => Self::Float8,
            "UUID" => Self::Uuid,
            "TIMESTAMP" => Self::Timestamp,
            "TIMESTAMPTZ" => Self::TimestampTz,
            "DATE" => Self::Date,
            "JSON" | "JSONB" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Decode a result row column by column into a JSON object
fn decode_row(row: &PgRow) -> StorageResult<Row> {
    let mut decoded = Row::new();
    for column in row.columns() {
        let kind = ColumnKind::from_type_name(column.type_info().name());
        let value = decode_column(row, column.ordinal(), kind).map_err(|e| {
            StorageError::QueryFailed(format!("column '{}': {}", column.name(), e))
        })?;
        decoded.insert(column.name().to_string(), value);
    }
    Ok(decoded)
}

fn decode_column(row: &PgRow, index: usize, kind: ColumnKind) -> Result<Value, sqlx::Error> {
    let value = match kind {
        ColumnKind::Bool => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        ColumnKind::Int2 => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        ColumnKind::Int4 => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        ColumnKind::Int8 => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        ColumnKind::Float4 => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::from(f64::from(v))),
        ColumnKind::Float8 => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        ColumnKind::Uuid => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Timestamp => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::String(v.and_utc().to_rfc3339())),
        ColumnKind::TimestampTz => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(|v| Value::String(v.to_rfc3339())),
        ColumnKind::Date => row
            .try_get::<Option<NaiveDate>, _>(index)?
            .map(|v| Value::String(v.to_string())),
        ColumnKind::Json => row.try_get::<Option<Value>, _>(index)?,
        ColumnKind::Text => row.try_get::<Option<String>, _>(index)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn query_error(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::PoolClosed => StorageError::Closed,
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
            StorageError::ConnectionFailed(e.to_string())
        }
        other => StorageError::QueryFailed(other.to_string()),
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    fn name(&self) -> &str {
        self.dialect.as_str()
    }

    async fn exec(&self, query: &str, args: &[SqlValue]) -> StorageResult<ExecResult> {
        let result = sqlx::query_with(query, encode_arguments(args)?)
            .execute(&self.pool)
            .await
            .map_err(query_error)?;

        Ok(ExecResult {
            rows_affected: result.rows_affected(),
        })
    }

    async fn query(&self, query: &str, args: &[SqlValue]) -> StorageResult<Vec<Row>> {
        let rows = sqlx::query_with(query, encode_arguments(args)?)
            .fetch_all(&self.pool)
            .await
            .map_err(query_error)?;

        rows.iter().map(decode_row).collect()
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(PostgresBatch {
            pool: self.pool.clone(),
            statements: Vec::new(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        self.pool.close().await;
        info!("Storage connection pool closed");
        Ok(())
    }
}

/// Statements applied in one transaction
struct PostgresBatch {
    pool: PgPool,
    statements: Vec<(String, Vec<SqlValue>)>,
}

#[async_trait]
impl Batch for PostgresBatch {
    fn add(&mut self, query: &str, args: Vec<SqlValue>) {
        self.statements.push((query.to_string(), args));
    }

    fn size(&self) -> usize {
        self.statements.len()
    }

    async fn execute(&mut self) -> StorageResult<()> {
        let statements = std::mem::take(&mut self.statements);
        if statements.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorageError::TransactionFailed(e.to_string()))?;

        for (query, args) in &statements {
            sqlx::query_with(query, encode_arguments(args)?)
                .execute(&mut *tx)
                .await
                .map_err(|e| StorageError::TransactionFailed(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionFailed(e.to_string()))?;

        debug!("Committed batch of {} statements", statements.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_arguments_accepts_every_variant() {
        let args = vec![
            SqlValue::Null,
            SqlValue::Bool(true),
            SqlValue::Int(3),
            SqlValue::Float(1.5),
            SqlValue::Text("x".to_string()),
            SqlValue::Uuid(uuid::Uuid::new_v4()),
            SqlValue::Timestamp(Some(Utc::now())),
            SqlValue::Timestamp(None),
            SqlValue::Json(json!({"a": 1})),
        ];
        let encoded = encode_arguments(&args).unwrap();
        assert_eq!(encoded.len(), args.len());
    }

    #[test]
    fn test_column_kind_from_type_name() {
        assert_eq!(ColumnKind::from_type_name("INT4"), ColumnKind::Int4);
        assert_eq!(ColumnKind::from_type_name("int8"), ColumnKind::Int8);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMPTZ"), ColumnKind::TimestampTz);
        assert_eq!(ColumnKind::from_type_name("TIMESTAMP"), ColumnKind::Timestamp);
        assert_eq!(ColumnKind::from_type_name("UUID"), ColumnKind::Uuid);
        assert_eq!(ColumnKind::from_type_name("JSONB"), ColumnKind::Json);
        assert_eq!(ColumnKind::from_type_name("DOUBLE PRECISION"), ColumnKind::Float8);
        // QuestDB reports SYMBOL and VARCHAR columns as text
        assert_eq!(ColumnKind::from_type_name("VARCHAR"), ColumnKind::Text);
        assert_eq!(ColumnKind::from_type_name("SYMBOL"), ColumnKind::Text);
    }

    #[test]
    fn test_pool_closed_maps_to_closed() {
        assert!(matches!(query_error(sqlx::Error::PoolClosed), StorageError::Closed));
        assert!(matches!(
            query_error(sqlx::Error::RowNotFound),
            StorageError::QueryFailed(_)
        ));
    }
}
