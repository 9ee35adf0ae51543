//! Storage layer for Spindle
//!
//! - [`PostgresStorage`] talks to TimescaleDB or QuestDB over the Postgres
//!   wire protocol through a sqlx pool.
//! - [`InMemoryStorage`] records every statement and batch; it backs the
//!   demo server and the test suites.
//! - [`BatchedTaskLogger`] is the asynchronous, batching sink for execution
//!   history used by the executor.

pub mod memory;
pub mod postgres;
pub mod schema;
pub mod task_logger;

use spindle_config::{StorageBackend, StorageConfig};
use std::sync::Arc;

pub use memory::{InMemoryStorage, RecordedStatement};
pub use postgres::PostgresStorage;
pub use spindle_interfaces::{Batch, ExecResult, Row, SqlValue, Storage, StorageError, StorageResult};
pub use task_logger::{BatchedTaskLogger, PendingLogEntry};

/// Open the backend selected by `config`
pub async fn connect(config: &StorageConfig) -> StorageResult<Arc<dyn Storage>> {
    match config.backend {
        StorageBackend::Memory => Ok(Arc::new(InMemoryStorage::new())),
        StorageBackend::Postgres => Ok(Arc::new(PostgresStorage::connect(config).await?)),
    }
}
