//! Batched, asynchronous persistence of execution history
//!
//! Every state transition the executor reports becomes a [`PendingLogEntry`]
//! on a bounded channel. A single worker owns the current batch and flushes it
//! when it reaches `batch_size` entries or when `flush_interval` elapses,
//! whichever comes first. Flushes run in their own task so the worker keeps
//! accepting entries while storage is busy.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use spindle_config::TaskLoggerConfig;
use spindle_core::{State, StateError, Status};
use spindle_interfaces::{AnyTask, Batch, SqlValue, Storage, StorageResult, TaskLogger, TaskLoggerError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::schema::{dialect_for, tasks_table_ddl, upsert_task_statement};

/// A flattened [`State`] snapshot plus the task name
#[derive(Debug, Clone, PartialEq)]
pub struct PendingLogEntry {
    pub task_id: Uuid,
    pub status: Status,
    pub task_name: String,
    /// Nil when the lineage has no parent
    pub parent_id: Uuid,
    /// JSON-encoded parameters
    pub parameters: String,
    pub iterations: u32,
    pub published_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub last_error: String,
}

impl PendingLogEntry {
    pub fn from_state(task_name: impl Into<String>, state: &State) -> Result<Self, StateError> {
        Ok(Self {
            task_id: state.task_id,
            status: state.status,
            task_name: task_name.into(),
            parent_id: state.parent_id.unwrap_or_else(Uuid::nil),
            parameters: state.encode_parameters()?,
            iterations: state.iterations,
            published_at: state.initialized_at,
            started_at: state.started_at,
            ended_at: state.status.is_terminal().then(Utc::now),
            last_error: state.last_error.clone(),
        })
    }

    /// Arguments for [`upsert_task_statement`], in column order
    pub fn into_args(self) -> Vec<SqlValue> {
        vec![
            SqlValue::Uuid(self.task_id),
            SqlValue::Text(self.status.as_str().to_string()),
            SqlValue::Text(self.task_name),
            SqlValue::Uuid(self.parent_id),
            SqlValue::Text(self.parameters),
            SqlValue::Int(i64::from(self.iterations)),
            SqlValue::Timestamp(Some(self.published_at)),
            SqlValue::Timestamp(self.started_at),
            SqlValue::Timestamp(self.ended_at),
            SqlValue::Text(self.last_error),
        ]
    }
}

/// [`TaskLogger`] writing execution history to a [`Storage`] in batches
#[derive(Clone)]
pub struct BatchedTaskLogger {
    pending: mpsc::Sender<PendingLogEntry>,
}

impl BatchedTaskLogger {
    /// Create the history table for the storage's dialect, then start the worker
    pub async fn new(storage: Arc<dyn Storage>, config: &TaskLoggerConfig) -> StorageResult<Self> {
        let dialect = dialect_for(storage.name());
        for statement in tasks_table_ddl(dialect, config.retention_days) {
            storage.exec(&statement, &[]).await?;
        }
        if dialect.is_some() {
            info!("Task history table ready on {}", storage.name());
        }

        Ok(Self::spawn(storage, config))
    }

    /// Start the worker without touching the schema
    pub fn spawn(storage: Arc<dyn Storage>, config: &TaskLoggerConfig) -> Self {
        let (pending, pending_rx) = mpsc::channel(config.channel_capacity.max(1));

        tokio::spawn(run_worker(
            storage,
            pending_rx,
            config.batch_size.max(1),
            config.flush_interval,
        ));

        Self { pending }
    }
}

#[async_trait]
impl TaskLogger for BatchedTaskLogger {
    async fn log_task(&self, task: &dyn AnyTask, state: &State) -> Result<(), TaskLoggerError> {
        let entry = PendingLogEntry::from_state(task.name(), state)?;
        self.pending
            .send(entry)
            .await
            .map_err(|_| TaskLoggerError::Stopped)
    }
}

async fn run_worker(
    storage: Arc<dyn Storage>,
    mut pending: mpsc::Receiver<PendingLogEntry>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let statement = upsert_task_statement(dialect_for(storage.name()));
    let mut batch = storage.new_batch();

    let mut trigger = FlushTrigger::new();

    let mut ticker = interval_at(Instant::now() + flush_interval, flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            entry = pending.recv() => match entry {
                Some(entry) => {
                    batch.add(statement, entry.into_args());
                    if batch.size() >= batch_size {
                        trigger.request();
                    }
                }
                None => {
                    flush(&storage, &mut batch);
                    debug!("Task logger channel closed, worker exiting");
                    break;
                }
            },
            _ = ticker.tick() => {
                trigger.request();
            }
            _ = trigger.requested() => {
                flush(&storage, &mut batch);
            }
        }
    }
}

/// Single-slot flush request shared by the size and interval triggers.
/// A request made while another is pending coalesces into it.
struct FlushTrigger {
    slot: mpsc::Sender<()>,
    pending: mpsc::Receiver<()>,
}

impl FlushTrigger {
    fn new() -> Self {
        let (slot, pending) = mpsc::channel(1);
        Self { slot, pending }
    }

    /// Returns false when a flush was already pending
    fn request(&self) -> bool {
        self.slot.try_send(()).is_ok()
    }

    /// Resolves once per pending request
    async fn requested(&mut self) {
        // The sender lives in `self`, so the channel never closes
        let _ = self.pending.recv().await;
    }
}

/// Swap in a fresh batch and execute the filled one in the background
fn flush(storage: &Arc<dyn Storage>, batch: &mut Box<dyn Batch>) {
    if batch.size() == 0 {
        return;
    }

    let mut full = std::mem::replace(batch, storage.new_batch());
    tokio::spawn(async move {
        let size = full.size();
        match full.execute().await {
            Ok(()) => debug!("Flushed {} task log entries", size),
            Err(e) => error!("Failed to flush {} task log entries: {}", size, e),
        }
    });
}
