//! Process-local storage that records what it is asked to do

use async_trait::async_trait;
use parking_lot::Mutex;
use spindle_interfaces::{Batch, ExecResult, Row, SqlValue, Storage, StorageError, StorageResult};
use std::sync::Arc;

/// One statement as received by [`InMemoryStorage`]
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedStatement {
    pub query: String,
    pub args: Vec<SqlValue>,
}

#[derive(Default)]
struct MemoryState {
    executed: Vec<RecordedStatement>,
    batches: Vec<Vec<RecordedStatement>>,
    failed_batches: usize,
    stubs: Vec<(String, Vec<Row>)>,
    fail_exec: bool,
    fail_batches: bool,
    closed: bool,
}

/// Storage that keeps every executed statement in memory.
///
/// Queries return rows registered with [`stub_query`](Self::stub_query).
/// Failures can be switched on to exercise error paths.
#[derive(Clone)]
pub struct InMemoryStorage {
    name: String,
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    /// Report `name` from [`Storage::name`], e.g. to select a dialect
    pub fn with_name(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(Mutex::new(MemoryState::default())),
        }
    }

    /// Answer queries containing `fragment` with `rows`
    pub fn stub_query(&self, fragment: impl Into<String>, rows: Vec<Row>) {
        self.state.lock().stubs.push((fragment.into(), rows));
    }

    pub fn set_fail_exec(&self, fail: bool) {
        self.state.lock().fail_exec = fail;
    }

    pub fn set_fail_batches(&self, fail: bool) {
        self.state.lock().fail_batches = fail;
    }

    /// Statements run through `exec`
    pub fn executed(&self) -> Vec<RecordedStatement> {
        self.state.lock().executed.clone()
    }

    /// Successfully committed batches, oldest first
    pub fn batches(&self) -> Vec<Vec<RecordedStatement>> {
        self.state.lock().batches.clone()
    }

    pub fn failed_batches(&self) -> usize {
        self.state.lock().failed_batches
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn exec(&self, query: &str, args: &[SqlValue]) -> StorageResult<ExecResult> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if state.fail_exec {
            return Err(StorageError::QueryFailed("injected failure".to_string()));
        }

        state.executed.push(RecordedStatement {
            query: query.to_string(),
            args: args.to_vec(),
        });
        Ok(ExecResult { rows_affected: 1 })
    }

    async fn query(&self, query: &str, _args: &[SqlValue]) -> StorageResult<Vec<Row>> {
        let state = self.state.lock();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if state.fail_exec {
            return Err(StorageError::QueryFailed("injected failure".to_string()));
        }

        Ok(state
            .stubs
            .iter()
            .find(|(fragment, _)| query.contains(fragment.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    fn new_batch(&self) -> Box<dyn Batch> {
        Box::new(MemoryBatch {
            state: self.state.clone(),
            statements: Vec::new(),
        })
    }

    async fn close(&self) -> StorageResult<()> {
        self.state.lock().closed = true;
        Ok(())
    }
}

struct MemoryBatch {
    state: Arc<Mutex<MemoryState>>,
    statements: Vec<RecordedStatement>,
}

#[async_trait]
impl Batch for MemoryBatch {
    fn add(&mut self, query: &str, args: Vec<SqlValue>) {
        self.statements.push(RecordedStatement {
            query: query.to_string(),
            args,
        });
    }

    fn size(&self) -> usize {
        self.statements.len()
    }

    async fn execute(&mut self) -> StorageResult<()> {
        let statements = std::mem::take(&mut self.statements);
        let mut state = self.state.lock();
        if state.closed {
            state.failed_batches += 1;
            return Err(StorageError::Closed);
        }
        if state.fail_batches {
            state.failed_batches += 1;
            return Err(StorageError::TransactionFailed("injected failure".to_string()));
        }

        state.batches.push(statements);
        Ok(())
    }
}
