//! Execution history sink

use async_trait::async_trait;
use spindle_core::{State, StateError};
use thiserror::Error;

use crate::tasks::AnyTask;

#[derive(Debug, Error)]
pub enum TaskLoggerError {
    #[error("Failed to encode task state: {0}")]
    Encode(#[from] StateError),

    #[error("Task logger is stopped")]
    Stopped,
}

/// Receives a snapshot of every state transition
#[async_trait]
pub trait TaskLogger: Send + Sync {
    /// Record `state` for `task`. May wait when the logger is saturated.
    async fn log_task(&self, task: &dyn AnyTask, state: &State) -> Result<(), TaskLoggerError>;
}
