//! Execution hook contract

use async_trait::async_trait;
use spindle_core::State;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::{Storage, StorageError};
use crate::tasks::AnyTask;

/// Hook errors. These are logged by the executor and never abort an attempt.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook initialization failed: {0}")]
    Initialization(String),

    #[error("Hook failed: {0}")]
    Execution(String),

    #[error("Hook storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Extension point invoked around every execution attempt.
///
/// Hooks run in insertion order. An error from one hook is logged and the
/// remaining hooks still run.
#[async_trait]
pub trait Hook: Send + Sync {
    /// Name used in log lines
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called once while the engine is built
    async fn initialize(&self, _storage: Arc<dyn Storage>) -> Result<(), HookError> {
        Ok(())
    }

    /// Called when a state is published and again when its delivery starts
    async fn before_execute(&self, task: &dyn AnyTask, state: &State) -> Result<(), HookError>;

    /// Called once the attempt has a terminal status
    async fn after_execute(&self, task: &dyn AnyTask, state: &State) -> Result<(), HookError>;
}
