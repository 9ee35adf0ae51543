//! Type-erased views of registered tasks

use async_trait::async_trait;
use spindle_core::{Parameters, TaskDescriptor};
use thiserror::Error;

/// Any task, whatever the engine's user context type
pub trait AnyTask: Send + Sync {
    /// Sanitized task name, also its routing key
    fn name(&self) -> &str;

    fn descriptor(&self) -> TaskDescriptor;
}

/// Failure to dispatch a new execution
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Task '{0}' is not bound to a running engine")]
    NotStarted(String),

    #[error("Failed to publish task '{task}': {message}")]
    Publish { task: String, message: String },
}

/// A task that can be dispatched with ad-hoc parameters
#[async_trait]
pub trait DispatchTask: AnyTask {
    /// Publish one new execution with `parameters`
    async fn dispatch(&self, parameters: Parameters) -> Result<(), DispatchError>;
}
