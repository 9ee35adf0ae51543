//! Per-attempt execution context handed to task actions

use serde_json::Value;
use spindle_core::{Parameters, State};
use std::sync::Arc;
use tracing::Span;

use crate::error::{ExecutionError, ExecutionResult};
use crate::task::Task;

/// What an action sees of the current attempt.
///
/// Executions started through the context become children of the current
/// lineage (`parent_id` is set to this state's `task_id`).
pub struct Context<C> {
    task: Arc<Task<C>>,
    state: State,
    user_context: C,
    span: Span,
}

impl<C> Context<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(task: Arc<Task<C>>, state: State, user_context: C, span: Span) -> Self {
        Self {
            task,
            state,
            user_context,
            span,
        }
    }

    /// State of the running attempt
    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn task_name(&self) -> &str {
        self.task.name()
    }

    /// The engine-wide user context, unmodified
    pub fn user_context(&self) -> &C {
        &self.user_context
    }

    /// Span the action runs in; it carries `task_id` and `state_id`
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Dispatch the same task as a child of this execution
    pub async fn execute(&self, parameters: Parameters) -> ExecutionResult<()> {
        self.task
            .execute_with_parent(parameters, Some(&self.state))
            .await
    }

    /// Dispatch another task as a child of this execution
    pub async fn execute_task(&self, task: &Task<C>, parameters: Parameters) -> ExecutionResult<()> {
        task.execute_with_parent(parameters, Some(&self.state)).await
    }

    /// Send a value to the task's collector, waiting for capacity
    pub async fn push(&self, value: Value) -> ExecutionResult<()> {
        let collector = self
            .task
            .collector()
            .ok_or_else(|| ExecutionError::NoCollector(self.task.name().to_string()))?;
        collector.push(value).await?;
        Ok(())
    }
}
