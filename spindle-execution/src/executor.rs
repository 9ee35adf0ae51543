//! Publish, consume and retry pipeline shared by every task of an engine

use futures::FutureExt;
use spindle_core::{State, Status};
use spindle_interfaces::{Broker, DeliveryHandler, Hook, HookError, TaskLogger};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::context::Context;
use crate::error::ExecutionResult;
use crate::task::Task;

/// Runs deliveries through the hook chain, the action and the retry policy
pub struct Executor<C> {
    broker: Arc<dyn Broker>,
    task_logger: Option<Arc<dyn TaskLogger>>,
    hooks: Vec<Arc<dyn Hook>>,
    user_context: C,
}

impl<C> Executor<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(broker: Arc<dyn Broker>, user_context: C) -> Self {
        Self {
            broker,
            task_logger: None,
            hooks: Vec::new(),
            user_context,
        }
    }

    pub fn with_task_logger(mut self, task_logger: Arc<dyn TaskLogger>) -> Self {
        self.task_logger = Some(task_logger);
        self
    }

    /// Hooks run in the given order
    pub fn with_hooks(mut self, hooks: Vec<Arc<dyn Hook>>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn user_context(&self) -> &C {
        &self.user_context
    }

    /// Assign a fresh attempt id and publish `state` under the task's routing key
    pub async fn publish(&self, task: &Task<C>, mut state: State) -> ExecutionResult<()> {
        state.id = Uuid::new_v4();
        let body = state.serialize()?;

        self.log_state(task, &state).await;
        self.run_before_hooks(task, &state).await;

        self.broker.publish(body, task.name()).await?;
        debug!(
            task_name = task.name(),
            task_id = %state.task_id,
            state_id = %state.id,
            "Published task"
        );
        Ok(())
    }

    /// Start the task's collector action and consume its deliveries.
    ///
    /// Returns when the broker stops delivering.
    pub async fn consume(self: &Arc<Self>, task: Arc<Task<C>>) -> ExecutionResult<()> {
        if task.start_collector(&self.user_context) {
            debug!(task_name = task.name(), "Started collector action");
        }

        let executor = Arc::clone(self);
        let handler_task = Arc::clone(&task);
        let handler: DeliveryHandler = Arc::new(move |body| {
            let executor = Arc::clone(&executor);
            let task = Arc::clone(&handler_task);
            Box::pin(async move { executor.handle_delivery(task, body).await })
        });

        info!(
            task_name = task.name(),
            concurrency = task.config().concurrency,
            "Consuming task deliveries"
        );
        self.broker
            .consume(task.name(), task.config().concurrency, handler)
            .await?;
        Ok(())
    }

    async fn handle_delivery(&self, task: Arc<Task<C>>, body: Vec<u8>) -> anyhow::Result<()> {
        let mut state = State::deserialize(&body)?;
        state.begin_attempt();

        self.log_state(&task, &state).await;
        self.run_before_hooks(&task, &state).await;

        let span = info_span!(
            "task",
            scope = %task.name(),
            task_id = %state.task_id,
            state_id = %state.id
        );
        let ctx = Context::new(
            Arc::clone(&task),
            state.clone(),
            self.user_context.clone(),
            span.clone(),
        );

        // Covers panics raised while the closure builds its future
        let action = Arc::clone(&task.action);
        let outcome = AssertUnwindSafe(async move { action(ctx).await })
            .catch_unwind()
            .instrument(span)
            .await;
        let result = match outcome {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!("task panicked: {}", panic_message(payload))),
        };

        match result {
            Ok(()) => {
                state.status = Status::Success;
                self.log_state(&task, &state).await;
                self.run_after_hooks(&task, &state).await;
                debug!(
                    task_name = task.name(),
                    task_id = %state.task_id,
                    iterations = state.iterations,
                    "Task succeeded"
                );
                Ok(())
            }
            Err(e) => {
                state.status = Status::Failed;
                state.last_error = format!("{:#}", e);
                self.log_state(&task, &state).await;
                self.run_after_hooks(&task, &state).await;

                if task.config().should_retry(state.iterations) {
                    warn!(
                        task_name = task.name(),
                        task_id = %state.task_id,
                        iterations = state.iterations,
                        "Task failed, retrying: {}",
                        state.last_error
                    );
                    self.publish(&task, state).await?;
                } else {
                    error!(
                        task_name = task.name(),
                        task_id = %state.task_id,
                        iterations = state.iterations,
                        "Task failed: {}",
                        state.last_error
                    );
                }
                Ok(())
            }
        }
    }

    async fn log_state(&self, task: &Task<C>, state: &State) {
        let Some(task_logger) = &self.task_logger else {
            return;
        };
        if let Err(e) = task_logger.log_task(task, state).await {
            warn!(
                task_name = task.name(),
                task_id = %state.task_id,
                "Failed to log task state: {}",
                e
            );
        }
    }

    async fn run_before_hooks(&self, task: &Task<C>, state: &State) {
        for hook in &self.hooks {
            let outcome = AssertUnwindSafe(async { hook.before_execute(task, state).await })
                .catch_unwind()
                .await;
            if let Some(message) = hook_failure(outcome) {
                warn!(
                    task_name = task.name(),
                    hook = hook.name(),
                    "BeforeExecute hook failed: {}",
                    message
                );
            }
        }
    }

    async fn run_after_hooks(&self, task: &Task<C>, state: &State) {
        for hook in &self.hooks {
            let outcome = AssertUnwindSafe(async { hook.after_execute(task, state).await })
                .catch_unwind()
                .await;
            if let Some(message) = hook_failure(outcome) {
                warn!(
                    task_name = task.name(),
                    hook = hook.name(),
                    "AfterExecute hook failed: {}",
                    message
                );
            }
        }
    }
}

type HookOutcome = Result<Result<(), HookError>, Box<dyn Any + Send>>;

fn hook_failure(outcome: HookOutcome) -> Option<String> {
    match outcome {
        Ok(Ok(())) => None,
        Ok(Err(e)) => Some(e.to_string()),
        Err(payload) => Some(format!("hook panicked: {}", panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(payload) => match payload.downcast::<&'static str>() {
            Ok(message) => message.to_string(),
            Err(_) => "unknown panic payload".to_string(),
        },
    }
}
