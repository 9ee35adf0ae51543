//! Task definition and dispatch

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use spindle_core::{
    sanitize_name, Collector, Parameters, State, TaskConfig, TaskDescriptor, TaskSchedule,
};
use spindle_interfaces::{AnyTask, DispatchError, DispatchTask};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::context::Context;
use crate::error::{ExecutionError, ExecutionResult};
use crate::executor::Executor;

/// Body of a task
pub type Action<C> = Arc<dyn Fn(Context<C>) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Long-running consumer of a task's collector
pub type CollectorAction<C> = Arc<dyn Fn(Collector, C) -> BoxFuture<'static, ()> + Send + Sync>;

/// A named unit of work with its own retry, concurrency and schedule settings
pub struct Task<C> {
    name: String,
    pub(crate) action: Action<C>,
    config: TaskConfig,
    collector: Option<(Collector, CollectorAction<C>)>,
    collector_started: AtomicBool,
    executor: OnceLock<Arc<Executor<C>>>,
}

impl<C> Task<C>
where
    C: Clone + Send + Sync + 'static,
{
    /// Create a task with concurrency 1 and 3 retries
    pub fn new<F, Fut>(name: &str, action: F) -> Self
    where
        F: Fn(Context<C>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            name: sanitize_name(name),
            action: Arc::new(move |ctx| action(ctx).boxed()),
            config: TaskConfig::default(),
            collector: None,
            collector_started: AtomicBool::new(false),
            executor: OnceLock::new(),
        }
    }

    /// Maximum deliveries processed in parallel, at least 1
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.config.concurrency = concurrency.max(1);
        self
    }

    /// Retries after the first attempt; `-1` retries forever
    pub fn with_max_retries(mut self, max_retries: i32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Attach a collector drained by `action` for the task's lifetime.
    ///
    /// `buffer` of `None` or `Some(0)` makes every push wait for a puller.
    pub fn with_collector<F, Fut>(mut self, action: F, buffer: Option<usize>) -> Self
    where
        F: Fn(Collector, C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let action: CollectorAction<C> =
            Arc::new(move |collector, user_context| action(collector, user_context).boxed());
        self.collector = Some((Collector::new(buffer), action));
        self
    }

    /// Add a cron trigger (seconds precision) dispatching `parameters`
    pub fn with_schedule(mut self, schedule: impl Into<String>, parameters: Parameters) -> Self {
        self.config.schedules.push(TaskSchedule {
            schedule: schedule.into(),
            parameters,
        });
        self
    }

    pub fn with_default_parameters(mut self, parameters: Parameters) -> Self {
        self.config.default_parameters = parameters;
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &TaskConfig {
        &self.config
    }

    pub fn collector(&self) -> Option<&Collector> {
        self.collector.as_ref().map(|(collector, _)| collector)
    }

    /// Attach the executor. A task is bound exactly once.
    pub fn bind(&self, executor: Arc<Executor<C>>) -> ExecutionResult<()> {
        self.executor
            .set(executor)
            .map_err(|_| ExecutionError::AlreadyBound(self.name.clone()))
    }

    pub fn is_bound(&self) -> bool {
        self.executor.get().is_some()
    }

    fn executor(&self) -> ExecutionResult<&Arc<Executor<C>>> {
        self.executor
            .get()
            .ok_or_else(|| ExecutionError::NotStarted(self.name.clone()))
    }

    /// Publish one new execution per parameter map
    pub async fn execute(
        &self,
        parameters: impl IntoIterator<Item = Parameters>,
    ) -> ExecutionResult<()> {
        let states: Vec<State> = parameters.into_iter().map(State::new).collect();
        let executor = self.executor()?;
        for state in states {
            executor.publish(self, state).await?;
        }
        Ok(())
    }

    /// Publish a single new execution
    pub async fn execute_one(&self, parameters: Parameters) -> ExecutionResult<()> {
        self.execute_with_parent(parameters, None).await
    }

    /// Publish a new execution, linked to `parent`'s lineage when given
    pub async fn execute_with_parent(
        &self,
        parameters: Parameters,
        parent: Option<&State>,
    ) -> ExecutionResult<()> {
        let state = match parent {
            Some(parent) => State::child_of(parameters, parent),
            None => State::new(parameters),
        };
        self.executor()?.publish(self, state).await
    }

    /// Start the collector action, once. Returns whether it was started now.
    pub(crate) fn start_collector(&self, user_context: &C) -> bool {
        let Some((collector, action)) = &self.collector else {
            return false;
        };
        if self.collector_started.swap(true, Ordering::SeqCst) {
            return false;
        }
        tokio::spawn(action(collector.clone(), user_context.clone()));
        true
    }
}

impl<C> AnyTask for Task<C>
where
    C: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new(self.name.clone(), &self.config)
    }
}

#[async_trait]
impl<C> DispatchTask for Task<C>
where
    C: Clone + Send + Sync + 'static,
{
    async fn dispatch(&self, parameters: Parameters) -> Result<(), DispatchError> {
        self.execute_one(parameters).await.map_err(|e| match e {
            ExecutionError::NotStarted(name) => DispatchError::NotStarted(name),
            other => DispatchError::Publish {
                task: self.name.clone(),
                message: other.to_string(),
            },
        })
    }
}
