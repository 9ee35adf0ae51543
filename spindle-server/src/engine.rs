//! Engine lifecycle: registration, start and close

use parking_lot::{Mutex, RwLock};
use spindle_config::{SchedulerConfig, SpindleConfig, TaskLoggerConfig};
use spindle_execution::{Executor, MetricsHook, Task};
use spindle_interfaces::{Broker, DispatchTask, Hook, Storage};
use spindle_rest_api::{create_rest_app, ApiContext, AppConfig};
use spindle_storage::BatchedTaskLogger;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::scheduler::CronScheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Built,
    Started,
    Closed,
}

/// Owns the task registry and wires tasks to the broker, the cron
/// scheduler and the optional HTTP API
pub struct Engine<C> {
    broker: Arc<dyn Broker>,
    storage: Arc<dyn Storage>,
    executor: Arc<Executor<C>>,
    tasks: RwLock<BTreeMap<String, Arc<Task<C>>>>,
    lifecycle: Mutex<Lifecycle>,
    scheduler: Mutex<Option<Arc<CronScheduler>>>,
    scheduler_config: SchedulerConfig,
    api_address: Option<String>,
    metrics: Option<Arc<MetricsHook>>,
    closed: watch::Sender<bool>,
}

impl<C> Engine<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn builder(user_context: C) -> EngineBuilder<C> {
        EngineBuilder::new(user_context)
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.lock()
    }

    /// Metrics collected when the engine was built with them enabled
    pub fn metrics(&self) -> Option<&Arc<MetricsHook>> {
        self.metrics.as_ref()
    }

    /// Add a task. A task registered under an existing name replaces it.
    pub fn register(&self, task: Task<C>) -> EngineResult<Arc<Task<C>>> {
        match self.lifecycle() {
            Lifecycle::Built => {}
            Lifecycle::Started => return Err(EngineError::AlreadyStarted),
            Lifecycle::Closed => return Err(EngineError::Closed),
        }

        let task = Arc::new(task);
        let previous = self
            .tasks
            .write()
            .insert(task.name().to_string(), Arc::clone(&task));
        if previous.is_some() {
            warn!(task_name = task.name(), "Task already registered, replacing it");
        } else {
            info!(task_name = task.name(), "Registered task");
        }
        Ok(task)
    }

    pub fn task(&self, name: &str) -> Option<Arc<Task<C>>> {
        self.tasks.read().get(name).cloned()
    }

    pub fn tasks(&self) -> Vec<Arc<Task<C>>> {
        self.tasks.read().values().cloned().collect()
    }

    /// Bind every task, arm cron triggers, serve the API and consume
    /// deliveries. Returns once every consumer loop has exited.
    pub async fn start(&self) -> EngineResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            match *lifecycle {
                Lifecycle::Built => *lifecycle = Lifecycle::Started,
                Lifecycle::Started => return Err(EngineError::AlreadyStarted),
                Lifecycle::Closed => return Err(EngineError::Closed),
            }
        }

        let tasks = self.tasks();
        info!("Starting engine with {} tasks", tasks.len());
        for task in &tasks {
            task.bind(Arc::clone(&self.executor))?;
        }

        let scheduler = Arc::new(CronScheduler::new().await?);
        *self.scheduler.lock() = Some(Arc::clone(&scheduler));
        self.arm_schedules(&scheduler, &tasks).await?;

        let listener = match &self.api_address {
            Some(address) => Some(TcpListener::bind(address).await.map_err(|source| {
                EngineError::ApiBind {
                    address: address.clone(),
                    source,
                }
            })?),
            None => None,
        };

        let mut consumers = JoinSet::new();
        for task in tasks.iter().cloned() {
            let executor = Arc::clone(&self.executor);
            consumers.spawn(async move {
                let name = task.name().to_string();
                (name, executor.consume(task).await)
            });
        }

        if let Some(listener) = listener {
            self.serve_api(listener, &tasks);
        }

        scheduler.start().await?;
        info!("Engine started");

        while let Some(joined) = consumers.join_next().await {
            match joined {
                Ok((name, Ok(()))) => info!(task_name = %name, "Consumer stopped"),
                Ok((name, Err(e))) => error!(task_name = %name, "Consumer failed: {}", e),
                Err(e) => error!("Consumer task aborted: {}", e),
            }
        }

        info!("Engine stopped");
        Ok(())
    }

    async fn arm_schedules(
        &self,
        scheduler: &CronScheduler,
        tasks: &[Arc<Task<C>>],
    ) -> EngineResult<()> {
        let permits = Arc::new(Semaphore::new(
            self.scheduler_config.max_concurrent_dispatches.max(1),
        ));

        for task in tasks {
            for schedule in &task.config().schedules {
                let scheduled_task = Arc::clone(task);
                let parameters = schedule.parameters.clone();
                let permits = Arc::clone(&permits);

                scheduler
                    .add(&schedule.schedule, move || {
                        let task = &scheduled_task;
                        let Ok(permit) = Arc::clone(&permits).try_acquire_owned() else {
                            warn!(
                                task_name = task.name(),
                                "Too many scheduled dispatches in flight, skipping this firing"
                            );
                            return;
                        };
                        let task = Arc::clone(&task);
                        let parameters = parameters.clone();
                        tokio::spawn(async move {
                            let _permit = permit;
                            if let Err(e) = task.execute_one(parameters).await {
                                error!(task_name = task.name(), "Scheduled dispatch failed: {}", e);
                            }
                        });
                    })
                    .await?;

                info!(
                    task_name = task.name(),
                    schedule = %schedule.schedule,
                    "Armed cron trigger"
                );
            }
        }
        Ok(())
    }

    fn serve_api(&self, listener: TcpListener, tasks: &[Arc<Task<C>>]) {
        let registry: BTreeMap<String, Arc<dyn DispatchTask>> = tasks
            .iter()
            .map(|task| {
                let dispatch: Arc<dyn DispatchTask> = Arc::clone(task) as Arc<dyn DispatchTask>;
                (task.name().to_string(), dispatch)
            })
            .collect();

        let mut context = ApiContext::new(registry).with_storage(Arc::clone(&self.storage));
        if let Some(metrics) = &self.metrics {
            context = context.with_metrics(Arc::clone(metrics));
        }
        let app = create_rest_app(context, AppConfig::default());

        let mut closed = self.closed.subscribe();
        tokio::spawn(async move {
            if let Ok(address) = listener.local_addr() {
                info!("API listening on {}", address);
            }
            let shutdown = async move {
                let _ = closed.wait_for(|closed| *closed).await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                error!("API server failed: {}", e);
            }
        });
    }

    /// Close the broker and the storage and stop the cron scheduler.
    ///
    /// In-flight executions are not awaited and pending history is not
    /// flushed. Every step is attempted; the first error is returned.
    pub async fn close(&self) -> EngineResult<()> {
        {
            let mut lifecycle = self.lifecycle.lock();
            if *lifecycle == Lifecycle::Closed {
                return Ok(());
            }
            *lifecycle = Lifecycle::Closed;
        }
        info!("Closing engine");

        let broker = self.broker.close().await.map_err(EngineError::from);
        let storage = self.storage.close().await.map_err(EngineError::from);

        let scheduler = self.scheduler.lock().take();
        let scheduler = match scheduler {
            Some(scheduler) => scheduler.shutdown().await.map_err(EngineError::from),
            None => Ok(()),
        };

        self.closed.send_replace(true);

        broker.and(storage).and(scheduler)
    }
}

/// Assembles an [`Engine`]
pub struct EngineBuilder<C> {
    user_context: C,
    broker: Option<Arc<dyn Broker>>,
    storage: Option<Arc<dyn Storage>>,
    hooks: Vec<Arc<dyn Hook>>,
    metrics: Option<Arc<MetricsHook>>,
    task_logger_config: TaskLoggerConfig,
    scheduler_config: SchedulerConfig,
    api_address: Option<String>,
}

impl<C> EngineBuilder<C>
where
    C: Clone + Send + Sync + 'static,
{
    pub fn new(user_context: C) -> Self {
        Self {
            user_context,
            broker: None,
            storage: None,
            hooks: Vec::new(),
            metrics: None,
            task_logger_config: TaskLoggerConfig::default(),
            scheduler_config: SchedulerConfig::default(),
            api_address: None,
        }
    }

    /// Take the logger, scheduler and API settings from `config`
    pub fn from_config(user_context: C, config: &SpindleConfig) -> Self {
        let mut builder = Self::new(user_context)
            .with_task_logger_config(config.task_logger.clone())
            .with_scheduler_config(config.scheduler.clone());
        if config.api.enabled {
            builder = builder.with_api(config.api.bind_address.clone());
        }
        builder
    }

    pub fn with_broker(mut self, broker: Arc<dyn Broker>) -> Self {
        self.broker = Some(broker);
        self
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Append a hook; hooks run in the order they were added
    pub fn with_hook(mut self, hook: Arc<dyn Hook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_hooks(mut self, hooks: impl IntoIterator<Item = Arc<dyn Hook>>) -> Self {
        self.hooks.extend(hooks);
        self
    }

    /// Append a [`MetricsHook`] and expose it through the API
    pub fn with_metrics(mut self) -> Self {
        let metrics = Arc::new(MetricsHook::new());
        self.hooks.push(metrics.clone());
        self.metrics = Some(metrics);
        self
    }

    pub fn with_task_logger_config(mut self, config: TaskLoggerConfig) -> Self {
        self.task_logger_config = config;
        self
    }

    pub fn with_scheduler_config(mut self, config: SchedulerConfig) -> Self {
        self.scheduler_config = config;
        self
    }

    /// Serve the HTTP API on `address` while the engine runs
    pub fn with_api(mut self, address: impl Into<String>) -> Self {
        self.api_address = Some(address.into());
        self
    }

    /// Initialize hooks and the task logger. Requires a broker and storage.
    pub async fn build(self) -> EngineResult<Engine<C>> {
        let broker = self.broker.ok_or(EngineError::BrokerRequired)?;
        let storage = self.storage.ok_or(EngineError::StorageRequired)?;

        for hook in &self.hooks {
            hook.initialize(Arc::clone(&storage))
                .await
                .map_err(|source| EngineError::HookInitialization {
                    hook: hook.name().to_string(),
                    source,
                })?;
        }

        let task_logger =
            BatchedTaskLogger::new(Arc::clone(&storage), &self.task_logger_config).await?;

        let executor = Executor::new(Arc::clone(&broker), self.user_context)
            .with_task_logger(Arc::new(task_logger))
            .with_hooks(self.hooks);

        let (closed, _) = watch::channel(false);
        Ok(Engine {
            broker,
            storage,
            executor: Arc::new(executor),
            tasks: RwLock::new(BTreeMap::new()),
            lifecycle: Mutex::new(Lifecycle::Built),
            scheduler: Mutex::new(None),
            scheduler_config: self.scheduler_config,
            api_address: self.api_address,
            metrics: self.metrics,
            closed,
        })
    }
}
