//! End-to-end engine tests over the in-memory broker and storage

use async_trait::async_trait;
use serde_json::json;
use spindle_broker::InMemoryBroker;
use spindle_config::{SchedulerConfig, TaskLoggerConfig};
use spindle_core::{Parameters, State, Status};
use spindle_execution::{Context, Task};
use spindle_interfaces::{AnyTask, Hook, HookError, SqlValue, Storage};
use spindle_server::{Engine, EngineError, Lifecycle, SchedulerError};
use spindle_storage::InMemoryStorage;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Fixture {
    broker: Arc<InMemoryBroker>,
    storage: InMemoryStorage,
    engine: Arc<Engine<()>>,
}

async fn fixture() -> Fixture {
    let broker = Arc::new(InMemoryBroker::new());
    let storage = InMemoryStorage::new();
    let engine = Engine::builder(())
        .with_broker(broker.clone())
        .with_storage(Arc::new(storage.clone()))
        .with_metrics()
        .with_task_logger_config(TaskLoggerConfig {
            flush_interval: Duration::from_millis(50),
            ..Default::default()
        })
        .build()
        .await
        .unwrap();

    Fixture {
        broker,
        storage,
        engine: Arc::new(engine),
    }
}

fn spawn_start(engine: &Arc<Engine<()>>) -> JoinHandle<Result<(), EngineError>> {
    let engine = engine.clone();
    tokio::spawn(async move { engine.start().await })
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

fn counting_task(name: &str, counter: Arc<AtomicU32>, fail: bool) -> Task<()> {
    Task::new(name, move |_ctx: Context<()>| {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            if fail {
                anyhow::bail!("always fails");
            }
            Ok(())
        }
    })
}

#[tokio::test(flavor = "multi_thread")]
async fn test_hello_runs_exactly_once() {
    let f = fixture().await;
    let iterations = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen = iterations.clone();

    let hello = f
        .engine
        .register(
            Task::new("hello", move |ctx: Context<()>| {
                let seen = seen.clone();
                async move {
                    assert_eq!(ctx.state().get_str("name", None), "World");
                    seen.lock().push(ctx.state().iterations);
                    Ok(())
                }
            })
            .with_max_retries(0)
            .with_concurrency(1),
        )
        .unwrap();

    let running = spawn_start(&f.engine);
    wait_until(|| hello.is_bound()).await;

    hello
        .execute_one(json!({"name": "World"}).as_object().cloned().unwrap())
        .await
        .unwrap();

    wait_until(|| !iterations.lock().is_empty()).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(iterations.lock().clone(), vec![1]);
    assert_eq!(f.broker.published_count("hello"), 1);
    assert_eq!(f.broker.delivered_count("hello"), 1);

    f.engine.close().await.unwrap();
    running.await.unwrap().unwrap();
    assert_eq!(f.engine.lifecycle(), Lifecycle::Closed);
    assert!(f.storage.is_closed());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_task_is_retried_then_recorded() {
    let f = fixture().await;
    let attempts = Arc::new(AtomicU32::new(0));
    let flaky = f
        .engine
        .register(counting_task("flaky", attempts.clone(), true).with_max_retries(2))
        .unwrap();

    let running = spawn_start(&f.engine);
    wait_until(|| flaky.is_bound()).await;
    flaky.execute_one(Parameters::new()).await.unwrap();

    let metrics = f.engine.metrics().unwrap().clone();
    wait_until(|| {
        metrics
            .snapshot()
            .iter()
            .any(|m| m.status == Status::Failed && m.count == 3)
    })
    .await;
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // History rows reach storage through the batched logger
    let storage = f.storage.clone();
    wait_until(move || {
        storage.batches().iter().flatten().any(|statement| {
            statement.args.get(1) == Some(&SqlValue::Text("failed".to_string()))
                && statement.args.get(5) == Some(&SqlValue::Int(3))
        })
    })
    .await;

    f.engine.close().await.unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_register_only_before_start() {
    let f = fixture().await;
    let first = f
        .engine
        .register(counting_task("job", Arc::new(AtomicU32::new(0)), false))
        .unwrap();
    f.engine
        .register(counting_task("job", Arc::new(AtomicU32::new(0)), false).with_max_retries(7))
        .unwrap();

    assert_eq!(f.engine.tasks().len(), 1);
    assert_eq!(f.engine.task("job").unwrap().config().max_retries, 7);
    assert!(!first.is_bound());

    let running = spawn_start(&f.engine);
    wait_until(|| f.engine.task("job").unwrap().is_bound()).await;

    let err = f
        .engine
        .register(counting_task("late", Arc::new(AtomicU32::new(0)), false))
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::AlreadyStarted));
    assert!(matches!(f.engine.start().await, Err(EngineError::AlreadyStarted)));

    tokio_test::assert_ok!(f.engine.close().await);
    tokio_test::assert_ok!(f.engine.close().await);
    tokio_test::assert_ok!(running.await.unwrap());

    assert!(matches!(
        f.engine
            .register(counting_task("closed", Arc::new(AtomicU32::new(0)), false)),
        Err(EngineError::Closed)
    ));
}

#[tokio::test]
async fn test_build_requires_broker_and_storage() {
    let err = Engine::builder(())
        .with_storage(Arc::new(InMemoryStorage::new()))
        .build()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::BrokerRequired));

    let err = Engine::builder(())
        .with_broker(Arc::new(InMemoryBroker::new()))
        .build()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::StorageRequired));
}

struct BrokenHook;

#[async_trait]
impl Hook for BrokenHook {
    fn name(&self) -> &str {
        "broken"
    }

    async fn initialize(&self, _storage: Arc<dyn Storage>) -> Result<(), HookError> {
        Err(HookError::Initialization("no metrics backend".to_string()))
    }

    async fn before_execute(&self, _task: &dyn AnyTask, _state: &State) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_execute(&self, _task: &dyn AnyTask, _state: &State) -> Result<(), HookError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_hook_initialization_failure_is_fatal() {
    let err = Engine::builder(())
        .with_broker(Arc::new(InMemoryBroker::new()))
        .with_storage(Arc::new(InMemoryStorage::new()))
        .with_hook(Arc::new(BrokenHook))
        .build()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, EngineError::HookInitialization { ref hook, .. } if hook == "broken"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_bad_cron_aborts_start() {
    let f = fixture().await;
    f.engine
        .register(
            counting_task("nightly", Arc::new(AtomicU32::new(0)), false)
                .with_schedule("at midnight", Parameters::new()),
        )
        .unwrap();

    let err = tokio_test::assert_err!(f.engine.start().await);
    assert!(matches!(
        err,
        EngineError::Scheduler(SchedulerError::InvalidCron { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_schedule_dispatches_with_its_parameters() {
    let broker = Arc::new(InMemoryBroker::new());
    let engine = Arc::new(
        Engine::builder(())
            .with_broker(broker.clone())
            .with_storage(Arc::new(InMemoryStorage::new()))
            .with_scheduler_config(SchedulerConfig {
                max_concurrent_dispatches: 4,
            })
            .build()
            .await
            .unwrap(),
    );

    let received = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let sink = received.clone();
    engine
        .register(
            Task::new("tick", move |ctx: Context<()>| {
                let sink = sink.clone();
                async move {
                    sink.lock().push(ctx.state().get_int("n", None));
                    Ok(())
                }
            })
            .with_schedule("*/1 * * * * *", json!({"n": 42}).as_object().cloned().unwrap()),
        )
        .unwrap();

    let running = spawn_start(&engine);
    wait_until(|| !received.lock().is_empty()).await;
    assert_eq!(received.lock()[0], 42);

    engine.close().await.unwrap();
    running.await.unwrap().unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_child_execution_links_parent() {
    let f = fixture().await;
    let lineage = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let child_seen = lineage.clone();
    let child = f
        .engine
        .register(Task::new("child", move |ctx: Context<()>| {
            let seen = child_seen.clone();
            async move {
                seen.lock().push(("child", ctx.state().task_id, ctx.state().parent_id));
                Ok(())
            }
        }))
        .unwrap();

    let parent_seen = lineage.clone();
    let parent = f
        .engine
        .register(Task::new("parent", move |ctx: Context<()>| {
            let seen = parent_seen.clone();
            let child = child.clone();
            async move {
                seen.lock().push(("parent", ctx.state().task_id, ctx.state().parent_id));
                ctx.execute_task(&child, Parameters::new()).await?;
                Ok(())
            }
        }))
        .unwrap();

    let running = spawn_start(&f.engine);
    wait_until(|| parent.is_bound()).await;
    parent.execute_one(Parameters::new()).await.unwrap();

    wait_until(|| lineage.lock().len() == 2).await;
    let lineage = lineage.lock().clone();
    let (_, parent_task_id, parent_parent) = lineage.iter().find(|e| e.0 == "parent").unwrap();
    let (_, _, child_parent) = lineage.iter().find(|e| e.0 == "child").unwrap();
    assert_eq!(*parent_parent, None);
    assert_eq!(*child_parent, Some(*parent_task_id));

    f.engine.close().await.unwrap();
    running.await.unwrap().unwrap();
}
