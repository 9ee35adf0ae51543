//! Spindle engine runtime
//!
//! [`Engine`] ties the pieces together: it owns the task registry, binds
//! every task to a shared [`spindle_execution::Executor`], arms cron
//! triggers through [`CronScheduler`], runs one consumer loop per task and
//! optionally serves the HTTP API.
//!
//! ```rust,no_run
//! use spindle_broker::InMemoryBroker;
//! use spindle_execution::{Context, Task};
//! use spindle_server::Engine;
//! use spindle_storage::InMemoryStorage;
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let engine = Arc::new(
//!     Engine::builder(())
//!         .with_broker(Arc::new(InMemoryBroker::new()))
//!         .with_storage(Arc::new(InMemoryStorage::new()))
//!         .build()
//!         .await?,
//! );
//!
//! engine.register(Task::new("hello", |ctx: Context<()>| async move {
//!     tracing::info!("Hello, {}!", ctx.state().get_str("name", Some("World")));
//!     Ok(())
//! }))?;
//!
//! engine.start().await?;
//! # Ok(())
//! # }
//! ```

pub mod engine;
pub mod error;
pub mod scheduler;

pub use engine::{Engine, EngineBuilder, Lifecycle};
pub use error::{EngineError, EngineResult, SchedulerError};
pub use scheduler::{validate_expression, CronScheduler};
