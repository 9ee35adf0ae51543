//! Task execution for Spindle
//!
//! A [`Task`] pairs a sanitized name with an async action and its execution
//! policy. Once bound to an [`Executor`], `Task::execute` publishes new
//! states, and the executor's consumer runs each delivery through the hook
//! chain, the action and the retry policy. Actions receive a [`Context`]
//! carrying the attempt's state and the engine's user context.

pub mod context;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod task;

pub use context::Context;
pub use error::{ExecutionError, ExecutionResult};
pub use executor::Executor;
pub use hooks::{MetricsHook, TaskMetrics};
pub use task::{Action, CollectorAction, Task};
