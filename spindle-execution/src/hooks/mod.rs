//! Built-in execution hooks

pub mod metrics;

pub use metrics::{MetricsHook, TaskMetrics};
