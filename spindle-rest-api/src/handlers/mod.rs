//! Request handlers

pub mod executions;
pub mod metrics;
pub mod tasks;
