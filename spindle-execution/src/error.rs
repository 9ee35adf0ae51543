//! Error types for task execution

use spindle_core::{CollectorError, StateError};
use spindle_interfaces::BrokerError;
use thiserror::Error;

/// Task execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Task '{0}' is not bound to an executor")]
    NotStarted(String),

    #[error("Task '{0}' is already bound to an executor")]
    AlreadyBound(String),

    #[error("Task '{0}' has no collector")]
    NoCollector(String),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Collector error: {0}")]
    Collector(#[from] CollectorError),
}

pub type ExecutionResult<T> = Result<T, ExecutionError>;
