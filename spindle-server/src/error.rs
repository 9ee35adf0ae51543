//! Engine and scheduler errors

use spindle_execution::ExecutionError;
use spindle_interfaces::{BrokerError, HookError, StorageError};
use thiserror::Error;

/// Cron scheduler errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidCron { expression: String, message: String },

    #[error("Scheduler error: {0}")]
    Internal(String),
}

/// Engine lifecycle errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("A broker is required to build the engine")]
    BrokerRequired,

    #[error("A storage backend is required to build the engine")]
    StorageRequired,

    #[error("Hook '{hook}' failed to initialize: {source}")]
    HookInitialization {
        hook: String,
        #[source]
        source: HookError,
    },

    #[error("Engine has already been started")]
    AlreadyStarted,

    #[error("Engine is closed")]
    Closed,

    #[error("Failed to bind API listener on {address}: {source}")]
    ApiBind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type EngineResult<T> = Result<T, EngineError>;
