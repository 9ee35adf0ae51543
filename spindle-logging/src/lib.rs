//! Logging infrastructure for Spindle
//!
//! Console output goes through `tracing-subscriber`. Events emitted inside a
//! task execution can additionally be persisted through [`StorageLogLayer`],
//! which picks up the `task_id` and `state_id` the executor records on the
//! span wrapping every action.

pub mod init;
pub mod storage_layer;

pub use init::{init_logging_from_config, init_logging_with_storage, init_simple_tracing};
pub use storage_layer::{run_log_writer, LogRecord, StorageLogLayer, SINK_TARGET};
