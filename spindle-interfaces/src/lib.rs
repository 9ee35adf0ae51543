//! # Spindle Interfaces
//!
//! Contracts between the engine core and its pluggable collaborators.
//!
//! The executor only ever talks to a [`Broker`] for delivery, a
//! [`TaskLogger`] for history and an ordered list of [`Hook`]s. Storage
//! backends implement [`Storage`], and the HTTP layer reaches registered
//! tasks through [`DispatchTask`] without knowing the engine's user context
//! type.
//!
//! ## Main Interfaces
//!
//! - [`Broker`] - publish/consume transport keyed by routing key
//! - [`Storage`] and [`Batch`] - SQL-like persistence with atomic batches
//! - [`Hook`] - before/after extension points around every attempt
//! - [`TaskLogger`] - sink for execution state transitions

pub mod broker;
pub mod hooks;
pub mod logger;
pub mod storage;
pub mod tasks;

// Re-export commonly used types
pub use broker::{Broker, BrokerError, DeliveryHandler};
pub use hooks::{Hook, HookError};
pub use logger::{TaskLogger, TaskLoggerError};
pub use storage::{Batch, ExecResult, Row, SqlValue, Storage, StorageError, StorageResult};
pub use tasks::{AnyTask, DispatchError, DispatchTask};
