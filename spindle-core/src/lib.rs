//! Core domain models for Spindle
//!
//! This crate holds the data that travels between the engine's components:
//! the per-attempt [`State`] that goes onto the wire, the static task
//! configuration, name sanitization and the in-process [`Collector`].
//! It has no knowledge of brokers, storage or the runtime wiring.

pub mod collector;
pub mod error;
pub mod naming;
pub mod state;
pub mod task;

// Re-export commonly used types at the crate root
pub use collector::Collector;
pub use error::{CollectorError, StateError};
pub use naming::sanitize_name;
pub use state::{Parameters, State, Status};
pub use task::{TaskConfig, TaskDescriptor, TaskSchedule, UNLIMITED_RETRIES};
