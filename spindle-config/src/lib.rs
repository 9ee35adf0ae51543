//! Domain-driven configuration management for Spindle
//!
//! Configuration is split by functional domain. Every domain has serde
//! defaults, so an empty YAML document is a valid configuration, and
//! implements [`Validatable`]. [`ConfigLoader`] layers `SPINDLE_*`
//! environment variables over the file.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    api::ApiConfig,
    broker::BrokerConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    scheduler::SchedulerConfig,
    storage::{StorageBackend, StorageConfig, StorageDialect},
    task_logger::TaskLoggerConfig,
    SpindleConfig,
};

pub use domains::utils::{format_duration, parse_duration, serde_duration};
