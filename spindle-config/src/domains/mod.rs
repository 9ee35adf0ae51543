//! Domain-specific configuration modules

pub mod api;
pub mod broker;
pub mod logging;
pub mod scheduler;
pub mod storage;
pub mod task_logger;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Spindle configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SpindleConfig {
    /// Message broker configuration
    pub broker: broker::BrokerConfig,

    /// Persistent storage configuration
    pub storage: storage::StorageConfig,

    /// Dispatch API configuration
    pub api: api::ApiConfig,

    /// Batched execution history configuration
    pub task_logger: task_logger::TaskLoggerConfig,

    /// Logging configuration
    pub logging: logging::LoggingConfig,

    /// Cron scheduling configuration
    pub scheduler: scheduler::SchedulerConfig,
}

impl SpindleConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.broker.validate()?;
        self.storage.validate()?;
        self.api.validate()?;
        self.task_logger.validate()?;
        self.logging.validate()?;
        self.scheduler.validate()?;
        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = SpindleConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
