//! Batched task history configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Task logger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TaskLoggerConfig {
    /// Pending entries buffered before `log_task` callers wait
    pub channel_capacity: usize,

    /// Batch size that triggers an immediate flush
    pub batch_size: usize,

    /// Maximum time between flushes
    #[serde(with = "crate::domains::utils::serde_duration")]
    pub flush_interval: Duration,

    /// History retention applied on dialects that support it
    pub retention_days: u32,
}

impl Default for TaskLoggerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1000,
            batch_size: 5000,
            flush_interval: Duration::from_secs(1),
            retention_days: 7,
        }
    }
}

impl Validatable for TaskLoggerConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.ensure_positive("channel_capacity", self.channel_capacity)?;
        self.ensure_positive("batch_size", self.batch_size)?;
        self.ensure_positive("retention_days", self.retention_days)?;
        if self.flush_interval.is_zero() {
            return Err(self.invalid("flush_interval must be greater than 0"));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "task_logger"
    }
}
