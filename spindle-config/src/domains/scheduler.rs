//! Cron scheduling configuration

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum cron-triggered dispatches in flight; extra firings are skipped
    pub max_concurrent_dispatches: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_dispatches: 100,
        }
    }
}

impl Validatable for SchedulerConfig {
    fn validate(&self) -> ConfigResult<()> {
        self.ensure_positive("max_concurrent_dispatches", self.max_concurrent_dispatches)
    }

    fn domain_name(&self) -> &'static str {
        "scheduler"
    }
}
