//! Static task configuration and its public descriptor

use serde::{Deserialize, Serialize};

use crate::state::Parameters;

/// `max_retries` value meaning "retry forever"
pub const UNLIMITED_RETRIES: i32 = -1;

/// A cron trigger bound to a task.
///
/// The expression has seconds precision, e.g. `"0 0 * * * *"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSchedule {
    pub schedule: String,
    #[serde(default)]
    pub parameters: Parameters,
}

/// Execution policy of a task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// Maximum number of deliveries processed in parallel
    pub concurrency: usize,

    /// Retries after the first attempt; `-1` retries forever, `0` never retries
    pub max_retries: i32,

    /// Cron triggers, in registration order
    pub schedules: Vec<TaskSchedule>,

    /// Parameters advertised to API clients
    pub default_parameters: Parameters,

    pub tags: Vec<String>,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            concurrency: 1,
            max_retries: 3,
            schedules: Vec::new(),
            default_parameters: Parameters::new(),
            tags: Vec::new(),
        }
    }
}

impl TaskConfig {
    /// Whether an attempt that just failed at `iterations` gets republished.
    ///
    /// With `max_retries = N` a lineage runs at most `N + 1` times.
    pub fn should_retry(&self, iterations: u32) -> bool {
        if self.max_retries == UNLIMITED_RETRIES {
            return true;
        }
        self.max_retries >= 0 && i64::from(iterations) <= i64::from(self.max_retries)
    }
}

/// JSON description of a registered task, as served by the API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDescriptor {
    pub name: String,
    pub concurrency: usize,
    pub max_retries: i32,
    pub schedules: Vec<TaskSchedule>,
    pub default_parameters: Parameters,
    pub tags: Vec<String>,
}

impl TaskDescriptor {
    pub fn new(name: impl Into<String>, config: &TaskConfig) -> Self {
        Self {
            name: name.into(),
            concurrency: config.concurrency,
            max_retries: config.max_retries,
            schedules: config.schedules.clone(),
            default_parameters: config.default_parameters.clone(),
            tags: config.tags.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = TaskConfig::default();
        assert_eq!(config.concurrency, 1);
        assert_eq!(config.max_retries, 3);
        assert!(config.schedules.is_empty());
        assert!(config.tags.is_empty());
    }

    #[test]
    fn test_retry_budget() {
        let mut config = TaskConfig {
            max_retries: 0,
            ..Default::default()
        };
        assert!(!config.should_retry(1));

        config.max_retries = 2;
        assert!(config.should_retry(1));
        assert!(config.should_retry(2));
        assert!(!config.should_retry(3));

        config.max_retries = UNLIMITED_RETRIES;
        assert!(config.should_retry(u32::MAX));
    }

    #[test]
    fn test_descriptor_json_shape() {
        let config = TaskConfig {
            concurrency: 4,
            max_retries: -1,
            schedules: vec![TaskSchedule {
                schedule: "0 * * * * *".to_string(),
                parameters: json!({"name": "cron"}).as_object().cloned().unwrap(),
            }],
            default_parameters: json!({"count": 10}).as_object().cloned().unwrap(),
            tags: vec!["demo".to_string()],
        };

        let value = serde_json::to_value(TaskDescriptor::new("hello", &config)).unwrap();
        assert_eq!(
            value,
            json!({
                "name": "hello",
                "concurrency": 4,
                "max_retries": -1,
                "schedules": [{"schedule": "0 * * * * *", "parameters": {"name": "cron"}}],
                "default_parameters": {"count": 10},
                "tags": ["demo"]
            })
        );
    }
}
