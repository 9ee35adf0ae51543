//! In-process execution counters

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use spindle_core::{State, Status};
use spindle_interfaces::{AnyTask, Hook, HookError};
use std::collections::HashMap;

/// Completed attempts of one task with one terminal status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskMetrics {
    pub task_name: String,
    pub status: Status,
    pub count: u64,
    pub total_duration_ms: f64,
    pub max_duration_ms: f64,
}

impl TaskMetrics {
    pub fn average_duration_ms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.total_duration_ms / self.count as f64
        }
    }
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    total_ms: f64,
    max_ms: f64,
}

/// Counts finished attempts and their durations by task and status.
///
/// Duration runs from the attempt's `started_at` to the after-execute call.
#[derive(Default)]
pub struct MetricsHook {
    counters: Mutex<HashMap<(String, Status), Accumulator>>,
}

impl MetricsHook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counters sorted by task name, then status
    pub fn snapshot(&self) -> Vec<TaskMetrics> {
        let mut metrics: Vec<TaskMetrics> = self
            .counters
            .lock()
            .iter()
            .map(|((task_name, status), acc)| TaskMetrics {
                task_name: task_name.clone(),
                status: *status,
                count: acc.count,
                total_duration_ms: acc.total_ms,
                max_duration_ms: acc.max_ms,
            })
            .collect();
        metrics.sort_by(|a, b| {
            a.task_name
                .cmp(&b.task_name)
                .then_with(|| a.status.as_str().cmp(b.status.as_str()))
        });
        metrics
    }
}

#[async_trait]
impl Hook for MetricsHook {
    fn name(&self) -> &str {
        "metrics"
    }

    async fn before_execute(&self, _task: &dyn AnyTask, _state: &State) -> Result<(), HookError> {
        Ok(())
    }

    async fn after_execute(&self, task: &dyn AnyTask, state: &State) -> Result<(), HookError> {
        let duration_ms = state
            .started_at
            .map(|started| (Utc::now() - started).num_microseconds().unwrap_or(0) as f64 / 1000.0)
            .unwrap_or(0.0)
            .max(0.0);

        let mut counters = self.counters.lock();
        let acc = counters
            .entry((task.name().to_string(), state.status))
            .or_default();
        acc.count += 1;
        acc.total_ms += duration_ms;
        acc.max_ms = acc.max_ms.max(duration_ms);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_core::{Parameters, TaskConfig, TaskDescriptor};

    struct Named(&'static str);

    impl AnyTask for Named {
        fn name(&self) -> &str {
            self.0
        }

        fn descriptor(&self) -> TaskDescriptor {
            TaskDescriptor::new(self.0, &TaskConfig::default())
        }
    }

    fn finished(status: Status) -> State {
        let mut state = State::new(Parameters::new());
        state.begin_attempt();
        state.status = status;
        state
    }

    #[tokio::test]
    async fn test_counts_by_task_and_status() {
        let hook = MetricsHook::new();
        let hello = Named("hello");
        let dispatch = Named("dispatch");

        hook.after_execute(&hello, &finished(Status::Success)).await.unwrap();
        hook.after_execute(&hello, &finished(Status::Success)).await.unwrap();
        hook.after_execute(&hello, &finished(Status::Failed)).await.unwrap();
        hook.after_execute(&dispatch, &finished(Status::Success)).await.unwrap();

        let snapshot = hook.snapshot();
        let summary: Vec<(&str, Status, u64)> = snapshot
            .iter()
            .map(|m| (m.task_name.as_str(), m.status, m.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("dispatch", Status::Success, 1),
                ("hello", Status::Failed, 1),
                ("hello", Status::Success, 2),
            ]
        );
        assert!(snapshot.iter().all(|m| m.max_duration_ms >= 0.0));
    }

    #[tokio::test]
    async fn test_missing_start_counts_zero_duration() {
        let hook = MetricsHook::new();
        let mut state = State::new(Parameters::new());
        state.status = Status::Failed;

        hook.after_execute(&Named("hello"), &state).await.unwrap();

        let snapshot = hook.snapshot();
        assert_eq!(snapshot[0].total_duration_ms, 0.0);
        assert_eq!(snapshot[0].average_duration_ms(), 0.0);
    }
}
