//! Execution metrics endpoint

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};
use spindle_execution::TaskMetrics;
use tracing::info;

use crate::{
    context::ApiContext,
    errors::{RestError, RestResult},
};

/// Metrics response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsResponse {
    pub total_executions: u64,
    pub tasks: Vec<TaskMetrics>,
}

/// Counters collected by the metrics hook
pub async fn get_metrics(State(ctx): State<ApiContext>) -> RestResult<impl IntoResponse> {
    info!("Getting execution metrics");

    let metrics = ctx
        .metrics
        .as_ref()
        .ok_or_else(|| RestError::NotFound("Metrics are not enabled".to_string()))?;

    let tasks = metrics.snapshot();
    Ok(Json(MetricsResponse {
        total_executions: tasks.iter().map(|m| m.count).sum(),
        tasks,
    }))
}
