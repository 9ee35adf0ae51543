//! Task listing and dispatch endpoints

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use spindle_core::{Parameters, TaskDescriptor};
use tracing::{info, warn};

use crate::{
    context::ApiContext,
    errors::{RestError, RestResult},
};

/// List every registered task
pub async fn list_tasks(State(ctx): State<ApiContext>) -> RestResult<impl IntoResponse> {
    info!("Listing {} tasks", ctx.tasks.len());

    let descriptors: Vec<TaskDescriptor> =
        ctx.tasks.values().map(|task| task.descriptor()).collect();
    Ok(Json(descriptors))
}

/// Get one task by name
pub async fn get_task(
    State(ctx): State<ApiContext>,
    Path(name): Path<String>,
) -> RestResult<impl IntoResponse> {
    info!("Getting task: {}", name);

    let task = ctx.task(&name).ok_or_else(RestError::task_not_found)?;
    Ok(Json(task.descriptor()))
}

/// Dispatch one execution with the JSON object body as parameters
pub async fn dispatch_task(
    State(ctx): State<ApiContext>,
    Path(name): Path<String>,
    body: Result<Json<Parameters>, JsonRejection>,
) -> RestResult<impl IntoResponse> {
    let task = ctx.task(&name).ok_or_else(RestError::task_not_found)?;

    let Json(parameters) = body.map_err(|rejection| {
        warn!("Invalid dispatch body for task {}: {}", name, rejection);
        RestError::bad_request("Invalid request body")
    })?;

    info!("Dispatching task: {}", name);
    task.dispatch(parameters).await.map_err(|e| {
        warn!("Failed to dispatch task {}: {}", name, e);
        RestError::internal_error("Failed to dispatch task")
    })?;

    Ok(Json(json!({ "message": "Task dispatched successfully" })))
}
