//! Execution history endpoint

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use spindle_interfaces::SqlValue;
use spindle_storage::schema::SELECT_TASK_HISTORY;
use tracing::{info, warn};

use crate::{
    context::ApiContext,
    errors::{RestError, RestResult},
};

pub const DEFAULT_HISTORY_LIMIT: u32 = 50;
pub const MAX_HISTORY_LIMIT: u32 = 500;

#[derive(Debug, Default, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<u32>,
}

impl HistoryQuery {
    fn effective_limit(&self) -> u32 {
        self.limit
            .unwrap_or(DEFAULT_HISTORY_LIMIT)
            .clamp(1, MAX_HISTORY_LIMIT)
    }
}

/// Most recent history rows of a task, newest first
pub async fn list_executions(
    State(ctx): State<ApiContext>,
    Path(name): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> RestResult<impl IntoResponse> {
    if ctx.task(&name).is_none() {
        return Err(RestError::task_not_found());
    }
    let storage = ctx.storage.as_ref().ok_or_else(|| {
        RestError::ServiceUnavailable("Execution history is not available".to_string())
    })?;

    let limit = query.effective_limit();
    info!("Listing up to {} executions of task: {}", limit, name);

    let rows = storage
        .query(
            SELECT_TASK_HISTORY,
            &[SqlValue::from(name.as_str()), SqlValue::Int(i64::from(limit))],
        )
        .await
        .map_err(|e| {
            warn!("Failed to query history of task {}: {}", name, e);
            RestError::internal_error("Failed to query execution history")
        })?;

    Ok(Json(rows))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_defaults_and_bounds() {
        assert_eq!(HistoryQuery { limit: None }.effective_limit(), 50);
        assert_eq!(HistoryQuery { limit: Some(0) }.effective_limit(), 1);
        assert_eq!(HistoryQuery { limit: Some(10_000) }.effective_limit(), 500);
    }
}
