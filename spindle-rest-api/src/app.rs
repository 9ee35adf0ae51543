//! Router setup

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::{context::ApiContext, handlers};

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Enable request tracing
    pub enable_tracing: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_tracing: true,
        }
    }
}

/// Create the REST API application
pub fn create_rest_app(context: ApiContext, config: AppConfig) -> Router {
    let app = Router::new()
        .route("/tasks", get(handlers::tasks::list_tasks))
        .route(
            "/tasks/{name}",
            get(handlers::tasks::get_task).post(handlers::tasks::dispatch_task),
        )
        .route(
            "/tasks/{name}/executions",
            get(handlers::executions::list_executions),
        )
        .route("/metrics", get(handlers::metrics::get_metrics))
        .with_state(context);

    if config.enable_tracing {
        app.layer(TraceLayer::new_for_http())
    } else {
        app
    }
}
