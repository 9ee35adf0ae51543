//! # Spindle REST API
//!
//! A thin HTTP surface over a running engine: list registered tasks, inspect
//! one, dispatch it with ad-hoc parameters, read its recent execution history
//! and the in-process execution metrics.
//!
//! | Route | Handler |
//! |---|---|
//! | `GET /tasks` | [`handlers::tasks::list_tasks`] |
//! | `GET /tasks/{name}` | [`handlers::tasks::get_task`] |
//! | `POST /tasks/{name}` | [`handlers::tasks::dispatch_task`] |
//! | `GET /tasks/{name}/executions` | [`handlers::executions::list_executions`] |
//! | `GET /metrics` | [`handlers::metrics::get_metrics`] |

pub mod app;
pub mod context;
pub mod errors;
pub mod handlers;

pub use app::{create_rest_app, AppConfig};
pub use context::ApiContext;
pub use errors::{RestError, RestResult};
