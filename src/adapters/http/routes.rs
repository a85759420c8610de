//! HTTP routes for the flow and task API.

use axum::{
    routing::{get, post},
    Router,
};

use super::handlers::{execute_task, health, list_tasks, run_flow, run_task, ApiState};

/// Creates the API router with all endpoints.
pub fn api_routes(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/flows/run", post(run_flow))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/execute", post(execute_task))
        .route("/api/tasks/:name/run", post(run_task))
        .with_state(state)
}
