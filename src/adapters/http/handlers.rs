//! HTTP handlers for flow and task endpoints.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tokio::time::Instant;

use crate::application::{FlowInterpreter, TaskRunner};
use crate::domain::foundation::{DomainError, ErrorCode, RunId};
use crate::ports::{RepositoryError, TaskRepository};

use super::dto::{
    error_response, status_for, ErrorResponse, ExecuteTaskRequest, HealthResponse,
    RunFlowRequest, RunTaskRequest, TaskListResponse, TaskResultResponse,
};

// ════════════════════════════════════════════════════════════════════════════
// Handler state
// ════════════════════════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiState {
    interpreter: Arc<FlowInterpreter>,
    runner: Arc<TaskRunner>,
    tasks: Arc<dyn TaskRepository>,
}

impl ApiState {
    pub fn new(
        interpreter: Arc<FlowInterpreter>,
        runner: Arc<TaskRunner>,
        tasks: Arc<dyn TaskRepository>,
    ) -> Self {
        Self {
            interpreter,
            runner,
            tasks,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════
// HTTP handlers
// ════════════════════════════════════════════════════════════════════════════

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// POST /api/flows/run - Run a flow graph to completion
pub async fn run_flow(State(state): State<ApiState>, Json(req): Json<RunFlowRequest>) -> Response {
    let run_id = req.run_id.unwrap_or_else(RunId::new);

    match state.interpreter.run_with_id(run_id, &req.graph, req.input).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(failure) => (status_for(failure.code), Json(failure)).into_response(),
    }
}

/// POST /api/tasks/execute - Run inline task code
pub async fn execute_task(
    State(state): State<ApiState>,
    Json(req): Json<ExecuteTaskRequest>,
) -> Response {
    run_code(&state, &req.code, req.input, req.timeout_ms).await
}

/// POST /api/tasks/:name/run - Run a stored task
pub async fn run_task(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    body: Option<Json<RunTaskRequest>>,
) -> Response {
    let req = body.map(|Json(req)| req).unwrap_or_default();

    let code = match state.tasks.get_code(&name).await {
        Ok(Some(code)) => code,
        Ok(None) => {
            return (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::not_found("Task", &name)),
            )
                .into_response()
        }
        Err(e) => {
            let code = match e {
                RepositoryError::InvalidName(_) => ErrorCode::ValidationFailed,
                RepositoryError::Storage(_) => ErrorCode::InternalError,
            };
            return error_response(DomainError::new(code, e.to_string()));
        }
    };

    run_code(&state, &code, req.input, req.timeout_ms).await
}

/// GET /api/tasks - List stored tasks
pub async fn list_tasks(State(state): State<ApiState>) -> Response {
    match state.tasks.list().await {
        Ok(tasks) => (StatusCode::OK, Json(TaskListResponse { tasks })).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse::internal(e.to_string())),
        )
            .into_response(),
    }
}

async fn run_code(
    state: &ApiState,
    code: &str,
    input: serde_json::Value,
    timeout_ms: Option<u64>,
) -> Response {
    let started = Instant::now();
    let timeout = timeout_ms.map(Duration::from_millis);

    match state.runner.execute(code, input, timeout).await {
        Ok(result) => (
            StatusCode::OK,
            Json(TaskResultResponse {
                result,
                duration_ms: started.elapsed().as_millis() as u64,
            }),
        )
            .into_response(),
        Err(e) => error_response(e.into()),
    }
}
