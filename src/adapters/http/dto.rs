//! Request and response bodies for the HTTP API.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::flow::FlowGraph;
use crate::domain::foundation::{DomainError, ErrorCode, RunId};

/// POST /api/flows/run
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFlowRequest {
    pub graph: FlowGraph,
    #[serde(default)]
    pub input: Value,
    /// Lets a client subscribe to the run's progress before starting it.
    pub run_id: Option<RunId>,
}

/// POST /api/tasks/execute
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteTaskRequest {
    pub code: String,
    #[serde(default)]
    pub input: Value,
    pub timeout_ms: Option<u64>,
}

/// POST /api/tasks/:name/run
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunTaskRequest {
    #[serde(default)]
    pub input: Value,
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultResponse {
    pub result: Value,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Standard error response.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorResponse {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: code.as_str().to_string(),
            message: message.into(),
            details: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn not_found(resource_type: &str, id: &str) -> Self {
        Self::new(
            ErrorCode::NotFound,
            format!("{} not found: {}", resource_type, id),
        )
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }
}

impl From<DomainError> for ErrorResponse {
    fn from(err: DomainError) -> Self {
        let details = (!err.details.is_empty())
            .then(|| serde_json::to_value(&err.details).ok())
            .flatten();
        Self {
            code: err.code.as_str().to_string(),
            message: err.message,
            details,
        }
    }
}

/// HTTP status for a domain error code.
pub fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::ValidationFailed => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::ExecutionTimeout => StatusCode::REQUEST_TIMEOUT,
        ErrorCode::RuntimeError | ErrorCode::FlowExecutionFailed => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorCode::HostCrash => StatusCode::BAD_GATEWAY,
        ErrorCode::ConnectionLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Render a domain error with its mapped status.
pub fn error_response(err: DomainError) -> Response {
    let status = status_for(err.code);
    (status, Json(ErrorResponse::from(err))).into_response()
}
