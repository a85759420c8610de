//! HTTP adapters - REST API and realtime endpoint exposure.

pub mod dto;
mod handlers;
mod routes;

pub use dto::{ErrorResponse, HealthResponse};
pub use handlers::ApiState;
pub use routes::api_routes;

use axum::http::{header, HeaderValue, Method};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::adapters::realtime::{realtime_routes, RealtimeState};
use crate::config::ServerConfig;

/// Assemble the full application router.
///
/// The request timeout applies to the API routes only; realtime
/// connections outlive their upgrade request.
pub fn build_router(api: ApiState, realtime: RealtimeState, server: &ServerConfig) -> Router {
    Router::new()
        .merge(api_routes(api).layer(TimeoutLayer::new(server.request_timeout())))
        .merge(realtime_routes(realtime))
        .layer(cors_layer(&server.cors_origins_list()))
        .layer(TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT]);

    if origins.is_empty() {
        return cors;
    }
    if origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::error!(origin = %origin, "Invalid CORS origin, ignoring");
                None
            }
        })
        .collect();

    if allowed.is_empty() {
        tracing::warn!("All configured CORS origins were invalid; disabling CORS");
        cors
    } else {
        tracing::info!(origins = ?origins, "CORS configured");
        cors.allow_origin(AllowOrigin::list(allowed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::adapters::background::LocalBackgroundTaskManager;
    use crate::adapters::realtime::{AdmissionController, Broadcaster};
    use crate::adapters::repository::InMemoryTaskRepository;
    use crate::adapters::sandbox::EmbeddedHost;
    use crate::application::{FlowInterpreter, FlowInterpreterConfig, TaskRunner, TaskRunnerConfig};

    fn router() -> Router {
        let tasks = Arc::new(InMemoryTaskRepository::new().with_task("double", "input.n * 2"));
        let runner = Arc::new(TaskRunner::new(
            Arc::new(EmbeddedHost::default()),
            TaskRunnerConfig::default(),
        ));
        let background = Arc::new(LocalBackgroundTaskManager::new(runner.clone(), tasks.clone()));
        let broadcaster = Arc::new(Broadcaster::new());
        let interpreter = Arc::new(
            FlowInterpreter::new(
                runner.clone(),
                tasks.clone(),
                background,
                FlowInterpreterConfig::default(),
            )
            .with_progress(broadcaster.clone()),
        );

        build_router(
            ApiState::new(interpreter, runner, tasks),
            RealtimeState::new(broadcaster, Arc::new(AdmissionController::new(5)), 8),
            &ServerConfig::default(),
        )
    }

    async fn call(method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(json) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(json.to_string())
            }
            None => Body::empty(),
        };
        let response = router()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (status, body) = call("GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn runs_a_flow() {
        let (status, body) = call(
            "POST",
            "/api/flows/run",
            Some(json!({
                "graph": {"id": "f", "states": {
                    "s1": {"kind": "initial", "handler": {"type": "task", "taskName": "double"}, "onDone": "s2"},
                    "s2": {"kind": "final"}
                }},
                "input": {"n": 5}
            })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], 10);
        assert_eq!(body["finalStateId"], "s2");
        assert_eq!(body["executionLog"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn invalid_graph_is_bad_request() {
        let (status, body) = call(
            "POST",
            "/api/flows/run",
            Some(json!({"graph": {"id": "f", "states": {}}})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn failed_flow_returns_trace() {
        let (status, body) = call(
            "POST",
            "/api/flows/run",
            Some(json!({"graph": {"id": "f", "states": {
                "s1": {"handler": {"type": "code", "body": "throw \"x\";"}}
            }}})),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "FLOW_EXECUTION_FAILED");
        assert_eq!(body["executionLog"][0], "Executing state: s1");
        assert!(body["durationMs"].is_u64());
    }

    #[tokio::test]
    async fn executes_inline_code() {
        let (status, body) = call(
            "POST",
            "/api/tasks/execute",
            Some(json!({"code": "input.a + input.b", "input": {"a": 2, "b": 3}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], 5);
    }

    #[tokio::test]
    async fn inline_timeout_is_classified() {
        let (status, body) = call(
            "POST",
            "/api/tasks/execute",
            Some(json!({"code": "loop {}", "timeoutMs": 50})),
        )
        .await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["code"], "EXECUTION_TIMEOUT");
    }

    #[tokio::test]
    async fn runs_stored_task() {
        let (status, body) = call(
            "POST",
            "/api/tasks/double/run",
            Some(json!({"input": {"n": 21}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["result"], 42);
    }

    #[tokio::test]
    async fn unknown_stored_task_is_not_found() {
        let (status, body) = call("POST", "/api/tasks/ghost/run", Some(json!({}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["code"], "NOT_FOUND");
    }

    #[tokio::test]
    async fn lists_tasks() {
        let (status, body) = call("GET", "/api/tasks", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["tasks"], json!(["double"]));
    }
}
