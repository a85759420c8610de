//! ExecutionHost port - Disposable isolated runtimes for task code.
//!
//! The task runner never evaluates task code itself. For every invocation
//! it launches a fresh host, sends one [`HostRequest`], and waits for the
//! first [`HostEvent`]. Hosts are never reused.
//!
//! # Protocol
//!
//! ```text
//! runner                         host
//!   │  launch()                   │
//!   │────────────────────────────▶│  (fresh, no shared state)
//!   │  send({code, input})        │
//!   │────────────────────────────▶│
//!   │         Message(response)   │  exactly one of:
//!   │◀────────────────────────────│    Message / Error / Exit
//!   │  teardown()                 │
//!   │────────────────────────────▶│  (always, on every path)
//! ```
//!
//! The host must expose nothing to task code beyond `input` in and a value
//! out: no filesystem, network, process or module loading.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Request sent to a host. Serialized as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    pub code: String,
    pub input: Value,
}

/// Response produced by a host. Serialized as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum HostResponse {
    Success { result: Value },
    Error { error: HostErrorBody },
}

/// Error description embedded in a host response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Lifecycle signal observed from a running host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    /// The host answered.
    Message(HostResponse),
    /// The channel to the host failed or carried garbage.
    Error(String),
    /// The host went away without answering.
    Exit(Option<i32>),
}

/// Failure to bring a host up at all.
#[derive(Debug, Clone, Error)]
#[error("Failed to launch execution host: {0}")]
pub struct HostLaunchError(pub String);

/// Factory for isolated hosts.
#[async_trait]
pub trait ExecutionHost: Send + Sync {
    /// Start a new host dedicated to one invocation.
    async fn launch(&self) -> Result<Box<dyn HostSession>, HostLaunchError>;
}

/// One live host.
///
/// `next_event` may be cancelled by the caller's deadline; `teardown` must
/// then still release every resource the session holds.
#[async_trait]
pub trait HostSession: Send {
    /// Deliver the request. Called once per session.
    async fn send(&mut self, request: &HostRequest) -> Result<(), String>;

    /// Wait for the next lifecycle signal.
    async fn next_event(&mut self) -> HostEvent;

    /// Forcibly stop the host and release its resources. Idempotent.
    async fn teardown(&mut self);

    /// Returns true while the host is still holding OS resources.
    fn is_alive(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn success_response_wire_shape() {
        let json = serde_json::to_value(HostResponse::Success { result: json!(10) }).unwrap();
        assert_eq!(json, json!({"status": "success", "result": 10}));
    }

    #[test]
    fn error_response_parses_without_trace() {
        let parsed: HostResponse =
            serde_json::from_str(r#"{"status":"error","error":{"message":"boom"}}"#).unwrap();
        assert_eq!(
            parsed,
            HostResponse::Error {
                error: HostErrorBody {
                    message: "boom".into(),
                    trace: None
                }
            }
        );
    }
}
