//! BackgroundTaskManager port - Long-running work managed outside a run.
//!
//! A `backgroundTask` state asks the manager to spawn a named task and then
//! waits for its terminal status. The interpreter always pairs the wait with
//! a deadline, so implementations are free to block until the task ends.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::domain::foundation::BackgroundTaskId;

/// Options passed along with a spawn request.
#[derive(Debug, Clone, Default)]
pub struct SpawnOptions {
    /// Upper bound the manager may apply to the task itself.
    pub timeout: Option<Duration>,
    /// Free-form label for logs (usually the flow run id).
    pub label: Option<String>,
}

/// Returned by a successful spawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackgroundTaskHandle {
    pub id: BackgroundTaskId,
}

/// Lifecycle state of a background task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundTaskState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl BackgroundTaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackgroundTaskState::Pending => "pending",
            BackgroundTaskState::Running => "running",
            BackgroundTaskState::Completed => "completed",
            BackgroundTaskState::Failed => "failed",
            BackgroundTaskState::Cancelled => "cancelled",
        }
    }

    /// Returns true once the task can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BackgroundTaskState::Completed
                | BackgroundTaskState::Failed
                | BackgroundTaskState::Cancelled
        )
    }
}

impl fmt::Display for BackgroundTaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Terminal report for a background task.
#[derive(Debug, Clone, PartialEq)]
pub struct BackgroundTaskStatus {
    pub status: BackgroundTaskState,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub output: Option<Value>,
}

/// Errors that can occur talking to the background task manager.
#[derive(Debug, Clone, Error)]
pub enum BackgroundTaskError {
    #[error("Background task '{0}' not found")]
    UnknownTask(String),

    #[error("Background task id '{0}' not found")]
    UnknownId(BackgroundTaskId),

    #[error("Failed to spawn background task: {0}")]
    SpawnFailed(String),
}

/// Port for spawning and awaiting background tasks.
#[async_trait]
pub trait BackgroundTaskManager: Send + Sync {
    /// Start `task_name` with `args`. Returns as soon as the task is accepted.
    async fn spawn(
        &self,
        task_name: &str,
        args: Value,
        options: SpawnOptions,
    ) -> Result<BackgroundTaskHandle, BackgroundTaskError>;

    /// Wait until the task reaches a terminal state.
    async fn wait_for(
        &self,
        id: &BackgroundTaskId,
    ) -> Result<BackgroundTaskStatus, BackgroundTaskError>;
}
