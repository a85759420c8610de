//! Task invocation value types.
//!
//! Every invocation ends in exactly one [`TaskOutcome`]. Callers that only
//! care about the value use [`TaskOutcome::into_result`], which turns the
//! three failure outcomes into a classified [`TaskError`].

use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode};

/// One call into the task runner.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskInvocation {
    pub code: String,
    pub input: Value,
    pub timeout: Duration,
}

impl TaskInvocation {
    pub fn new(code: impl Into<String>, input: Value, timeout: Duration) -> Self {
        Self {
            code: code.into(),
            input,
            timeout,
        }
    }
}

/// The single outcome produced for an invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum TaskOutcome {
    Success {
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    RuntimeError {
        message: String,
        trace: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Timeout {
        elapsed_ms: u64,
    },
    #[serde(rename_all = "camelCase")]
    HostCrash {
        exit_code: Option<i32>,
    },
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Success { .. })
    }

    /// Collapse into the value or a classified error.
    pub fn into_result(self) -> Result<Value, TaskError> {
        match self {
            TaskOutcome::Success { value } => Ok(value),
            TaskOutcome::RuntimeError { message, trace } => {
                Err(TaskError::Runtime { message, trace })
            }
            TaskOutcome::Timeout { elapsed_ms } => Err(TaskError::Timeout { elapsed_ms }),
            TaskOutcome::HostCrash { exit_code } => Err(TaskError::HostCrash { exit_code }),
        }
    }
}

/// Classified task failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskError {
    #[error("Task timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    #[error("Task failed: {message}")]
    Runtime {
        message: String,
        trace: Option<String>,
    },

    #[error("Execution host exited without a result (exit code: {})", describe_exit(.exit_code))]
    HostCrash { exit_code: Option<i32> },
}

fn describe_exit(code: &Option<i32>) -> String {
    code.map(|c| c.to_string())
        .unwrap_or_else(|| "none".to_string())
}

impl TaskError {
    pub fn code(&self) -> ErrorCode {
        match self {
            TaskError::Timeout { .. } => ErrorCode::ExecutionTimeout,
            TaskError::Runtime { .. } => ErrorCode::RuntimeError,
            TaskError::HostCrash { .. } => ErrorCode::HostCrash,
        }
    }
}

impl From<TaskError> for DomainError {
    fn from(err: TaskError) -> Self {
        let code = err.code();
        let message = err.to_string();
        match err {
            TaskError::Runtime {
                trace: Some(trace), ..
            } => DomainError::new(code, message).with_detail("trace", trace),
            TaskError::Timeout { elapsed_ms } => {
                DomainError::new(code, message).with_detail("elapsed_ms", elapsed_ms.to_string())
            }
            _ => DomainError::new(code, message),
        }
    }
}
