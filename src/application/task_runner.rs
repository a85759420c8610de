//! TaskRunner - runs one task invocation in a disposable execution host.
//!
//! Every invocation launches a fresh host, sends it `{code, input}` and races
//! the host's first lifecycle signal against a wall-clock deadline. The first
//! signal decides the outcome; the host is torn down on every path.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;

use crate::domain::task::{TaskError, TaskInvocation, TaskOutcome};
use crate::ports::{ExecutionHost, HostEvent, HostRequest, HostResponse, HostSession};

/// Deadline bounds applied to every invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRunnerConfig {
    /// Used when the caller does not supply a timeout.
    pub default_timeout: Duration,
    /// Upper bound on any caller-supplied timeout.
    pub max_timeout: Duration,
}

impl Default for TaskRunnerConfig {
    fn default() -> Self {
        Self {
            default_timeout: Duration::from_millis(5_000),
            max_timeout: Duration::from_millis(60_000),
        }
    }
}

pub struct TaskRunner {
    host: Arc<dyn ExecutionHost>,
    config: TaskRunnerConfig,
}

impl TaskRunner {
    pub fn new(host: Arc<dyn ExecutionHost>, config: TaskRunnerConfig) -> Self {
        Self { host, config }
    }

    pub fn config(&self) -> &TaskRunnerConfig {
        &self.config
    }

    /// Effective deadline for a caller-supplied timeout.
    pub fn effective_timeout(&self, requested: Option<Duration>) -> Duration {
        requested
            .unwrap_or(self.config.default_timeout)
            .min(self.config.max_timeout)
    }

    /// Run `code` against `input`, collapsing the outcome into a result.
    pub async fn execute(
        &self,
        code: &str,
        input: Value,
        timeout: Option<Duration>,
    ) -> Result<Value, TaskError> {
        let invocation = TaskInvocation::new(code, input, self.effective_timeout(timeout));
        self.invoke(invocation).await.into_result()
    }

    /// Run one invocation. Always produces exactly one outcome, within the
    /// invocation's timeout plus teardown time.
    pub async fn invoke(&self, invocation: TaskInvocation) -> TaskOutcome {
        let started = Instant::now();
        let deadline = started + invocation.timeout;

        let mut session = match tokio::time::timeout_at(deadline, self.host.launch()).await {
            Ok(Ok(session)) => session,
            Ok(Err(e)) => {
                tracing::warn!(error = %e, "Execution host failed to launch");
                return TaskOutcome::HostCrash { exit_code: None };
            }
            Err(_) => {
                return TaskOutcome::Timeout {
                    elapsed_ms: elapsed_ms(started),
                }
            }
        };

        let request = HostRequest {
            code: invocation.code,
            input: invocation.input,
        };

        let outcome = tokio::select! {
            event = deliver(session.as_mut(), &request) => classify(event),
            _ = tokio::time::sleep_until(deadline) => TaskOutcome::Timeout {
                elapsed_ms: elapsed_ms(started),
            },
        };

        session.teardown().await;

        match &outcome {
            TaskOutcome::Success { .. } => {
                tracing::debug!(elapsed_ms = elapsed_ms(started), "Task completed")
            }
            TaskOutcome::Timeout { elapsed_ms } => {
                tracing::warn!(elapsed_ms, "Task exceeded its deadline, host torn down")
            }
            other => tracing::debug!(outcome = ?other, "Task failed"),
        }

        outcome
    }
}

async fn deliver(session: &mut dyn HostSession, request: &HostRequest) -> HostEvent {
    if let Err(e) = session.send(request).await {
        // A host that exited before reading its request reports that exit.
        return match session.next_event().await {
            exit @ HostEvent::Exit(_) => exit,
            _ => HostEvent::Error(e),
        };
    }
    session.next_event().await
}

fn classify(event: HostEvent) -> TaskOutcome {
    match event {
        HostEvent::Message(HostResponse::Success { result }) => TaskOutcome::Success { value: result },
        HostEvent::Message(HostResponse::Error { error }) => TaskOutcome::RuntimeError {
            message: error.message,
            trace: error.trace,
        },
        HostEvent::Error(message) => TaskOutcome::RuntimeError {
            message,
            trace: None,
        },
        HostEvent::Exit(exit_code) => TaskOutcome::HostCrash { exit_code },
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
