//! Per-run execution state and the two shapes a run can end in.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::foundation::{ErrorCode, RunId};

/// Longest rendering of a value kept in a trace summary.
const SUMMARY_LIMIT: usize = 200;

/// Mutable state owned by one run of the interpreter.
///
/// Created when a run starts and dropped when it returns.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub run_id: RunId,
    pub current_state_id: String,
    /// Value threaded from state to state; starts as the run input.
    pub result: Value,
    /// One entry per handler attempt. Append-only.
    pub execution_log: Vec<String>,
    pub state_trace: Vec<StateTrace>,
    pub error: Option<String>,
}

/// Structured record of one handler attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StateTrace {
    pub state_id: String,
    pub handler: &'static str,
    pub outcome: StateOutcome,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum StateOutcome {
    Completed { summary: String },
    Failed { error: String },
}

impl ExecutionContext {
    pub fn new(run_id: RunId, initial_state_id: impl Into<String>, input: Value) -> Self {
        Self {
            run_id,
            current_state_id: initial_state_id.into(),
            result: input,
            execution_log: Vec::new(),
            state_trace: Vec::new(),
            error: None,
        }
    }

    /// Number of handler attempts made so far.
    pub fn attempts(&self) -> usize {
        self.execution_log.len()
    }

    /// Log the start of a handler attempt for the current state.
    pub fn begin_state(&mut self) {
        self.execution_log
            .push(format!("Executing state: {}", self.current_state_id));
    }

    /// Store a handler's output and trace it.
    pub fn record_success(&mut self, handler: &'static str, output: Value, elapsed_ms: u64) {
        self.state_trace.push(StateTrace {
            state_id: self.current_state_id.clone(),
            handler,
            outcome: StateOutcome::Completed {
                summary: summarize(&output),
            },
            elapsed_ms,
        });
        self.result = output;
        self.error = None;
    }

    /// Remember a handler failure and trace it. `result` is left untouched.
    pub fn record_failure(&mut self, handler: &'static str, error: String, elapsed_ms: u64) {
        self.state_trace.push(StateTrace {
            state_id: self.current_state_id.clone(),
            handler,
            outcome: StateOutcome::Failed {
                error: error.clone(),
            },
            elapsed_ms,
        });
        self.error = Some(error);
    }

    /// Move to another state, clearing any recovered error.
    pub fn transition_to(&mut self, state_id: impl Into<String>) {
        self.current_state_id = state_id.into();
        self.error = None;
    }

    pub fn into_result(self, duration_ms: u64) -> FlowRunResult {
        FlowRunResult {
            run_id: self.run_id,
            duration_ms,
            final_state_id: self.current_state_id,
            result: self.result,
            execution_log: self.execution_log,
            state_trace: self.state_trace,
        }
    }

    pub fn into_failure(
        self,
        code: ErrorCode,
        message: impl Into<String>,
        duration_ms: u64,
    ) -> FlowRunFailure {
        FlowRunFailure {
            code,
            message: message.into(),
            run_id: self.run_id,
            duration_ms,
            failed_state_id: Some(self.current_state_id),
            execution_log: self.execution_log,
            state_trace: self.state_trace,
        }
    }
}

/// Successful end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowRunResult {
    pub run_id: RunId,
    pub duration_ms: u64,
    pub final_state_id: String,
    pub result: Value,
    pub execution_log: Vec<String>,
    pub state_trace: Vec<StateTrace>,
}

/// Failed run, always carrying the trace gathered up to the failure.
#[derive(Debug, Clone, PartialEq, Serialize, Error)]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message}")]
pub struct FlowRunFailure {
    pub code: ErrorCode,
    pub message: String,
    pub run_id: RunId,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_state_id: Option<String>,
    pub execution_log: Vec<String>,
    pub state_trace: Vec<StateTrace>,
}

impl FlowRunFailure {
    /// Failure raised before any state ran, e.g. a malformed graph.
    pub fn rejected(run_id: RunId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            run_id,
            duration_ms: 0,
            failed_state_id: None,
            execution_log: Vec::new(),
            state_trace: Vec::new(),
        }
    }
}

fn summarize(value: &Value) -> String {
    let rendered = value.to_string();
    if rendered.chars().count() <= SUMMARY_LIMIT {
        rendered
    } else {
        let head: String = rendered.chars().take(SUMMARY_LIMIT).collect();
        format!("{}…", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn begin_state_appends_one_entry() {
        let mut ctx = ExecutionContext::new(RunId::new(), "s1", json!({}));
        ctx.begin_state();
        assert_eq!(ctx.execution_log, vec!["Executing state: s1".to_string()]);
        assert_eq!(ctx.attempts(), 1);
    }

    #[test]
    fn record_success_replaces_result_and_clears_error() {
        let mut ctx = ExecutionContext::new(RunId::new(), "s1", json!({"n": 1}));
        ctx.error = Some("stale".into());
        ctx.record_success("code", json!(2), 3);

        assert_eq!(ctx.result, json!(2));
        assert!(ctx.error.is_none());
        assert_eq!(
            ctx.state_trace[0].outcome,
            StateOutcome::Completed { summary: "2".into() }
        );
    }

    #[test]
    fn record_failure_keeps_result() {
        let mut ctx = ExecutionContext::new(RunId::new(), "s1", json!({"n": 1}));
        ctx.record_failure("task", "boom".into(), 1);

        assert_eq!(ctx.result, json!({"n": 1}));
        assert_eq!(ctx.error.as_deref(), Some("boom"));
    }

    #[test]
    fn transition_clears_error() {
        let mut ctx = ExecutionContext::new(RunId::new(), "s1", Value::Null);
        ctx.record_failure("task", "boom".into(), 1);
        ctx.transition_to("recover");

        assert_eq!(ctx.current_state_id, "recover");
        assert!(ctx.error.is_none());
    }

    #[test]
    fn long_summaries_are_truncated() {
        let big = json!("x".repeat(1000));
        let summary = summarize(&big);
        assert_eq!(summary.chars().count(), SUMMARY_LIMIT + 1);
        assert!(summary.ends_with('…'));
    }

    #[test]
    fn failure_serializes_with_wire_code() {
        let ctx = ExecutionContext::new(RunId::new(), "s1", Value::Null);
        let failure = ctx.into_failure(ErrorCode::FlowExecutionFailed, "boom", 12);
        let json = serde_json::to_value(&failure).unwrap();

        assert_eq!(json["code"], "FLOW_EXECUTION_FAILED");
        assert_eq!(json["durationMs"], 12);
        assert_eq!(json["failedStateId"], "s1");
        assert_eq!(failure.to_string(), "[FLOW_EXECUTION_FAILED] boom");
    }
}
