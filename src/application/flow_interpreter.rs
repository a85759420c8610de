//! FlowInterpreter - walks a flow graph one state at a time.
//!
//! Each non-final state's handler runs to completion before the next state
//! is chosen. Handler failures are caught here and routed along `onError`;
//! only a failure with nowhere to go ends the run with an error.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;

use crate::domain::flow::{ExecutionContext, FlowGraph, FlowRunFailure, FlowRunResult, StateHandler};
use crate::domain::foundation::{ErrorCode, RunId};
use crate::domain::realtime::ProgressEvent;
use crate::domain::task::TaskError;
use crate::ports::{
    BackgroundTaskError, BackgroundTaskManager, BackgroundTaskState, ProgressPublisher,
    RepositoryError, SpawnOptions, TaskRepository,
};

use super::task_runner::TaskRunner;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowInterpreterConfig {
    /// Maximum handler attempts per run.
    pub max_steps: usize,
    /// Deadline for `backgroundTask` states that do not set `timeoutMs`.
    pub default_background_timeout: Duration,
}

impl Default for FlowInterpreterConfig {
    fn default() -> Self {
        Self {
            max_steps: 1_000,
            default_background_timeout: Duration::from_millis(30_000),
        }
    }
}

/// Why a single state's handler failed.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Task '{0}' not found")]
    TaskNotFound(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Task(#[from] TaskError),

    #[error(transparent)]
    BackgroundTask(#[from] BackgroundTaskError),

    #[error("Background task '{task_name}' timed out after {timeout_ms}ms")]
    BackgroundTimeout { task_name: String, timeout_ms: u64 },

    #[error("Background task '{task_name}' ended with status {status}{}", describe_cause(.error))]
    BackgroundNotCompleted {
        task_name: String,
        status: BackgroundTaskState,
        error: Option<String>,
    },
}

fn describe_cause(error: &Option<String>) -> String {
    error
        .as_ref()
        .map(|e| format!(": {}", e))
        .unwrap_or_default()
}

pub struct FlowInterpreter {
    runner: Arc<TaskRunner>,
    tasks: Arc<dyn TaskRepository>,
    background: Arc<dyn BackgroundTaskManager>,
    progress: Option<Arc<dyn ProgressPublisher>>,
    config: FlowInterpreterConfig,
}

impl FlowInterpreter {
    pub fn new(
        runner: Arc<TaskRunner>,
        tasks: Arc<dyn TaskRepository>,
        background: Arc<dyn BackgroundTaskManager>,
        config: FlowInterpreterConfig,
    ) -> Self {
        Self {
            runner,
            tasks,
            background,
            progress: None,
            config,
        }
    }

    /// Publish progress for every run to `publisher`.
    pub fn with_progress(mut self, publisher: Arc<dyn ProgressPublisher>) -> Self {
        self.progress = Some(publisher);
        self
    }

    /// Execute `graph` starting from `input`.
    pub async fn run(&self, graph: &FlowGraph, input: Value) -> Result<FlowRunResult, FlowRunFailure> {
        self.run_with_id(RunId::new(), graph, input).await
    }

    /// Execute `graph` under a caller-chosen run id, so clients can subscribe
    /// to its progress before the run starts.
    pub async fn run_with_id(
        &self,
        run_id: RunId,
        graph: &FlowGraph,
        input: Value,
    ) -> Result<FlowRunResult, FlowRunFailure> {
        let started = Instant::now();

        if let Err(e) = graph.validate() {
            tracing::warn!(flow_id = %graph.id, error = %e, "Rejected invalid flow graph");
            return Err(FlowRunFailure::rejected(run_id, ErrorCode::ValidationFailed, e.to_string()));
        }
        let initial = graph
            .resolve_initial_state()
            .map_err(|e| FlowRunFailure::rejected(run_id, ErrorCode::ValidationFailed, e.to_string()))?;

        tracing::info!(flow_id = %graph.id, %run_id, initial_state = initial, "Flow run started");

        let mut ctx = ExecutionContext::new(run_id, initial, input);
        let work_states = graph.states.values().filter(|s| !s.is_final()).count().max(1);

        loop {
            let state = match graph.state(&ctx.current_state_id) {
                Some(state) => state,
                None => {
                    // validate() guarantees edges resolve
                    let message = format!("Unknown state '{}'", ctx.current_state_id);
                    return Err(self.fail(graph, ctx, message, started).await);
                }
            };
            if state.is_final() {
                break;
            }

            if ctx.attempts() >= self.config.max_steps {
                let message = format!("step limit of {} exceeded", self.config.max_steps);
                return Err(self.fail(graph, ctx, message, started).await);
            }

            ctx.begin_state();
            let percentage = (ctx.attempts() * 100 / work_states).min(99) as u8;
            self.publish(
                ProgressEvent::new(
                    run_id,
                    &graph.id,
                    format!("state:{}", ctx.current_state_id),
                    percentage,
                    json!({ "stateId": ctx.current_state_id, "handler": state.handler.kind_name() }),
                ),
            )
            .await;

            let handler_started = Instant::now();
            let outcome = self.dispatch(run_id, &state.handler, &ctx.result).await;
            let elapsed_ms = handler_started.elapsed().as_millis() as u64;

            match outcome {
                Ok(output) => {
                    ctx.record_success(state.handler.kind_name(), output, elapsed_ms);
                    match &state.on_done {
                        Some(next) => ctx.transition_to(next.clone()),
                        None => break,
                    }
                }
                Err(err) => {
                    tracing::debug!(%run_id, state = %ctx.current_state_id, error = %err, "State handler failed");
                    ctx.record_failure(state.handler.kind_name(), err.to_string(), elapsed_ms);
                    match &state.on_error {
                        Some(next) => ctx.transition_to(next.clone()),
                        None => {
                            let message = err.to_string();
                            return Err(self.fail(graph, ctx, message, started).await);
                        }
                    }
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            flow_id = %graph.id,
            %run_id,
            final_state = %ctx.current_state_id,
            attempts = ctx.attempts(),
            duration_ms,
            "Flow run completed"
        );
        self.publish(ProgressEvent::new(
            run_id,
            &graph.id,
            "completed",
            100,
            json!({ "finalStateId": ctx.current_state_id }),
        ))
        .await;

        Ok(ctx.into_result(duration_ms))
    }

    async fn dispatch(
        &self,
        run_id: RunId,
        handler: &StateHandler,
        current: &Value,
    ) -> Result<Value, HandlerError> {
        match handler {
            StateHandler::None => Ok(current.clone()),

            StateHandler::Code { body } => Ok(self.runner.execute(body, current.clone(), None).await?),

            StateHandler::Task {
                task_name,
                input_json,
            } => {
                let code = self
                    .tasks
                    .get_code(task_name)
                    .await?
                    .ok_or_else(|| HandlerError::TaskNotFound(task_name.clone()))?;
                let input = input_json.clone().unwrap_or_else(|| current.clone());
                Ok(self.runner.execute(&code, input, None).await?)
            }

            StateHandler::BackgroundTask {
                task_name,
                timeout_ms,
            } => {
                let timeout = timeout_ms
                    .map(Duration::from_millis)
                    .unwrap_or(self.config.default_background_timeout);
                self.await_background(run_id, task_name, current.clone(), timeout)
                    .await
            }
        }
    }

    async fn await_background(
        &self,
        run_id: RunId,
        task_name: &str,
        args: Value,
        timeout: Duration,
    ) -> Result<Value, HandlerError> {
        let timed_out = || HandlerError::BackgroundTimeout {
            task_name: task_name.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        };

        let options = SpawnOptions {
            timeout: Some(timeout),
            label: Some(run_id.to_string()),
        };

        let status = tokio::time::timeout(timeout, async {
            let handle = self.background.spawn(task_name, args, options).await?;
            let status = self.background.wait_for(&handle.id).await?;
            Ok::<_, BackgroundTaskError>((handle, status))
        })
        .await
        .map_err(|_| timed_out())??;

        let (handle, status) = status;
        if status.status != BackgroundTaskState::Completed {
            return Err(HandlerError::BackgroundNotCompleted {
                task_name: task_name.to_string(),
                status: status.status,
                error: status.error,
            });
        }

        Ok(json!({
            "taskId": handle.id.as_str(),
            "status": status.status,
            "durationMs": status.duration_ms,
            "output": status.output,
        }))
    }

    async fn fail(
        &self,
        graph: &FlowGraph,
        ctx: ExecutionContext,
        message: String,
        started: Instant,
    ) -> FlowRunFailure {
        let duration_ms = started.elapsed().as_millis() as u64;
        tracing::warn!(
            flow_id = %graph.id,
            run_id = %ctx.run_id,
            state = %ctx.current_state_id,
            attempts = ctx.attempts(),
            duration_ms,
            error = %message,
            "Flow run failed"
        );
        self.publish(ProgressEvent::new(
            ctx.run_id,
            &graph.id,
            "failed",
            100,
            json!({ "stateId": ctx.current_state_id, "error": message }),
        ))
        .await;

        ctx.into_failure(ErrorCode::FlowExecutionFailed, message, duration_ms)
    }

    async fn publish(&self, event: ProgressEvent) {
        if let Some(progress) = &self.progress {
            progress.publish_progress(&event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::background::LocalBackgroundTaskManager;
    use crate::adapters::repository::InMemoryTaskRepository;
    use crate::adapters::sandbox::EmbeddedHost;
    use crate::application::task_runner::TaskRunnerConfig;
    use crate::domain::foundation::BackgroundTaskId;
    use crate::ports::{BackgroundTaskHandle, BackgroundTaskStatus};
    use async_trait::async_trait;
    use proptest::prelude::*;
    use std::sync::Mutex;

    fn runner() -> Arc<TaskRunner> {
        Arc::new(TaskRunner::new(
            Arc::new(EmbeddedHost::default()),
            TaskRunnerConfig::default(),
        ))
    }

    fn interpreter_with(
        tasks: InMemoryTaskRepository,
        background: Arc<dyn BackgroundTaskManager>,
    ) -> FlowInterpreter {
        FlowInterpreter::new(
            runner(),
            Arc::new(tasks),
            background,
            FlowInterpreterConfig::default(),
        )
    }

    fn interpreter(tasks: InMemoryTaskRepository) -> FlowInterpreter {
        let runner = runner();
        let repository = Arc::new(tasks.clone());
        let background = Arc::new(LocalBackgroundTaskManager::new(runner.clone(), repository));
        interpreter_with(tasks, background)
    }

    fn graph(json: &str) -> FlowGraph {
        serde_json::from_str(json).unwrap()
    }

    /// Background manager double with a fixed terminal status.
    struct FixedBackground {
        status: Option<BackgroundTaskState>,
        spawned: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl BackgroundTaskManager for FixedBackground {
        async fn spawn(
            &self,
            task_name: &str,
            _args: Value,
            _options: SpawnOptions,
        ) -> Result<BackgroundTaskHandle, BackgroundTaskError> {
            self.spawned.lock().unwrap().push(task_name.to_string());
            Ok(BackgroundTaskHandle {
                id: BackgroundTaskId::new("bg-1"),
            })
        }

        async fn wait_for(
            &self,
            _id: &BackgroundTaskId,
        ) -> Result<BackgroundTaskStatus, BackgroundTaskError> {
            match self.status {
                Some(status) => Ok(BackgroundTaskStatus {
                    status,
                    duration_ms: 7,
                    error: (status != BackgroundTaskState::Completed).then(|| "disk full".to_string()),
                    output: None,
                }),
                None => futures::future::pending().await,
            }
        }
    }

    fn fixed(status: Option<BackgroundTaskState>) -> Arc<FixedBackground> {
        Arc::new(FixedBackground {
            status,
            spawned: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn scenario_task_then_final() {
        let tasks = InMemoryTaskRepository::new().with_task("double", "input.n * 2");
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"kind":"initial","handler":{"type":"task","taskName":"double"},"onDone":"s2"},
                "s2":{"kind":"final"}}}"#,
        );

        let result = interpreter(tasks).run(&flow, json!({"n": 5})).await.unwrap();

        assert_eq!(result.result, json!(10));
        assert_eq!(result.final_state_id, "s2");
        assert_eq!(result.execution_log, vec!["Executing state: s1"]);
        assert_eq!(result.state_trace.len(), 1);
    }

    #[tokio::test]
    async fn scenario_error_edge_recovers() {
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"code","body":"throw \"bad\";"},"onDone":"ok","onError":"sErr"},
                "ok":{"kind":"final"},
                "sErr":{"kind":"final"}}}"#,
        );

        let result = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!({"keep": true}))
            .await
            .unwrap();

        assert_eq!(result.final_state_id, "sErr");
        assert_eq!(result.result, json!({"keep": true}));
        assert_eq!(result.execution_log.len(), 1);
    }

    #[tokio::test]
    async fn missing_on_done_is_terminal() {
        let flow = graph(
            r#"{"id":"f","states":{"only":{"handler":{"type":"code","body":"input + 1"}}}}"#,
        );
        let result = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!(1))
            .await
            .unwrap();

        assert_eq!(result.final_state_id, "only");
        assert_eq!(result.result, json!(2));
    }

    #[tokio::test]
    async fn unrecoverable_failure_surfaces_with_trace() {
        let flow = graph(
            r#"{"id":"f","states":{
                "a":{"handler":{"type":"none"},"onDone":"b"},
                "b":{"handler":{"type":"code","body":"throw \"nope\";"},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );

        let failure = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!({}))
            .await
            .unwrap_err();

        assert_eq!(failure.code, ErrorCode::FlowExecutionFailed);
        assert!(failure.message.contains("nope"));
        assert_eq!(failure.failed_state_id.as_deref(), Some("b"));
        assert_eq!(
            failure.execution_log,
            vec!["Executing state: a", "Executing state: b"]
        );
    }

    #[tokio::test]
    async fn missing_task_is_a_handler_failure() {
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"task","taskName":"ghost"},"onError":"fallback"},
                "fallback":{"handler":{"type":"code","body":"\"recovered\""}}}}"#,
        );

        let result = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!({}))
            .await
            .unwrap();

        assert_eq!(result.result, json!("recovered"));
        match &result.state_trace[0].outcome {
            crate::domain::flow::StateOutcome::Failed { error } => {
                assert_eq!(error, "Task 'ghost' not found")
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn task_prefers_explicit_input() {
        let tasks = InMemoryTaskRepository::new().with_task("echo", "input");
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"task","taskName":"echo","inputJson":{"fixed":1}}}}}"#,
        );

        let result = interpreter(tasks).run(&flow, json!({"ignored": true})).await.unwrap();
        assert_eq!(result.result, json!({"fixed": 1}));
    }

    #[tokio::test]
    async fn invalid_graph_is_rejected_before_running() {
        let flow = graph(r#"{"id":"f","states":{}}"#);
        let failure = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!({}))
            .await
            .unwrap_err();

        assert_eq!(failure.code, ErrorCode::ValidationFailed);
        assert!(failure.execution_log.is_empty());
    }

    #[tokio::test]
    async fn final_initial_state_returns_input() {
        let flow = graph(r#"{"id":"f","states":{"done":{"kind":"final"}}}"#);
        let result = interpreter(InMemoryTaskRepository::new())
            .run(&flow, json!({"x": 1}))
            .await
            .unwrap();

        assert_eq!(result.final_state_id, "done");
        assert_eq!(result.result, json!({"x": 1}));
        assert!(result.execution_log.is_empty());
    }

    #[tokio::test]
    async fn completed_background_task_reports_status() {
        let background = fixed(Some(BackgroundTaskState::Completed));
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"backgroundTask","taskName":"export"},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );

        let result = interpreter_with(InMemoryTaskRepository::new(), background.clone())
            .run(&flow, json!({}))
            .await
            .unwrap();

        assert_eq!(result.result["taskId"], "bg-1");
        assert_eq!(result.result["status"], "completed");
        assert_eq!(result.result["durationMs"], 7);
        assert_eq!(*background.spawned.lock().unwrap(), vec!["export"]);
    }

    #[tokio::test]
    async fn failed_background_task_is_a_handler_failure() {
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"backgroundTask","taskName":"export"},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );

        let failure = interpreter_with(
            InMemoryTaskRepository::new(),
            fixed(Some(BackgroundTaskState::Failed)),
        )
        .run(&flow, json!({}))
        .await
        .unwrap_err();

        assert_eq!(
            failure.message,
            "Background task 'export' ended with status failed: disk full"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_background_task_times_out() {
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"backgroundTask","taskName":"export","timeoutMs":250},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );

        let failure = interpreter_with(InMemoryTaskRepository::new(), fixed(None))
            .run(&flow, json!({}))
            .await
            .unwrap_err();

        assert_eq!(failure.message, "Background task 'export' timed out after 250ms");
        assert!(failure.duration_ms >= 250);
    }

    #[tokio::test]
    async fn timed_out_background_tasks_are_not_left_tracked() {
        let tasks = InMemoryTaskRepository::new().with_task("spin", "loop {}");
        let runner = runner();
        let background = Arc::new(LocalBackgroundTaskManager::new(
            runner.clone(),
            Arc::new(tasks.clone()),
        ));
        let interpreter = FlowInterpreter::new(
            runner,
            Arc::new(tasks),
            background.clone(),
            FlowInterpreterConfig::default(),
        );
        let flow = graph(
            r#"{"id":"f","states":{
                "s1":{"handler":{"type":"backgroundTask","taskName":"spin","timeoutMs":100},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );

        for _ in 0..3 {
            let failure = interpreter.run(&flow, json!({})).await.unwrap_err();
            assert!(failure.message.contains("timed out"));
        }

        assert_eq!(background.tracked(), 0);
    }

    #[tokio::test]
    async fn cycle_without_final_hits_step_limit() {
        let flow = graph(
            r#"{"id":"f","states":{
                "a":{"handler":{"type":"none"},"onDone":"b"},
                "b":{"handler":{"type":"none"},"onDone":"a"}}}"#,
        );
        let interpreter = FlowInterpreter::new(
            runner(),
            Arc::new(InMemoryTaskRepository::new()),
            fixed(None),
            FlowInterpreterConfig {
                max_steps: 10,
                ..FlowInterpreterConfig::default()
            },
        );

        let failure = interpreter.run(&flow, json!({})).await.unwrap_err();

        assert_eq!(failure.message, "step limit of 10 exceeded");
        assert_eq!(failure.execution_log.len(), 10);
    }

    /// Publisher double that records every event.
    #[derive(Default)]
    struct RecordingPublisher {
        events: Mutex<Vec<ProgressEvent>>,
    }

    #[async_trait]
    impl ProgressPublisher for RecordingPublisher {
        async fn publish_progress(&self, event: &ProgressEvent) -> usize {
            self.events.lock().unwrap().push(event.clone());
            1
        }
    }

    #[tokio::test]
    async fn progress_is_published_per_state_and_on_completion() {
        let publisher = Arc::new(RecordingPublisher::default());
        let flow = graph(
            r#"{"id":"report","states":{
                "a":{"handler":{"type":"none"},"onDone":"b"},
                "b":{"handler":{"type":"none"},"onDone":"end"},
                "end":{"kind":"final"}}}"#,
        );
        let run_id = RunId::new();

        interpreter(InMemoryTaskRepository::new())
            .with_progress(publisher.clone())
            .run_with_id(run_id, &flow, json!({}))
            .await
            .unwrap();

        let events = publisher.events.lock().unwrap();
        let stages: Vec<_> = events.iter().map(|e| e.progress.stage.as_str()).collect();
        assert_eq!(stages, vec!["state:a", "state:b", "completed"]);
        assert_eq!(events[0].progress.percentage, 50);
        assert_eq!(events[2].progress.percentage, 100);
        assert!(events.iter().all(|e| e.run_id == run_id && e.task_name == "report"));
    }

    fn chain_graph(len: usize, failing: Option<usize>, recover: bool) -> FlowGraph {
        let mut states = serde_json::Map::new();
        for i in 0..len {
            let handler = if Some(i) == failing {
                json!({"type": "code", "body": "throw \"x\";"})
            } else {
                json!({"type": "none"})
            };
            let mut state = json!({ "handler": handler, "onDone": format!("s{}", i + 1) });
            if recover {
                state["onError"] = json!(format!("s{}", i + 1));
            }
            states.insert(format!("s{}", i), state);
        }
        states.insert(format!("s{}", len), json!({"kind": "final"}));
        serde_json::from_value(json!({"id": "chain", "states": states})).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn runs_terminate_with_one_log_entry_per_attempt(
            len in 1usize..12,
            failing in proptest::option::of(0usize..12),
            recover in any::<bool>(),
        ) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
            let flow = chain_graph(len, failing.filter(|f| *f < len), recover);

            let outcome = rt.block_on(interpreter(InMemoryTaskRepository::new()).run(&flow, json!({})));

            match outcome {
                Ok(result) => {
                    prop_assert_eq!(result.execution_log.len(), result.state_trace.len());
                    prop_assert_eq!(result.execution_log.len(), len);
                    prop_assert_eq!(result.final_state_id, format!("s{}", len));
                }
                Err(failure) => {
                    prop_assert!(!recover);
                    prop_assert_eq!(failure.execution_log.len(), failure.state_trace.len());
                    prop_assert_eq!(failure.execution_log.len(), failing.unwrap() + 1);
                }
            }
        }
    }
}
