//! Local Background Task Manager
//!
//! Runs stored tasks as detached tokio tasks through the [`TaskRunner`].
//! Each spawned task publishes its status on a watch channel; waiters
//! observe the channel until the status is terminal.
//!
//! Entries are dropped when a waiter returns or is cancelled, so a caller
//! that gives up on a task does not leave it tracked.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::application::TaskRunner;
use crate::domain::foundation::BackgroundTaskId;
use crate::ports::{
    BackgroundTaskError, BackgroundTaskHandle, BackgroundTaskManager, BackgroundTaskState,
    BackgroundTaskStatus, SpawnOptions, TaskRepository,
};

pub struct LocalBackgroundTaskManager {
    runner: Arc<TaskRunner>,
    tasks: Arc<dyn TaskRepository>,
    running: DashMap<BackgroundTaskId, watch::Receiver<BackgroundTaskStatus>>,
}

impl LocalBackgroundTaskManager {
    pub fn new(runner: Arc<TaskRunner>, tasks: Arc<dyn TaskRepository>) -> Self {
        Self {
            runner,
            tasks,
            running: DashMap::new(),
        }
    }

    /// Latest known status of a task that has not been waited on yet.
    pub fn status(&self, id: &BackgroundTaskId) -> Option<BackgroundTaskStatus> {
        self.running.get(id).map(|rx| rx.borrow().clone())
    }

    /// Number of tasks not yet collected by a waiter.
    pub fn tracked(&self) -> usize {
        self.running.len()
    }
}

/// Removes a task's entry when its waiter finishes or is dropped.
struct Untrack<'a> {
    running: &'a DashMap<BackgroundTaskId, watch::Receiver<BackgroundTaskStatus>>,
    id: &'a BackgroundTaskId,
}

impl Drop for Untrack<'_> {
    fn drop(&mut self) {
        self.running.remove(self.id);
    }
}

fn status(state: BackgroundTaskState, started: Instant) -> BackgroundTaskStatus {
    BackgroundTaskStatus {
        status: state,
        duration_ms: started.elapsed().as_millis() as u64,
        error: None,
        output: None,
    }
}

#[async_trait]
impl BackgroundTaskManager for LocalBackgroundTaskManager {
    async fn spawn(
        &self,
        task_name: &str,
        args: Value,
        options: SpawnOptions,
    ) -> Result<BackgroundTaskHandle, BackgroundTaskError> {
        let code = self
            .tasks
            .get_code(task_name)
            .await
            .map_err(|e| BackgroundTaskError::SpawnFailed(e.to_string()))?
            .ok_or_else(|| BackgroundTaskError::UnknownTask(task_name.to_string()))?;

        let id = BackgroundTaskId::generate();
        let started = Instant::now();
        let (tx, rx) = watch::channel(status(BackgroundTaskState::Running, started));
        self.running.insert(id.clone(), rx);

        tracing::debug!(
            task_id = %id,
            task_name,
            label = options.label.as_deref().unwrap_or(""),
            "Spawned background task"
        );

        let runner = self.runner.clone();
        let task_id = id.clone();
        tokio::spawn(async move {
            let outcome = runner.execute(&code, args, options.timeout).await;
            let mut finished = status(BackgroundTaskState::Completed, started);
            match outcome {
                Ok(output) => finished.output = Some(output),
                Err(e) => {
                    finished.status = BackgroundTaskState::Failed;
                    finished.error = Some(e.to_string());
                }
            }
            tracing::debug!(task_id = %task_id, status = %finished.status, "Background task finished");
            // No receivers left means nobody is interested anymore.
            let _ = tx.send(finished);
        });

        Ok(BackgroundTaskHandle { id })
    }

    async fn wait_for(
        &self,
        id: &BackgroundTaskId,
    ) -> Result<BackgroundTaskStatus, BackgroundTaskError> {
        let mut rx = self
            .running
            .get(id)
            .map(|rx| rx.value().clone())
            .ok_or_else(|| BackgroundTaskError::UnknownId(id.clone()))?;
        let _untrack = Untrack {
            running: &self.running,
            id,
        };

        let observed = rx
            .wait_for(|s| s.status.is_terminal())
            .await
            .map(|status| status.clone());
        let finished = match observed {
            Ok(status) => status,
            // Sender dropped without a terminal status: the task panicked.
            Err(_) => BackgroundTaskStatus {
                status: BackgroundTaskState::Failed,
                duration_ms: rx.borrow().duration_ms,
                error: Some("background task aborted".to_string()),
                output: None,
            },
        };

        Ok(finished)
    }
}
