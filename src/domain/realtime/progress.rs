//! Progress events published while runs and tasks execute.

use serde::Serialize;
use serde_json::Value;

use crate::domain::foundation::{RunId, Timestamp};

/// Progress notification sent to realtime clients.
///
/// Serializes as
/// `{type:"progress", runId, taskName, progress:{stage, percentage, details, timestamp}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub run_id: RunId,
    pub task_name: String,
    pub progress: ProgressUpdate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub stage: String,
    pub percentage: u8,
    pub details: Value,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ProgressEvent {
    pub fn new(
        run_id: RunId,
        task_name: impl Into<String>,
        stage: impl Into<String>,
        percentage: u8,
        details: Value,
    ) -> Self {
        Self {
            event_type: "progress",
            run_id,
            task_name: task_name.into(),
            progress: ProgressUpdate {
                stage: stage.into(),
                percentage: percentage.min(100),
                details,
                timestamp: Timestamp::now().as_unix_millis(),
            },
        }
    }

    /// Grouped-topology key that subscribers of this run listen on.
    pub fn channel_key(&self) -> String {
        self.run_id.to_string()
    }
}
