//! ProgressPublisher port - Outbound progress notifications.
//!
//! The interpreter reports progress through this port without knowing who
//! (if anyone) is listening. Publishing is best-effort and never fails the
//! caller.

use async_trait::async_trait;

use crate::domain::realtime::ProgressEvent;

/// Port for publishing progress events.
#[async_trait]
pub trait ProgressPublisher: Send + Sync {
    /// Deliver `event` to whoever follows its run. Returns the number of
    /// connections it reached.
    async fn publish_progress(&self, event: &ProgressEvent) -> usize;
}
