//! RealtimeConnection port - A client connection events can be pushed to.
//!
//! The broadcaster and the admission controller only ever see connections
//! through this trait. Sends are synchronous and non-blocking: an adapter
//! queues the text for its own writer and reports failure immediately.

use thiserror::Error;

use crate::domain::foundation::ConnectionId;

/// Errors that can occur while pushing to a connection.
#[derive(Debug, Clone, Error)]
pub enum ConnectionSendError {
    #[error("Connection is closed")]
    Closed,

    #[error("Send failed: {0}")]
    Transport(String),
}

/// Handle to one realtime client connection.
pub trait RealtimeConnection: Send + Sync {
    fn id(&self) -> ConnectionId;

    /// Returns true if the connection can currently accept messages.
    fn is_open(&self) -> bool;

    /// Queue a text frame for delivery.
    fn send(&self, text: &str) -> Result<(), ConnectionSendError>;
}
