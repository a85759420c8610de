//! WebSocket-backed [`RealtimeConnection`].
//!
//! The socket itself is owned by the connection's writer task; this handle
//! only feeds that task through a bounded queue. A full queue drops the
//! message for this connection rather than slowing the broadcaster down.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;

use crate::domain::foundation::ConnectionId;
use crate::ports::{ConnectionSendError, RealtimeConnection};

pub struct WsConnection {
    id: ConnectionId,
    outbound: mpsc::Sender<String>,
    closed: AtomicBool,
}

impl WsConnection {
    /// Create a handle and the receiving end its writer task drains.
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<String>) {
        let (outbound, rx) = mpsc::channel(buffer.max(1));
        (
            Self {
                id: ConnectionId::new(),
                outbound,
                closed: AtomicBool::new(false),
            },
            rx,
        )
    }

    /// Mark the connection closed. Later sends fail with `Closed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl RealtimeConnection for WsConnection {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && !self.outbound.is_closed()
    }

    fn send(&self, text: &str) -> Result<(), ConnectionSendError> {
        if !self.is_open() {
            return Err(ConnectionSendError::Closed);
        }
        self.outbound
            .try_send(text.to_string())
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    ConnectionSendError::Transport("outbound queue full".to_string())
                }
                mpsc::error::TrySendError::Closed(_) => ConnectionSendError::Closed,
            })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn queued_text_reaches_writer() {
        let (conn, mut rx) = WsConnection::channel(4);
        conn.send("hello").unwrap();
        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
    }

    #[test]
    fn closed_handle_rejects_sends() {
        let (conn, _rx) = WsConnection::channel(4);
        conn.close();
        assert!(!conn.is_open());
        assert!(matches!(conn.send("x"), Err(ConnectionSendError::Closed)));
    }

    #[test]
    fn dropped_writer_closes_connection() {
        let (conn, rx) = WsConnection::channel(4);
        drop(rx);
        assert!(!conn.is_open());
    }

    #[test]
    fn full_queue_is_a_transport_error() {
        let (conn, _rx) = WsConnection::channel(1);
        conn.send("first").unwrap();
        assert!(matches!(
            conn.send("second"),
            Err(ConnectionSendError::Transport(_))
        ));
    }
}
