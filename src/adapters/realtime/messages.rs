//! Realtime message protocol.
//!
//! - Server → Client: connection status, subscription acks, errors, pongs.
//!   Published payloads (e.g. progress events) are sent as-is.
//! - Client → Server: pings and subscription changes.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{ConnectionId, ErrorCode, Timestamp};
use crate::domain::realtime::Topology;

// ============================================
// Server → Client Messages
// ============================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection accepted and initial subscription registered.
    Connected(ConnectedMessage),

    Subscribed(SubscriptionMessage),

    Unsubscribed(SubscriptionMessage),

    Error(ErrorMessage),

    /// Heartbeat response.
    Pong(PongMessage),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedMessage {
    pub connection_id: String,
    pub topology: Topology,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionMessage {
    pub topology: Topology,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorMessage {
    pub code: ErrorCode,
    pub message: String,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PongMessage {
    pub timestamp: String,
}

impl ServerMessage {
    pub fn connected(connection_id: ConnectionId, topology: Topology, key: Option<String>) -> Self {
        ServerMessage::Connected(ConnectedMessage {
            connection_id: connection_id.to_string(),
            topology,
            key,
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            code,
            message: message.into(),
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn pong() -> Self {
        ServerMessage::Pong(PongMessage {
            timestamp: Timestamp::now().to_rfc3339(),
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// ============================================
// Client → Server Messages
// ============================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Heartbeat request.
    Ping,

    /// Add a subscription on this connection.
    Subscribe {
        topology: Topology,
        #[serde(default)]
        key: Option<String>,
    },

    /// Drop a subscription on this connection.
    Unsubscribe {
        topology: Topology,
        #[serde(default)]
        key: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn connected_message_shape() {
        let id = ConnectionId::new();
        let json: Value = serde_json::from_str(
            &ServerMessage::connected(id, Topology::Grouped, Some("run-1".into()))
                .to_json()
                .unwrap(),
        )
        .unwrap();

        assert_eq!(json["type"], "connected");
        assert_eq!(json["connectionId"], id.to_string());
        assert_eq!(json["topology"], "grouped");
        assert_eq!(json["key"], "run-1");
    }

    #[test]
    fn error_message_carries_code() {
        let json: Value = serde_json::from_str(
            &ServerMessage::error(ErrorCode::ValidationFailed, "bad")
                .to_json()
                .unwrap(),
        )
        .unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "VALIDATION_FAILED");
    }

    #[test]
    fn client_messages_parse() {
        let ping: ClientMessage = serde_json::from_str(r#"{"type":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);

        let sub: ClientMessage =
            serde_json::from_str(r#"{"type":"subscribe","topology":"grouped","key":"r1"}"#).unwrap();
        assert_eq!(
            sub,
            ClientMessage::Subscribe {
                topology: Topology::Grouped,
                key: Some("r1".into())
            }
        );

        let unsub: ClientMessage =
            serde_json::from_str(r#"{"type":"unsubscribe","topology":"set"}"#).unwrap();
        assert_eq!(
            unsub,
            ClientMessage::Unsubscribe {
                topology: Topology::Set,
                key: None
            }
        );
    }

    #[test]
    fn unknown_client_message_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"request.state"}"#).is_err());
    }
}
