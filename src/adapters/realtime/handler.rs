//! WebSocket upgrade handler for realtime subscriptions.
//!
//! Connection lifecycle:
//! 1. Validate the requested topology and key
//! 2. Reserve a slot with the admission controller (refuse with 429 if full)
//! 3. Upgrade and register with the broadcaster
//! 4. Forward queued messages to the socket, handle client messages
//! 5. On close or error: deregister everywhere and release the slot

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        ConnectInfo, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use crate::adapters::http::dto::ErrorResponse;
use crate::domain::foundation::ErrorCode;
use crate::domain::realtime::Topology;
use crate::ports::RealtimeConnection;

use super::admission::AdmissionController;
use super::broadcaster::Broadcaster;
use super::connection::WsConnection;
use super::messages::{ClientMessage, ServerMessage, SubscriptionMessage};

/// State required for realtime handling.
#[derive(Clone)]
pub struct RealtimeState {
    pub broadcaster: Arc<Broadcaster>,
    pub admission: Arc<AdmissionController>,
    /// Per-connection outbound queue length.
    pub send_buffer: usize,
}

impl RealtimeState {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        admission: Arc<AdmissionController>,
        send_buffer: usize,
    ) -> Self {
        Self {
            broadcaster,
            admission,
            send_buffer,
        }
    }
}

/// Query string of the upgrade request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RealtimeQuery {
    pub topology: Option<Topology>,
    pub key: Option<String>,
}

/// A connection that passed validation and holds an admission slot.
struct Admitted {
    address: IpAddr,
    topology: Topology,
    key: Option<String>,
    connection: Arc<WsConnection>,
    outbound: mpsc::Receiver<String>,
}

type Rejection = (StatusCode, ErrorResponse);

/// Validate the request and reserve an admission slot for it.
fn admit(state: &RealtimeState, address: IpAddr, query: RealtimeQuery) -> Result<Admitted, Rejection> {
    let topology = query.topology.unwrap_or(Topology::Set);
    let key = query.key.filter(|k| !k.trim().is_empty());
    if topology.is_keyed() && key.is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            ErrorResponse::bad_request(format!("Topology '{}' requires a key", topology)),
        ));
    }

    let ticket = state.admission.check_limit(address);
    let refused = || {
        (
            StatusCode::TOO_MANY_REQUESTS,
            ErrorResponse::new(
                ErrorCode::ConnectionLimitExceeded,
                format!(
                    "Too many realtime connections from {} (limit {})",
                    address,
                    state.admission.max_per_address()
                ),
            ),
        )
    };
    if !ticket.is_allowed() {
        return Err(refused());
    }

    let (connection, outbound) = WsConnection::channel(state.send_buffer);
    let connection = Arc::new(connection);
    if !ticket.add(connection.clone()) {
        return Err(refused());
    }

    Ok(Admitted {
        address,
        topology,
        key,
        connection,
        outbound,
    })
}

/// Handle realtime upgrade requests.
///
/// Route: `GET /api/realtime?topology=<single|grouped|set>&key=<key>`
pub async fn realtime_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(query): Query<RealtimeQuery>,
    State(state): State<RealtimeState>,
) -> Response {
    match admit(&state, peer.ip(), query) {
        Ok(admitted) => ws.on_upgrade(move |socket| handle_socket(socket, state, admitted)),
        Err((status, body)) => (status, Json(body)).into_response(),
    }
}

/// Run an established connection until either side closes.
async fn handle_socket(socket: WebSocket, state: RealtimeState, admitted: Admitted) {
    let Admitted {
        address,
        topology,
        key,
        connection,
        mut outbound,
    } = admitted;
    let connection_id = connection.id();
    let (mut sender, mut receiver) = socket.split();

    let subscribed = state
        .broadcaster
        .subscribe(topology, key.as_deref(), connection.clone())
        .await;
    match subscribed {
        Ok(()) => reply(&connection, &ServerMessage::connected(connection_id, topology, key)),
        Err(e) => reply(
            &connection,
            &ServerMessage::error(ErrorCode::ValidationFailed, e.to_string()),
        ),
    }

    tracing::info!(%connection_id, %address, %topology, "Realtime connection opened");

    // Writer: drain the outbound queue into the socket.
    let mut send_task = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if let Err(e) = sender.send(Message::Text(text)).await {
                tracing::debug!(%connection_id, "Send error, closing connection: {}", e);
                break;
            }
        }
        let _ = sender.close().await;
    });

    // Reader: handle client messages until close.
    let broadcaster = state.broadcaster.clone();
    let reader_connection = connection.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(result) = receiver.next().await {
            match result {
                Ok(Message::Text(text)) => {
                    handle_client_message(&broadcaster, &reader_connection, &text).await
                }
                Ok(Message::Binary(_)) => {
                    tracing::warn!(%connection_id, "Received unsupported binary message");
                }
                Ok(Message::Close(_)) => {
                    tracing::debug!(%connection_id, "Client sent close frame");
                    break;
                }
                // Protocol pings are answered by axum
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {}
                Err(e) => {
                    tracing::debug!(%connection_id, "Receive error: {}", e);
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    connection.close();
    state.broadcaster.deregister(connection_id).await;
    state.admission.release(address, connection_id);
    tracing::info!(%connection_id, %address, "Realtime connection closed");
}

async fn handle_client_message(broadcaster: &Broadcaster, connection: &Arc<WsConnection>, text: &str) {
    let message = match serde_json::from_str::<ClientMessage>(text) {
        Ok(message) => message,
        Err(e) => {
            reply(
                connection,
                &ServerMessage::error(ErrorCode::ValidationFailed, format!("Unrecognized message: {}", e)),
            );
            return;
        }
    };

    let result = match message {
        ClientMessage::Ping => Ok(ServerMessage::pong()),
        ClientMessage::Subscribe { topology, key } => {
            let outcome = broadcaster
                .subscribe(topology, key.as_deref(), connection.clone())
                .await;
            outcome.map(|()| ServerMessage::Subscribed(SubscriptionMessage { topology, key }))
        }
        ClientMessage::Unsubscribe { topology, key } => {
            let outcome = broadcaster
                .unsubscribe(topology, key.as_deref(), connection.id())
                .await;
            outcome.map(|_| ServerMessage::Unsubscribed(SubscriptionMessage { topology, key }))
        }
    };

    match result {
        Ok(response) => reply(connection, &response),
        Err(e) => reply(
            connection,
            &ServerMessage::error(ErrorCode::ValidationFailed, e.to_string()),
        ),
    }
}

/// Queue a protocol message for this connection only.
fn reply(connection: &WsConnection, message: &ServerMessage) {
    let sent = message
        .to_json()
        .map_err(|e| e.to_string())
        .and_then(|json| connection.send(&json).map_err(|e| e.to_string()));
    if let Err(e) = sent {
        tracing::debug!(connection_id = %connection.id(), error = %e, "Failed to queue reply");
    }
}

/// Create the router for the realtime endpoint.
///
/// The server must be started with
/// `into_make_service_with_connect_info::<SocketAddr>()`.
pub fn realtime_routes(state: RealtimeState) -> Router {
    Router::new()
        .route("/api/realtime", get(realtime_handler))
        .with_state(state)
}
