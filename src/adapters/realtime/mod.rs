//! Realtime adapters: progress fanout to WebSocket clients.
//!
//! # Architecture
//!
//! ```text
//!   GET /api/realtime ──▶ AdmissionController ──(slot)──▶ upgrade
//!                                                          │
//!                                                          ▼
//!   FlowInterpreter ──ProgressPublisher──▶ Broadcaster ──▶ WsConnection ──▶ socket
//!                                          Single / Grouped / Set
//! ```
//!
//! # Components
//!
//! - [`broadcaster`] - Subscriber registry with three topologies
//! - [`admission`] - Per-address connection limits with periodic sweep
//! - [`connection`] - WebSocket-backed connection handle
//! - [`messages`] - Realtime message protocol types
//! - [`handler`] - Axum WebSocket upgrade handler

pub mod admission;
pub mod broadcaster;
pub mod connection;
pub mod handler;
pub mod messages;

pub use admission::{AdmissionController, AdmissionTicket};
pub use broadcaster::{BroadcastError, Broadcaster, DeliveryReport};
pub use connection::WsConnection;
pub use handler::{realtime_handler, realtime_routes, RealtimeQuery, RealtimeState};
pub use messages::{ClientMessage, ServerMessage};
