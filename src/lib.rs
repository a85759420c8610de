//! Flowdesk - Flow orchestration with sandboxed task execution
//!
//! Flows are state graphs whose states run short tasks in an isolated
//! sandbox host, delegate long work to background tasks, and report
//! progress to WebSocket subscribers.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
