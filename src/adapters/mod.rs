//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `sandbox` - Execution hosts (child process, embedded thread)
//! - `repository` - Task code storage (filesystem, in-memory)
//! - `background` - Background task manager on the local runtime
//! - `realtime` - WebSocket broadcaster and connection admission
//! - `http` - REST API surface

pub mod background;
pub mod http;
pub mod realtime;
pub mod repository;
pub mod sandbox;
