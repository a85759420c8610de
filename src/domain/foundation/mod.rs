//! Foundation module - Shared domain primitives.
//!
//! Contains identifiers, timestamps and error types that form the
//! vocabulary shared by flows, tasks and realtime delivery.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::{BackgroundTaskId, ConnectionId, RunId};
pub use timestamp::Timestamp;
