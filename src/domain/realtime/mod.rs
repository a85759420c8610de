//! Realtime module - subscription addressing and progress payloads.

mod progress;
mod topology;

pub use progress::{ProgressEvent, ProgressUpdate};
pub use topology::Topology;
