//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the core and the outside world. Adapters implement these ports.
//!
//! ## Execution Ports
//!
//! - `TaskRepository` - Source lookup for named tasks
//! - `BackgroundTaskManager` - Spawn and await long-running tasks
//! - `ExecutionHost` - Disposable isolated hosts for task code
//!
//! ## Realtime Ports
//!
//! - `RealtimeConnection` - A client connection messages are pushed to
//! - `ProgressPublisher` - Outbound progress notifications

mod background_task;
mod execution_host;
mod progress_publisher;
mod realtime_connection;
mod task_repository;

pub use background_task::{
    BackgroundTaskError, BackgroundTaskHandle, BackgroundTaskManager, BackgroundTaskState,
    BackgroundTaskStatus, SpawnOptions,
};
pub use execution_host::{
    ExecutionHost, HostErrorBody, HostEvent, HostLaunchError, HostRequest, HostResponse,
    HostSession,
};
pub use progress_publisher::ProgressPublisher;
pub use realtime_connection::{ConnectionSendError, RealtimeConnection};
pub use task_repository::{RepositoryError, TaskRepository};
