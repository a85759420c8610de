//! Background Task Adapters
//!
//! - **LocalBackgroundTaskManager** - runs stored tasks on the local runtime

mod local_manager;

pub use local_manager::LocalBackgroundTaskManager;
