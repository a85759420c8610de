//! Task sandbox adapters.
//!
//! - [`ProcessHost`] runs each invocation in a child process (default)
//! - [`EmbeddedHost`] runs each invocation on an isolated engine thread
//!
//! Both evaluate with the same restricted engine from [`script_engine`].

mod embedded_host;
mod host_main;
mod process_host;
pub mod script_engine;

pub use embedded_host::EmbeddedHost;
pub use host_main::{run_task_host, serve_one};
pub use process_host::{ProcessHost, TASK_HOST_SUBCOMMAND};
pub use script_engine::{build_engine, evaluate, SandboxLimits};
