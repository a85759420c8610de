//! Application layer - orchestration over the ports.
//!
//! [`TaskRunner`] turns one task invocation into exactly one outcome;
//! [`FlowInterpreter`] drives a flow graph through the runner, the task
//! repository and the background task manager.

pub mod flow_interpreter;
pub mod task_runner;

pub use flow_interpreter::{FlowInterpreter, FlowInterpreterConfig, HandlerError};
pub use task_runner::{TaskRunner, TaskRunnerConfig};
