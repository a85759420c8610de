//! Task module - one sandboxed invocation and its classified outcome.

mod invocation;

pub use invocation::{TaskError, TaskInvocation, TaskOutcome};
