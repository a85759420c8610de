//! Flow module - declarative state-machine graphs and per-run state.
//!
//! A [`FlowGraph`] names a set of states, each with a handler and
//! success/error edges. The interpreter in the application layer walks
//! the graph; this module only owns the shapes and their validation.

mod graph;
mod run;

pub use graph::{FlowGraph, StateDef, StateHandler, StateKind};
pub use run::{
    ExecutionContext, FlowRunFailure, FlowRunResult, StateOutcome, StateTrace,
};
