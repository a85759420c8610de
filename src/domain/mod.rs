//! Domain layer containing the core types and rules.
//!
//! # Module Organization
//!
//! - `foundation` - Shared primitives (IDs, timestamps, errors)
//! - `flow` - Flow graphs, per-run context and run results
//! - `task` - Task invocations and classified outcomes
//! - `realtime` - Subscription topologies and progress events

pub mod flow;
pub mod foundation;
pub mod realtime;
pub mod task;
