//! Restricted Rhai engine used by every execution host.
//!
//! Task code sees a single binding, `input`, and its last expression is the
//! result. The engine is built with no module resolver, silenced
//! `print`/`debug`, no `eval`, and bounded recursion and data sizes. Rhai
//! itself has no filesystem, network or process primitives.

use rhai::{Dynamic, Engine, Scope};
use serde_json::Value;

use crate::ports::{HostErrorBody, HostResponse};

/// Resource bounds applied to each engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SandboxLimits {
    /// Maximum operations per invocation; 0 leaves only the wall-clock deadline.
    pub max_operations: u64,
    pub max_call_levels: usize,
    pub max_expr_depth: usize,
    pub max_string_size: usize,
    pub max_array_size: usize,
    pub max_map_size: usize,
}

impl Default for SandboxLimits {
    fn default() -> Self {
        Self {
            max_operations: 0,
            max_call_levels: 32,
            max_expr_depth: 64,
            max_string_size: 1 << 20,
            max_array_size: 100_000,
            max_map_size: 100_000,
        }
    }
}

/// Build a fresh engine with the sandbox restrictions applied.
pub fn build_engine(limits: &SandboxLimits) -> Engine {
    let mut engine = Engine::new();

    engine.set_module_resolver(rhai::module_resolvers::DummyModuleResolver::new());
    engine.disable_symbol("eval");
    engine.on_print(|_| {});
    engine.on_debug(|_, _, _| {});

    engine.set_max_call_levels(limits.max_call_levels);
    engine.set_max_expr_depths(limits.max_expr_depth, limits.max_expr_depth);
    engine.set_max_string_size(limits.max_string_size);
    engine.set_max_array_size(limits.max_array_size);
    engine.set_max_map_size(limits.max_map_size);
    if limits.max_operations > 0 {
        engine.set_max_operations(limits.max_operations);
    }

    engine
}

/// Evaluate `code` with `input` bound and turn the outcome into a response.
pub fn evaluate(engine: &Engine, code: &str, input: &Value) -> HostResponse {
    let input = match rhai::serde::to_dynamic(input) {
        Ok(value) => value,
        Err(e) => return error_response(format!("Input is not representable: {}", e), None),
    };

    let mut scope = Scope::new();
    scope.push_dynamic("input", input);

    match engine.eval_with_scope::<Dynamic>(&mut scope, code) {
        Ok(value) => match rhai::serde::from_dynamic::<Value>(&value) {
            Ok(result) => HostResponse::Success { result },
            Err(e) => error_response(format!("Result is not serializable: {}", e), None),
        },
        Err(err) => {
            let position = err.position();
            let trace = (!position.is_none()).then(|| format!("at {}", position));
            error_response(err.to_string(), trace)
        }
    }
}

fn error_response(message: String, trace: Option<String>) -> HostResponse {
    HostResponse::Error {
        error: HostErrorBody { message, trace },
    }
}
