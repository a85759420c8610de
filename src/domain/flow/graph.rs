//! Flow graph definition and structural validation.
//!
//! Graphs arrive as JSON (HTTP) or YAML (files). Handler kinds are a
//! closed, internally tagged enum so an unknown `type` fails at
//! deserialization, before any state runs.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::ValidationError;

/// A declarative state machine describing a multi-step task orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowGraph {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_state_id: Option<String>,

    /// States in declaration order.
    pub states: IndexMap<String, StateDef>,
}

/// Role of a state within the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateKind {
    Initial,
    #[default]
    Normal,
    Final,
}

/// One named step with a handler and transition edges.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateDef {
    #[serde(default)]
    pub kind: StateKind,

    #[serde(default)]
    pub handler: StateHandler,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_done: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<String>,
}

/// What a state does when it is entered.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StateHandler {
    /// Long-running work delegated to the background task manager.
    #[serde(rename_all = "camelCase")]
    BackgroundTask {
        task_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timeout_ms: Option<u64>,
    },

    /// A stored task, looked up by name and run in the sandbox.
    #[serde(rename_all = "camelCase")]
    Task {
        task_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        input_json: Option<Value>,
    },

    /// Inline script run in the sandbox against the running result.
    Code { body: String },

    /// Pass the running result through unchanged.
    #[default]
    None,
}

impl StateHandler {
    /// Short name used in logs and traces.
    pub fn kind_name(&self) -> &'static str {
        match self {
            StateHandler::BackgroundTask { .. } => "backgroundTask",
            StateHandler::Task { .. } => "task",
            StateHandler::Code { .. } => "code",
            StateHandler::None => "none",
        }
    }
}

impl StateDef {
    /// Returns true if entering this state ends the run.
    pub fn is_final(&self) -> bool {
        self.kind == StateKind::Final
    }
}

impl FlowGraph {
    /// Parse a graph from JSON and validate it.
    pub fn from_json(json: &str) -> Result<Self, ValidationError> {
        let graph: FlowGraph = serde_json::from_str(json)
            .map_err(|e| ValidationError::invalid_format("graph", e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Parse a graph from YAML and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, ValidationError> {
        let graph: FlowGraph = serde_yaml::from_str(yaml)
            .map_err(|e| ValidationError::invalid_format("graph", e.to_string()))?;
        graph.validate()?;
        Ok(graph)
    }

    /// Look up a state by id.
    pub fn state(&self, id: &str) -> Option<&StateDef> {
        self.states.get(id)
    }

    /// Check the graph's structure.
    ///
    /// - at least one state
    /// - every `onDone` / `onError` and `initialStateId` resolves
    /// - at most one state tagged `initial`
    /// - task names and code bodies are non-empty
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.states.is_empty() {
            return Err(ValidationError::empty_field("states"));
        }

        if let Some(initial) = &self.initial_state_id {
            if !self.states.contains_key(initial) {
                return Err(ValidationError::unknown_reference("initialStateId", initial));
            }
        }

        let tagged_initial = self
            .states
            .values()
            .filter(|s| s.kind == StateKind::Initial)
            .count();
        if tagged_initial > 1 {
            return Err(ValidationError::invalid_format(
                "states",
                format!("{} states are tagged initial, expected at most one", tagged_initial),
            ));
        }

        for (id, state) in &self.states {
            for (edge, target) in [("onDone", &state.on_done), ("onError", &state.on_error)] {
                if let Some(target) = target {
                    if !self.states.contains_key(target) {
                        return Err(ValidationError::unknown_reference(
                            format!("states.{}.{}", id, edge),
                            target,
                        ));
                    }
                }
            }

            match &state.handler {
                StateHandler::BackgroundTask { task_name, .. }
                | StateHandler::Task { task_name, .. }
                    if task_name.trim().is_empty() =>
                {
                    return Err(ValidationError::empty_field(format!(
                        "states.{}.handler.taskName",
                        id
                    )));
                }
                StateHandler::Code { body } if body.trim().is_empty() => {
                    return Err(ValidationError::empty_field(format!(
                        "states.{}.handler.body",
                        id
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Resolve where a run starts.
    ///
    /// The state tagged `initial` wins, then `initialStateId`, then the
    /// first declared state.
    pub fn resolve_initial_state(&self) -> Result<&str, ValidationError> {
        if let Some((id, _)) = self
            .states
            .iter()
            .find(|(_, s)| s.kind == StateKind::Initial)
        {
            return Ok(id);
        }

        if let Some(initial) = &self.initial_state_id {
            return self
                .states
                .get_key_value(initial)
                .map(|(id, _)| id.as_str())
                .ok_or_else(|| ValidationError::unknown_reference("initialStateId", initial));
        }

        self.states
            .keys()
            .next()
            .map(String::as_str)
            .ok_or_else(|| ValidationError::empty_field("states"))
    }
}
