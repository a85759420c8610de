//! Flow interpreter configuration

use serde::Deserialize;
use std::time::Duration;

use crate::application::FlowInterpreterConfig;

use super::error::ValidationError;

#[derive(Debug, Clone, Deserialize)]
pub struct FlowConfig {
    /// Handler attempts allowed per run
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,

    /// Deadline for background task states without their own `timeoutMs`
    #[serde(default = "default_background_timeout_ms")]
    pub default_background_timeout_ms: u64,
}

impl FlowConfig {
    pub fn interpreter_config(&self) -> FlowInterpreterConfig {
        FlowInterpreterConfig {
            max_steps: self.max_steps,
            default_background_timeout: Duration::from_millis(self.default_background_timeout_ms),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_steps == 0 {
            return Err(ValidationError::InvalidStepLimit);
        }
        if self.default_background_timeout_ms == 0 {
            return Err(ValidationError::InvalidBackgroundTimeout);
        }
        Ok(())
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            max_steps: default_max_steps(),
            default_background_timeout_ms: default_background_timeout_ms(),
        }
    }
}

fn default_max_steps() -> usize {
    1_000
}

fn default_background_timeout_ms() -> u64 {
    30_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flow_defaults_match_interpreter() {
        let config = FlowConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interpreter_config(), FlowInterpreterConfig::default());
    }

    #[test]
    fn test_zero_step_limit_fails() {
        let config = FlowConfig {
            max_steps: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ValidationError::InvalidStepLimit));
    }
}
