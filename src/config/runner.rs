//! Task runner and sandbox configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::adapters::sandbox::SandboxLimits;
use crate::application::TaskRunnerConfig;

use super::error::ValidationError;

/// Which execution host runs task code
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostKind {
    /// One child process per invocation
    #[default]
    Process,
    /// One engine thread per invocation inside the server
    Embedded,
}

/// Task runner configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerConfig {
    #[serde(default)]
    pub host: HostKind,

    /// Binary launched in `task-host` mode; defaults to the running executable
    pub host_binary: Option<PathBuf>,

    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,

    #[serde(default = "max_timeout_ms")]
    pub max_timeout_ms: u64,

    /// Operation budget per invocation (0 = deadline only)
    #[serde(default)]
    pub max_operations: u64,

    #[serde(default = "default_max_call_levels")]
    pub max_call_levels: usize,

    #[serde(default = "default_max_string_size")]
    pub max_string_size: usize,

    #[serde(default = "default_max_collection_size")]
    pub max_collection_size: usize,
}

impl RunnerConfig {
    pub fn task_runner_config(&self) -> TaskRunnerConfig {
        TaskRunnerConfig {
            default_timeout: Duration::from_millis(self.default_timeout_ms),
            max_timeout: Duration::from_millis(self.max_timeout_ms),
        }
    }

    pub fn sandbox_limits(&self) -> SandboxLimits {
        SandboxLimits {
            max_operations: self.max_operations,
            max_call_levels: self.max_call_levels,
            max_string_size: self.max_string_size,
            max_array_size: self.max_collection_size,
            max_map_size: self.max_collection_size,
            ..SandboxLimits::default()
        }
    }

    /// Validate runner configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.default_timeout_ms == 0 || self.default_timeout_ms > self.max_timeout_ms {
            return Err(ValidationError::InvalidTaskTimeout);
        }
        if self.max_call_levels == 0 || self.max_call_levels > 256 {
            return Err(ValidationError::InvalidCallDepth);
        }
        Ok(())
    }
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            host: HostKind::default(),
            host_binary: None,
            default_timeout_ms: default_timeout_ms(),
            max_timeout_ms: max_timeout_ms(),
            max_operations: 0,
            max_call_levels: default_max_call_levels(),
            max_string_size: default_max_string_size(),
            max_collection_size: default_max_collection_size(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn max_timeout_ms() -> u64 {
    60_000
}

fn default_max_call_levels() -> usize {
    SandboxLimits::default().max_call_levels
}

fn default_max_string_size() -> usize {
    SandboxLimits::default().max_string_size
}

fn default_max_collection_size() -> usize {
    SandboxLimits::default().max_array_size
}
