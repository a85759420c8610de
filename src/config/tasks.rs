//! Task source configuration

use serde::Deserialize;
use std::path::PathBuf;

use super::error::ValidationError;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TasksConfig {
    /// Directory of `<name>.rhai` task files; tasks are kept in memory when unset
    pub directory: Option<PathBuf>,
}

impl TasksConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.directory {
            Some(dir) if dir.as_os_str().is_empty() => Err(ValidationError::EmptyTaskDirectory),
            _ => Ok(()),
        }
    }
}
