//! TaskRepository port - Source code lookup for named tasks.
//!
//! Flows refer to stored tasks by name. The interpreter asks this port for
//! the source and hands it to the task runner; where the source lives
//! (memory, a directory of scripts, a database) is an adapter concern.

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur while reading task sources.
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    /// Backing store could not be read.
    #[error("Task storage error: {0}")]
    Storage(String),

    /// Task name is not usable as a lookup key.
    #[error("Invalid task name: {0}")]
    InvalidName(String),
}

/// Port for looking up task source code by name.
///
/// # Example
///
/// ```ignore
/// match repository.get_code("double").await? {
///     Some(code) => runner.execute(&code, input, timeout).await,
///     None => Err(not_found("double")),
/// }
/// ```
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Returns the source for `task_name`, or `None` if no such task exists.
    async fn get_code(&self, task_name: &str) -> Result<Option<String>, RepositoryError>;

    /// Names of every task this repository can serve.
    async fn list(&self) -> Result<Vec<String>, RepositoryError>;
}
