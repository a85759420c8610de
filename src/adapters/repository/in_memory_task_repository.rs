//! In-Memory Task Repository
//!
//! Holds task sources in memory. Clones share the same registry.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::ports::{RepositoryError, TaskRepository};

use super::validate_task_name;

#[derive(Debug, Clone, Default)]
pub struct InMemoryTaskRepository {
    tasks: Arc<DashMap<String, String>>,
}

impl InMemoryTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_task(self, name: impl Into<String>, code: impl Into<String>) -> Self {
        self.insert(name, code);
        self
    }

    /// Register or replace a task.
    pub fn insert(&self, name: impl Into<String>, code: impl Into<String>) {
        self.tasks.insert(name.into(), code.into());
    }

    pub fn remove(&self, name: &str) -> bool {
        self.tasks.remove(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[async_trait]
impl TaskRepository for InMemoryTaskRepository {
    async fn get_code(&self, task_name: &str) -> Result<Option<String>, RepositoryError> {
        validate_task_name(task_name)?;
        Ok(self.tasks.get(task_name).map(|code| code.value().clone()))
    }

    async fn list(&self) -> Result<Vec<String>, RepositoryError> {
        let mut names: Vec<String> = self.tasks.iter().map(|e| e.key().clone()).collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_registered_code() {
        let repo = InMemoryTaskRepository::new().with_task("double", "input.n * 2");
        assert_eq!(
            repo.get_code("double").await.unwrap().as_deref(),
            Some("input.n * 2")
        );
        assert_eq!(repo.get_code("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn clones_share_registry() {
        let repo = InMemoryTaskRepository::new();
        let clone = repo.clone();
        clone.insert("b", "2");
        clone.insert("a", "1");

        assert_eq!(repo.list().await.unwrap(), vec!["a", "b"]);
        assert!(repo.remove("a"));
        assert_eq!(clone.len(), 1);
    }
}
