//! File-based Task Repository
//!
//! Serves task sources from a directory, one `<name>.rhai` file per task.
//! Files are read on every lookup so edits take effect without a restart.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::ports::{RepositoryError, TaskRepository};

use super::validate_task_name;

/// Extension of task source files.
pub const TASK_FILE_EXTENSION: &str = "rhai";

#[derive(Debug, Clone)]
pub struct FileTaskRepository {
    base_path: PathBuf,
}

impl FileTaskRepository {
    /// Create a repository over `base_path`.
    ///
    /// # Example
    /// ```ignore
    /// let tasks = FileTaskRepository::new("./tasks");
    /// ```
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn task_path(&self, name: &str) -> PathBuf {
        self.base_path
            .join(format!("{}.{}", name, TASK_FILE_EXTENSION))
    }
}

#[async_trait]
impl TaskRepository for FileTaskRepository {
    async fn get_code(&self, task_name: &str) -> Result<Option<String>, RepositoryError> {
        validate_task_name(task_name)?;

        match fs::read_to_string(self.task_path(task_name)).await {
            Ok(code) => Ok(Some(code)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(RepositoryError::Storage(e.to_string())),
        }
    }

    async fn list(&self) -> Result<Vec<String>, RepositoryError> {
        let mut entries = match fs::read_dir(&self.base_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(RepositoryError::Storage(e.to_string())),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| RepositoryError::Storage(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TASK_FILE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_task_name(stem).is_ok() {
                    names.push(stem.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn repo_with(files: &[(&str, &str)]) -> (TempDir, FileTaskRepository) {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        let repo = FileTaskRepository::new(dir.path());
        (dir, repo)
    }

    #[tokio::test]
    async fn reads_task_source() {
        let (_dir, repo) = repo_with(&[("double.rhai", "input.n * 2")]);
        assert_eq!(
            repo.get_code("double").await.unwrap().as_deref(),
            Some("input.n * 2")
        );
    }

    #[tokio::test]
    async fn missing_task_is_none() {
        let (_dir, repo) = repo_with(&[]);
        assert_eq!(repo.get_code("nothing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn traversal_is_rejected() {
        let (_dir, repo) = repo_with(&[]);
        let err = repo.get_code("../secret").await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidName(_)));
    }

    #[tokio::test]
    async fn lists_only_task_files() {
        let (_dir, repo) = repo_with(&[
            ("b.rhai", "2"),
            ("a.rhai", "1"),
            ("notes.txt", "ignored"),
        ]);
        assert_eq!(repo.list().await.unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn missing_directory_lists_nothing() {
        let repo = FileTaskRepository::new("/definitely/not/here");
        assert!(repo.list().await.unwrap().is_empty());
    }
}
