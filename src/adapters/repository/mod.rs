//! Task Repository Adapters
//!
//! Implementations of the TaskRepository port.
//!
//! - **FileTaskRepository** - one `<name>.rhai` file per task in a directory
//! - **InMemoryTaskRepository** - tasks registered at runtime (testing/embedding)

mod file_task_repository;
mod in_memory_task_repository;

pub use file_task_repository::FileTaskRepository;
pub use in_memory_task_repository::InMemoryTaskRepository;

use crate::ports::RepositoryError;

/// Task names map straight onto file names, so only a conservative
/// character set is accepted.
pub(crate) fn validate_task_name(name: &str) -> Result<(), RepositoryError> {
    let valid = !name.is_empty()
        && name.len() <= 128
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(RepositoryError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_names() {
        assert!(validate_task_name("double").is_ok());
        assert!(validate_task_name("resize-image_2").is_ok());
    }

    #[test]
    fn rejects_paths_and_blanks() {
        assert!(validate_task_name("").is_err());
        assert!(validate_task_name("../etc/passwd").is_err());
        assert!(validate_task_name("a/b").is_err());
        assert!(validate_task_name("with space").is_err());
    }
}
