//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Task timeout must be positive and no larger than the maximum")]
    InvalidTaskTimeout,

    #[error("Sandbox call depth must be between 1 and 256")]
    InvalidCallDepth,

    #[error("Flow step limit must be positive")]
    InvalidStepLimit,

    #[error("Background task timeout must be positive")]
    InvalidBackgroundTimeout,

    #[error("Connections per address must be positive")]
    InvalidConnectionLimit,

    #[error("Sweep interval must be positive")]
    InvalidSweepInterval,

    #[error("Send buffer must be positive")]
    InvalidSendBuffer,

    #[error("Task directory must not be empty")]
    EmptyTaskDirectory,
}
