//! Error types for winforge-engine

use thiserror::Error;

/// Result type alias using winforge-engine's Error type
pub type Result<T> = std::result::Result<T, EngineError>;

/// Engine error types
///
/// Most of these are soft at the pipeline level: the step wrapper appends
/// them to the error log and keeps going. Only errors reporting
/// `is_fatal() == true` abort the run.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A command failed after exhausting its attempt budget
    #[error("command '{command}' failed after {attempts} attempts (exit code {exit_code:?})")]
    CommandFailed {
        command: String,
        exit_code: Option<i32>,
        attempts: u32,
        output: String,
    },

    /// A package repository could not be registered despite repair attempts
    ///
    /// Fatal: every optional package silently depends on bucket availability,
    /// and a partial bucket set produces confusing downstream failures.
    #[error("could not register bucket '{name}' despite {attempts} repair attempts")]
    BucketUnavailable { name: String, attempts: u32 },

    /// Registry operation failed
    #[error("registry operation failed: {0}")]
    Registry(String),

    /// Archive could not be read or extracted
    #[error("archive error: {0}")]
    Archive(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (package manifests, tool configuration files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl EngineError {
    /// Whether this error must abort the provisioning run
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::BucketUnavailable { .. })
    }

    /// Create a registry error
    pub fn registry(message: impl Into<String>) -> Self {
        Self::Registry(message.into())
    }

    /// Create an archive error
    pub fn archive(message: impl Into<String>) -> Self {
        Self::Archive(message.into())
    }
}
