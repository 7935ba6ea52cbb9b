//! Error types for core operations.

use thiserror::Error;

/// Rejected identifier. Raised before any filesystem access.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Value would escape its root directory once joined into a path.
    #[error("directory traversal in {field}: {value:?}")]
    DirectoryTraversal {
        /// Which identifier was rejected (project, version, spider, job).
        field: &'static str,
        /// The offending value.
        value: String,
    },
    /// Value is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Which identifier was rejected.
        field: &'static str,
    },
    /// Value contains a character that cannot appear in a path component.
    #[error("invalid character in {field}: {value:?}")]
    InvalidCharacter {
        /// Which identifier was rejected.
        field: &'static str,
        /// The offending value.
        value: String,
    },
}

/// Errors produced by the scheduling core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed or unsafe identifier.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// Requested project, version or job does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Spider enumeration failed or timed out.
    #[error("introspection failed: {message}")]
    Introspection {
        /// Short reason (exit status, timeout, parse failure).
        message: String,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Worker process could not be started.
    #[error("launch failed: {0}")]
    Launch(String),
    /// Service configuration rejected.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// Disk persistence failure for artifacts, queues or logs.
    #[error("storage error: {0}")]
    Storage(String),
    /// Job state change that the lifecycle does not allow.
    #[error("invalid transition for job {job_id}: {reason}")]
    InvalidTransition {
        /// Job the transition was requested for.
        job_id: String,
        /// What was wrong.
        reason: String,
    },
}

impl CoreError {
    /// Wrap an I/O error as a storage failure with context.
    pub fn storage(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        Self::Storage(format!("{context}: {err}"))
    }

    /// True for the error kinds a caller fixes by correcting its input.
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::NotFound(_))
    }
}

/// Result alias used across the core.
pub type CoreResult<T> = Result<T, CoreError>;

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
