//! Domain errors for the mender repair loop.

use std::path::PathBuf;

use thiserror::Error;

/// Domain-level errors that can occur outside a specific collaborator seam.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Issue not found: {0}")]
    IssueNotFound(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Write-safety violations and I/O failures raised by the content store.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Refusing suspicious write target: {}", .0.display())]
    SuspiciousTarget(PathBuf),

    #[error("Path escapes the repository root: {}", .0.display())]
    OutsideRoot(PathBuf),

    #[error("I/O error writing {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriteError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Safety violations are refused locally; I/O errors are environmental.
    pub const fn is_safety_violation(&self) -> bool {
        matches!(self, Self::SuspiciousTarget(_) | Self::OutsideRoot(_))
    }
}

/// Failures produced by a generator backend or a model-backed step.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    #[error("Backend {backend} failed: {message}")]
    Backend { backend: String, message: String },

    #[error("Backend {backend} timed out after {secs}s")]
    Timeout { backend: String, secs: u64 },

    #[error("Unparseable output from {backend}: {message}")]
    Unparseable { backend: String, message: String },

    #[error("Backend {0} produced an empty proposal")]
    EmptyProposal(String),

    #[error("Backend {0} does not handle this subject")]
    Unsupported(String),

    #[error("All generator backends failed: {}", .0.join("; "))]
    Exhausted(Vec<String>),
}

impl GenerationError {
    /// Transient failures may succeed on a later attempt.
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Backend { .. } | Self::Timeout { .. })
    }
}

/// Version-control collaborator failures.
#[derive(Debug, Error)]
pub enum VcsError {
    #[error("VCS command `{command}` failed: {stderr}")]
    CommandFailed { command: String, stderr: String },

    #[error("Failed to spawn VCS process: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Persisted-state failures.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error on state document {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode state document {}: {message}", path.display())]
    Encode { path: PathBuf, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_error_transience() {
        let timeout = GenerationError::Timeout {
            backend: "local_model".to_string(),
            secs: 30,
        };
        assert!(timeout.is_transient());
        assert!(!GenerationError::EmptyProposal("template".to_string()).is_transient());
    }

    #[test]
    fn test_exhausted_message_lists_backends() {
        let err = GenerationError::Exhausted(vec![
            "template: unsupported".to_string(),
            "local_model: timeout".to_string(),
        ]);
        let message = err.to_string();
        assert!(message.contains("template: unsupported"));
        assert!(message.contains("local_model: timeout"));
    }

    #[test]
    fn test_write_error_classification() {
        assert!(WriteError::SuspiciousTarget(PathBuf::from("tmp")).is_safety_violation());
        let io = WriteError::io("a.txt", std::io::Error::other("disk full"));
        assert!(!io.is_safety_violation());
    }
}
