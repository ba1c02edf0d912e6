//! Error types for worker-runner

use sdv_core::{ErrorKind, OperationError};
use thiserror::Error;

/// Result type alias for supervisor operations
pub type Result<T> = std::result::Result<T, SupervisorError>;

/// Errors that can occur while supervising a worker process
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The interpreter environment is not ready; nothing was spawned
    #[error("interpreter environment is not ready")]
    EnvironmentNotReady,

    /// Failed to spawn the worker process
    #[error("failed to spawn worker process: {message}")]
    SpawnFailed {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The worker ran and failed; carries the classified outcome
    #[error("{0}")]
    Worker(OperationError),

    /// IO error while collecting worker output
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn spawn_failed(message: impl Into<String>) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: None,
        }
    }

    pub fn spawn_failed_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            message: message.into(),
            source: Some(source),
        }
    }

    /// The taxonomy kind this error maps to at the bus boundary
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EnvironmentNotReady => ErrorKind::EnvironmentNotReady,
            Self::Worker(err) => err.kind,
            Self::SpawnFailed { .. } | Self::Io(_) => ErrorKind::Generic,
        }
    }
}

impl From<SupervisorError> for OperationError {
    fn from(err: SupervisorError) -> Self {
        match err {
            SupervisorError::Worker(inner) => inner,
            other => OperationError::new(other.kind(), other.to_string()),
        }
    }
}
