//! Operation error taxonomy shared across the orchestration layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Classification of an operation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// The interpreter environment is not ready; nothing was spawned
    EnvironmentNotReady,
    /// The worker is missing an interpreter package
    MissingDependency,
    PermissionDenied,
    FileNotFound,
    /// The worker was terminated by the supervisor (cancelled or timed out)
    Aborted,
    /// The client-side request timeout lapsed with no response
    Timeout,
    /// Unclassified non-zero worker exit
    Generic,
    UnknownCommand,
    /// The client bus is in degraded mode (no transport)
    TransportUnavailable,
}

/// A classified failure with a human-readable message
///
/// Every rejection surfaced to the UI carries one of these; the host bus
/// re-surfaces only the message text over the wire.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The operation was cancelled or timed out, not a crash
    pub fn aborted(operation_id: &str) -> Self {
        Self::new(
            ErrorKind::Aborted,
            format!("operation '{operation_id}' was cancelled or timed out"),
        )
    }

    pub fn timeout(command: &str, timeout_ms: u128) -> Self {
        Self::new(
            ErrorKind::Timeout,
            format!("request '{command}' timed out after {timeout_ms}ms"),
        )
    }

    pub fn generic(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Generic, message)
    }

    pub fn unknown_command(command: &str) -> Self {
        Self::new(
            ErrorKind::UnknownCommand,
            format!("unknown command: {command}"),
        )
    }

    pub fn degraded(command: &str) -> Self {
        Self::new(
            ErrorKind::TransportUnavailable,
            format!("request '{command}' is not available in degraded mode"),
        )
    }
}
