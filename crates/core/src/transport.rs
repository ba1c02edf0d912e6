//! Trait seams between the buses, the transport and the command handlers

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::command::CommandRequest;
use crate::error::OperationError;
use crate::protocol::BusMessage;

/// Failure to hand a message to the transport
#[derive(Debug, Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl TransportError {
    pub fn closed() -> Self {
        Self("channel closed".to_string())
    }
}

/// One side of the message pipe between client and host
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, message: BusMessage) -> Result<(), TransportError>;
}

/// Host-side handler for a single command name
///
/// Exactly one handler is registered per command name; the host bus turns
/// the returned value or error into the correlated response.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, request: CommandRequest) -> Result<Value, OperationError>;
}
