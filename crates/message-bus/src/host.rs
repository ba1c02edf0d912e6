//! Host message bus
//!
//! Receives inbound requests from the transport, dispatches them to the
//! registered command handlers and sends back correlated responses. Events
//! are pushed through the transport fire-and-forget.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use sdv_core::{
    BusMessage, CommandHandler, CommandRequest, EventEnvelope, RequestEnvelope, ResponseEnvelope,
    Transport,
};

/// Host bus configuration errors
#[derive(Debug, Error)]
pub enum HostBusError {
    /// Exactly one handler is allowed per command name
    #[error("a handler is already registered for command '{command}'")]
    HandlerAlreadyRegistered { command: String },
}

/// Dispatches inbound requests to registered handlers
#[derive(Clone)]
pub struct HostBus {
    transport: Arc<dyn Transport>,
    handlers: Arc<RwLock<HashMap<String, Arc<dyn CommandHandler>>>>,
}

impl HostBus {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            handlers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register the handler for one command name
    pub async fn register_handler(
        &self,
        command: &str,
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), HostBusError> {
        let mut handlers = self.handlers.write().await;
        if handlers.contains_key(command) {
            return Err(HostBusError::HandlerAlreadyRegistered {
                command: command.to_string(),
            });
        }
        handlers.insert(command.to_string(), handler);
        Ok(())
    }

    /// Register one handler instance under every command name it serves
    pub async fn register_handler_for_all(
        &self,
        commands: &[&str],
        handler: Arc<dyn CommandHandler>,
    ) -> Result<(), HostBusError> {
        for command in commands {
            self.register_handler(command, Arc::clone(&handler)).await?;
        }
        Ok(())
    }

    /// Feed one inbound message from the transport
    ///
    /// Requests are dispatched on their own task so a long-running handler
    /// never blocks the receive loop; overlapping operations stay
    /// independent.
    pub async fn handle_incoming(&self, message: BusMessage) {
        match message {
            BusMessage::Request(request) => {
                let bus = self.clone();
                tokio::spawn(async move {
                    bus.dispatch(request).await;
                });
            }
            BusMessage::Response(response) => {
                warn!(request_id = %response.request_id, "host bus dropping unexpected response");
            }
            BusMessage::Event(event) => {
                warn!(event = %event.event, "host bus dropping unexpected event");
            }
        }
    }

    /// Broadcast an event to the client side; no acknowledgement, no retry
    pub async fn emit_event(&self, event: &str, payload: Value) {
        let envelope = EventEnvelope::new(event, payload);
        if let Err(e) = self.transport.send(BusMessage::Event(envelope)).await {
            warn!(event = %event, "failed to emit event: {e}");
        }
    }

    async fn dispatch(&self, request: RequestEnvelope) {
        debug!(request_id = %request.id, command = %request.command, "dispatching request");

        let handler = self.handlers.read().await.get(&request.command).cloned();
        let response = match handler {
            None => {
                warn!(command = %request.command, "no handler registered");
                ResponseEnvelope::err(&request.id, format!("unknown command: {}", request.command))
            }
            Some(handler) => {
                match CommandRequest::from_wire(&request.command, request.payload) {
                    Err(e) => ResponseEnvelope::err(
                        &request.id,
                        format!("invalid payload for '{}': {}", request.command, e),
                    ),
                    Ok(command) => match handler.handle(command).await {
                        Ok(value) => ResponseEnvelope::ok(&request.id, value),
                        // Only the message text crosses the wire
                        Err(e) => ResponseEnvelope::err(&request.id, e.message),
                    },
                }
            }
        };

        if let Err(e) = self.transport.send(BusMessage::Response(response)).await {
            warn!(request_id = %request.id, "failed to send response: {e}");
        }
    }
}
