//! Client message bus
//!
//! Runs on the UI side. Sends correlated requests with a per-request
//! timeout, resolves or rejects the waiting caller when the matching
//! response arrives, and fans broadcast events out to subscribers.
//!
//! Degraded mode is decided once at construction (no transport available)
//! and never flips back: request sending is disabled, event delivery can
//! still be exercised locally.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use sdv_core::{
    BusMessage, CommandRequest, ErrorKind, OperationError, RequestEnvelope, ResponseEnvelope,
    Transport,
};

/// What to do when the client-side timeout lapses
///
/// The local timeout only abandons the waiting caller; it never stops the
/// remote worker by itself. Latency-sensitive callers opt into the abort
/// variant so the tracked operation is torn down as well.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeoutAction {
    /// Abandon the local promise only
    Abandon,
    /// Additionally fire a best-effort abort for the tracked operation
    AbortOperation { operation_id: String },
}

/// Per-call options for `send_request`
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub timeout: Duration,
    pub on_timeout: TimeoutAction,
}

impl RequestOptions {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            on_timeout: TimeoutAction::Abandon,
        }
    }

    pub fn abort_on_timeout(timeout: Duration, operation_id: impl Into<String>) -> Self {
        Self {
            timeout,
            on_timeout: TimeoutAction::AbortOperation {
                operation_id: operation_id.into(),
            },
        }
    }
}

/// Handle for removing exactly one event listener
#[derive(Debug)]
pub struct EventSubscription {
    event: String,
    id: u64,
}

type EventCallback = Arc<dyn Fn(&Value) -> Result<(), String> + Send + Sync>;

struct EventListener {
    id: u64,
    callback: EventCallback,
}

/// Client-side correlation entry; removed on resolution, rejection or
/// timeout, whichever occurs first
struct PendingRequest {
    respond: oneshot::Sender<Result<Value, OperationError>>,
}

/// Correlated request sender and event subscriber for the UI side
#[derive(Clone)]
pub struct ClientBus {
    transport: Option<Arc<dyn Transport>>,
    pending: Arc<Mutex<HashMap<String, PendingRequest>>>,
    listeners: Arc<Mutex<HashMap<String, Vec<EventListener>>>>,
    next_listener_id: Arc<AtomicU64>,
}

impl ClientBus {
    /// Build a bus over the given transport; `None` puts the bus into
    /// degraded mode for its whole lifetime
    pub fn new(transport: Option<Arc<dyn Transport>>) -> Self {
        if transport.is_none() {
            warn!("client bus constructed without transport, running degraded");
        }
        Self {
            transport,
            pending: Arc::new(Mutex::new(HashMap::new())),
            listeners: Arc::new(Mutex::new(HashMap::new())),
            next_listener_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.transport.is_none()
    }

    /// Send a correlated request and await its response
    pub async fn send_request(
        &self,
        command: CommandRequest,
        options: RequestOptions,
    ) -> Result<Value, OperationError> {
        let name = command.name();
        let transport = match &self.transport {
            Some(transport) => Arc::clone(transport),
            // Reject before touching the pending map or arming any timer
            None => return Err(OperationError::degraded(name)),
        };

        let (command_name, payload) = command.into_wire();
        let id = Uuid::new_v4().to_string();

        let (respond, receiver) = oneshot::channel();
        self.pending
            .lock()
            .await
            .insert(id.clone(), PendingRequest { respond });

        let envelope = RequestEnvelope::new(&id, &command_name, payload);
        if let Err(e) = transport.send(BusMessage::Request(envelope)).await {
            self.pending.lock().await.remove(&id);
            return Err(OperationError::new(
                ErrorKind::TransportUnavailable,
                format!("failed to send request '{command_name}': {e}"),
            ));
        }

        match tokio::time::timeout(options.timeout, receiver).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(OperationError::generic(format!(
                "response channel for '{command_name}' closed unexpectedly"
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                if let TimeoutAction::AbortOperation { operation_id } = options.on_timeout {
                    self.fire_abort(&transport, operation_id).await;
                }
                Err(OperationError::timeout(
                    &command_name,
                    options.timeout.as_millis(),
                ))
            }
        }
    }

    /// Subscribe to a broadcast event; listeners run in registration order
    pub async fn on_event<F>(&self, event: &str, listener: F) -> EventSubscription
    where
        F: Fn(&Value) -> Result<(), String> + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.listeners.lock().await;
        listeners.entry(event.to_string()).or_default().push(EventListener {
            id,
            callback: Arc::new(listener),
        });
        EventSubscription {
            event: event.to_string(),
            id,
        }
    }

    /// Remove exactly the listener the subscription was returned for
    pub async fn unsubscribe(&self, subscription: EventSubscription) {
        let mut listeners = self.listeners.lock().await;
        if let Some(registered) = listeners.get_mut(&subscription.event) {
            registered.retain(|listener| listener.id != subscription.id);
            if registered.is_empty() {
                listeners.remove(&subscription.event);
            }
        }
    }

    /// Feed one inbound message from the transport
    pub async fn handle_incoming(&self, message: BusMessage) {
        match message {
            BusMessage::Response(response) => self.handle_response(response).await,
            BusMessage::Event(event) => self.handle_event(&event.event, &event.payload).await,
            BusMessage::Request(request) => {
                warn!(request_id = %request.id, "client bus dropping unexpected request");
            }
        }
    }

    async fn handle_response(&self, response: ResponseEnvelope) {
        let pending = self.pending.lock().await.remove(&response.request_id);
        let Some(pending) = pending else {
            // Duplicate, late, or forged; already timed out and cleaned up
            warn!(
                request_id = %response.request_id,
                "dropping response for unknown request id"
            );
            return;
        };

        let result = if response.success {
            Ok(response.payload.unwrap_or(Value::Null))
        } else {
            Err(OperationError::generic(
                response
                    .error
                    .unwrap_or_else(|| "request failed".to_string()),
            ))
        };

        // The caller may have raced the timeout and gone away; nothing to do
        let _ = pending.respond.send(result);
    }

    async fn handle_event(&self, event: &str, payload: &Value) {
        let callbacks: Vec<EventCallback> = {
            let listeners = self.listeners.lock().await;
            match listeners.get(event) {
                Some(registered) => registered.iter().map(|l| Arc::clone(&l.callback)).collect(),
                None => return,
            }
        };

        debug!(event = %event, listeners = callbacks.len(), "delivering event");
        for callback in callbacks {
            // A failing listener never prevents the rest from running
            if let Err(e) = callback(payload) {
                warn!(event = %event, "event listener failed: {e}");
            }
        }
    }

    /// Best-effort abort of a remote operation after a local timeout; the
    /// response to this request is intentionally uncorrelated and dropped
    async fn fire_abort(&self, transport: &Arc<dyn Transport>, operation_id: String) {
        warn!(operation_id = %operation_id, "request timed out, sending abort");
        let (command_name, payload) = CommandRequest::AbortOperation { operation_id }.into_wire();
        let envelope = RequestEnvelope::new(Uuid::new_v4().to_string(), &command_name, payload);
        if let Err(e) = transport.send(BusMessage::Request(envelope)).await {
            warn!("failed to send abort after timeout: {e}");
        }
    }
}
