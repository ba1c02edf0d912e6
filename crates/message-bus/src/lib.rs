//! Message Bus - correlated request/response plumbing between UI and host
//!
//! The client bus sends correlated requests with per-request timeouts and
//! subscribes to broadcast events; the host bus dispatches inbound requests
//! to registered command handlers and emits events. The batch module adds
//! admission-controlled fan-out with cooperative cancellation on top of the
//! client bus.

mod batch;
mod client;
mod host;
pub mod transport;

pub use batch::{run_batch, BatchController, BatchOutcome};
pub use client::{ClientBus, EventSubscription, RequestOptions, TimeoutAction};
pub use host::{HostBus, HostBusError};
pub use transport::ChannelTransport;
