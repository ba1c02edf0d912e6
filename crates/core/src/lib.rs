//! Core library for the Scientific Data Viewer orchestration layer
//!
//! This crate contains the shared contracts between the UI client and the
//! host, including:
//! - Wire protocol messages (request/response/event)
//! - The typed command union dispatched by the host bus
//! - The operation error taxonomy
//! - The `CommandHandler` and `Transport` trait seams

pub mod command;
pub mod error;
pub mod protocol;
pub mod transport;

pub use command::CommandRequest;
pub use error::{ErrorKind, OperationError};
pub use protocol::{BusMessage, EventEnvelope, RequestEnvelope, ResponseEnvelope};
pub use transport::{CommandHandler, Transport, TransportError};
