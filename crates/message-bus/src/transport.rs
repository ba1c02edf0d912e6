//! In-process channel transport
//!
//! A pair of cross-wired mpsc channels standing in for whatever carries
//! messages between the UI surface and the host in production. Each side
//! sends through the `Transport` seam and drains its inbound half with
//! `recv`.

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};

use sdv_core::{BusMessage, Transport, TransportError};

/// One end of an in-process duplex message pipe
pub struct ChannelTransport {
    tx: mpsc::Sender<BusMessage>,
    rx: Mutex<mpsc::Receiver<BusMessage>>,
}

impl ChannelTransport {
    /// Receive the next inbound message; `None` once the peer is gone
    pub async fn recv(&self) -> Option<BusMessage> {
        self.rx.lock().await.recv().await
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    async fn send(&self, message: BusMessage) -> Result<(), TransportError> {
        self.tx
            .send(message)
            .await
            .map_err(|_| TransportError::closed())
    }
}

/// Build a connected `(client side, host side)` transport pair
pub fn duplex(capacity: usize) -> (ChannelTransport, ChannelTransport) {
    let (client_tx, host_rx) = mpsc::channel(capacity);
    let (host_tx, client_rx) = mpsc::channel(capacity);

    let client = ChannelTransport {
        tx: client_tx,
        rx: Mutex::new(client_rx),
    };
    let host = ChannelTransport {
        tx: host_tx,
        rx: Mutex::new(host_rx),
    };
    (client, host)
}
