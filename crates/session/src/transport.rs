//! Transport layer abstraction
//!
//! The engine itself never touches sockets: it consumes and produces
//! wire buffers, and a [`Transport`] implementation moves those buffers
//! over whatever medium carries the channel. The trait is symmetric, the
//! same shape works for either side of an association.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Bridges wire buffers between the engine and a concrete medium.
///
/// `run` owns the connection for its whole lifetime: it forwards buffers
/// arriving from the medium into `incoming_tx` and flushes buffers taken
/// from `outgoing_rx` out to the medium, until either side shuts down.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Error type for this transport
    type Error: std::error::Error + Send + Sync + 'static;

    async fn run(
        self,
        incoming_tx: mpsc::Sender<Bytes>,
        outgoing_rx: mpsc::Receiver<Bytes>,
    ) -> Result<(), Self::Error>;
}

/// In-memory transport backed by channels, for tests and in-process
/// peers.
pub struct MemoryTransport {
    to_peer: mpsc::Sender<Bytes>,
    from_peer: mpsc::Receiver<Bytes>,
}

impl MemoryTransport {
    pub fn new(to_peer: mpsc::Sender<Bytes>, from_peer: mpsc::Receiver<Bytes>) -> Self {
        Self { to_peer, from_peer }
    }

    /// Creates two transports wired back to back.
    pub fn create_pair(buffer_size: usize) -> (Self, Self) {
        let (a_to_b_tx, a_to_b_rx) = mpsc::channel(buffer_size);
        let (b_to_a_tx, b_to_a_rx) = mpsc::channel(buffer_size);

        let a = Self::new(a_to_b_tx, b_to_a_rx);
        let b = Self::new(b_to_a_tx, a_to_b_rx);

        (a, b)
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    type Error = MemoryTransportError;

    async fn run(
        mut self,
        incoming_tx: mpsc::Sender<Bytes>,
        mut outgoing_rx: mpsc::Receiver<Bytes>,
    ) -> Result<(), Self::Error> {
        loop {
            tokio::select! {
                Some(bytes) = self.from_peer.recv() => {
                    if incoming_tx.send(bytes).await.is_err() {
                        return Err(MemoryTransportError::ChannelClosed);
                    }
                }

                Some(bytes) = outgoing_rx.recv() => {
                    if self.to_peer.send(bytes).await.is_err() {
                        return Err(MemoryTransportError::ChannelClosed);
                    }
                }

                else => {
                    return Ok(());
                }
            }
        }
    }
}

/// Memory transport errors
#[derive(Debug, thiserror::Error)]
pub enum MemoryTransportError {
    #[error("transport channel closed")]
    ChannelClosed,
}
