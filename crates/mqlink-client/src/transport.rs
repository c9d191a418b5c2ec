//! Outbound packet seam between the session core and the transport.

use std::future::Future;

use mqlink_core::Packet;
use tokio::sync::mpsc;

use crate::error::TransportError;

/// Hands packets to whatever writes them to the wire.
///
/// Called concurrently from every public operation of the handler. A
/// PINGRESP only completes a ping once `send_packet` for its PINGREQ has
/// returned, so the future should resolve as soon as the packet is queued.
pub trait PacketSender: Send + Sync + 'static {
    fn send_packet(
        &self,
        packet: Packet,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send;
}

/// Packet sender backed by a tokio channel.
///
/// The receiving half belongs to the task that encodes and writes packets.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::Sender<Packet>,
}

impl ChannelSender {
    /// Create a sender and the receiver the writer task drains.
    ///
    /// `cap` is the outbound queue capacity.
    pub fn new(cap: usize) -> (Self, mpsc::Receiver<Packet>) {
        let (tx, rx) = mpsc::channel(cap);
        (Self { tx }, rx)
    }
}

impl PacketSender for ChannelSender {
    fn send_packet(
        &self,
        packet: Packet,
    ) -> impl Future<Output = std::result::Result<(), TransportError>> + Send {
        let tx = self.tx.clone();
        async move { tx.send(packet).await.map_err(|_| TransportError::Closed) }
    }
}
