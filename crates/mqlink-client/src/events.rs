//! Session events for observers.

use std::time::Duration;

use mqlink_core::PacketType;
use tokio::sync::mpsc;

/// Events emitted by the client handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerEvent {
    /// A packet was handed to the transport.
    PacketSent { packet_type: PacketType },
    /// Subscribe acknowledgment matched a pending SUBSCRIBE.
    SubAck {
        packet_id: u16,
        /// Return codes for each topic (0x00-0x02 = granted QoS, 0x80 = failure).
        return_codes: Vec<u8>,
    },
    /// Unsubscribe acknowledgment matched a pending UNSUBSCRIBE.
    UnsubAck { packet_id: u16 },
    /// PINGRESP completed a keepalive round.
    PingResp { round_trip: Duration },
    /// An acknowledgment arrived that no pending request was waiting for.
    StaleResponse {
        packet_type: PacketType,
        packet_id: Option<u16>,
    },
    /// The broker closed the connection.
    ConnectionClosed,
}

/// Non-blocking event sink.
///
/// Dispatch paths must never wait on an observer, so a full or dropped
/// receiver just loses the event.
#[derive(Debug, Clone)]
pub(crate) struct EventSink {
    tx: Option<mpsc::Sender<HandlerEvent>>,
}

impl EventSink {
    pub(crate) fn disabled() -> Self {
        Self { tx: None }
    }

    pub(crate) fn channel(capacity: usize) -> (Self, mpsc::Receiver<HandlerEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx: Some(tx) }, rx)
    }

    pub(crate) fn emit(&self, event: HandlerEvent) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(event) {
                log::debug!("Dropping handler event: {}", e);
            }
        }
    }
}
