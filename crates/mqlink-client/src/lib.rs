//! mqlink-client - Client-side MQTT session core.
//!
//! Turns the asynchronous, packet-identifier correlated exchanges of an MQTT
//! session (SUBSCRIBE/SUBACK, UNSUBSCRIBE/UNSUBACK, PINGREQ/PINGRESP,
//! DISCONNECT and connection loss) into awaitable operations. Packet encoding
//! and the socket itself belong to the transport, which hands outbound
//! packets over through [`PacketSender`] and feeds inbound ones to
//! [`ClientHandler::dispatch`].
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use mqlink_client::{ChannelSender, ClientHandler, HandlerConfig, QoS};
//!
//! let (sender, mut outbound) = ChannelSender::new(16);
//! let handler = Arc::new(ClientHandler::new(sender, HandlerConfig::new("my-client")));
//! handler.start();
//!
//! // Subscribe with a caller-chosen packet identifier
//! let codes = handler.subscribe(&[("sensors/#", QoS::AtLeastOnce)], 1).await?;
//!
//! // Block until the broker goes away
//! handler.wait_disconnect().await?;
//! ```

mod config;
mod correlator;
mod error;
mod events;
mod handler;
mod keepalive;
mod lifecycle;
mod transport;
mod waiter;

pub use config::HandlerConfig;
pub use correlator::{AckTable, Registration};
pub use error::{ClientError, Result, TransportError};
pub use events::HandlerEvent;
pub use handler::{ClientHandler, HandlerState};
pub use keepalive::{KeepAlive, PingTicket, PongReceipt, WriteClock};
pub use lifecycle::DisconnectGate;
pub use transport::{ChannelSender, PacketSender};
pub use waiter::{Outcome, Waiter};

// Re-export useful types from core
pub use mqlink_core::packet::{
    suback_code, Packet, PacketType, QoS, Suback, Subscribe, Unsuback, Unsubscribe,
};
pub use mqlink_core::ProtocolError;
