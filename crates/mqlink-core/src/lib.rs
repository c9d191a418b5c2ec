//! mqlink-core - Packet model for the mqlink session crates.
//!
//! Typed MQTT 3.1.1 control packets as consumed and produced by the
//! client session layer. Wire encoding lives with the transport; this crate
//! only carries the fields the session core correlates on.

pub mod error;
pub mod packet;

pub use error::{ProtocolError, Result};
pub use packet::*;
