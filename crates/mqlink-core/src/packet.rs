//! MQTT control packets exchanged by the client session layer.

use crate::error::{ProtocolError, Result};

/// MQTT Control Packet Types (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 1,
    Connack = 2,
    Publish = 3,
    Puback = 4,
    Pubrec = 5,
    Pubrel = 6,
    Pubcomp = 7,
    Subscribe = 8,
    Suback = 9,
    Unsubscribe = 10,
    Unsuback = 11,
    Pingreq = 12,
    Pingresp = 13,
    Disconnect = 14,
    Auth = 15,
}

impl std::fmt::Display for PacketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PacketType::Connect => "CONNECT",
            PacketType::Connack => "CONNACK",
            PacketType::Publish => "PUBLISH",
            PacketType::Puback => "PUBACK",
            PacketType::Pubrec => "PUBREC",
            PacketType::Pubrel => "PUBREL",
            PacketType::Pubcomp => "PUBCOMP",
            PacketType::Subscribe => "SUBSCRIBE",
            PacketType::Suback => "SUBACK",
            PacketType::Unsubscribe => "UNSUBSCRIBE",
            PacketType::Unsuback => "UNSUBACK",
            PacketType::Pingreq => "PINGREQ",
            PacketType::Pingresp => "PINGRESP",
            PacketType::Disconnect => "DISCONNECT",
            PacketType::Auth => "AUTH",
        };
        f.write_str(name)
    }
}

/// Quality of Service levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
#[allow(clippy::enum_variant_names)] // MQTT spec names
pub enum QoS {
    #[default]
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

/// SUBACK return codes (MQTT 3.1.1 section 3.9.3).
pub mod suback_code {
    pub const GRANTED_QOS_0: u8 = 0x00;
    pub const GRANTED_QOS_1: u8 = 0x01;
    pub const GRANTED_QOS_2: u8 = 0x02;
    pub const FAILURE: u8 = 0x80;
}

/// MQTT Packets handled by the client session layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Packet {
    Subscribe(Subscribe),
    Suback(Suback),
    Unsubscribe(Unsubscribe),
    Unsuback(Unsuback),
    Pingreq,
    Pingresp,
    Disconnect,
}

impl Packet {
    /// Control packet type from the fixed header.
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::Suback(_) => PacketType::Suback,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::Unsuback(_) => PacketType::Unsuback,
            Packet::Pingreq => PacketType::Pingreq,
            Packet::Pingresp => PacketType::Pingresp,
            Packet::Disconnect => PacketType::Disconnect,
        }
    }

    /// Packet identifier from the variable header, if this kind carries one.
    pub fn packet_id(&self) -> Option<u16> {
        match self {
            Packet::Subscribe(p) => Some(p.packet_id),
            Packet::Suback(p) => Some(p.packet_id),
            Packet::Unsubscribe(p) => Some(p.packet_id),
            Packet::Unsuback(p) => Some(p.packet_id),
            Packet::Pingreq | Packet::Pingresp | Packet::Disconnect => None,
        }
    }
}

/// SUBSCRIBE packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscribe {
    pub packet_id: u16,
    /// Topic filters with their requested QoS, in request order.
    pub topics: Vec<(String, QoS)>,
}

impl Subscribe {
    pub fn new(packet_id: u16, topics: &[(&str, QoS)]) -> Self {
        Self {
            packet_id,
            topics: topics
                .iter()
                .map(|(filter, qos)| (filter.to_string(), *qos))
                .collect(),
        }
    }
}

/// SUBACK packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suback {
    pub packet_id: u16,
    /// One code per requested filter, in request order
    /// (0x00-0x02 = granted QoS, 0x80 = failure).
    pub return_codes: Vec<u8>,
}

impl Suback {
    pub fn new(packet_id: u16, return_codes: Vec<u8>) -> Self {
        Self {
            packet_id,
            return_codes,
        }
    }

    /// Reject return codes MQTT 3.1.1 does not define.
    pub fn validate(&self) -> Result<()> {
        match self.return_codes.iter().find(|code| {
            !matches!(
                **code,
                suback_code::GRANTED_QOS_0
                    | suback_code::GRANTED_QOS_1
                    | suback_code::GRANTED_QOS_2
                    | suback_code::FAILURE
            )
        }) {
            Some(code) => Err(ProtocolError::MalformedPacket(format!(
                "Invalid SUBACK return code: {:#04x}",
                code
            ))),
            None => Ok(()),
        }
    }
}

/// UNSUBSCRIBE packet data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unsubscribe {
    pub packet_id: u16,
    pub topics: Vec<String>,
}

impl Unsubscribe {
    pub fn new(packet_id: u16, topics: &[&str]) -> Self {
        Self {
            packet_id,
            topics: topics.iter().map(|t| t.to_string()).collect(),
        }
    }
}

/// UNSUBACK packet data. MQTT 3.1.1 UNSUBACK has no payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Unsuback {
    pub packet_id: u16,
}
