//! Packet model for the lockd wire protocol
//!
//! Every message on the wire is a `{Type, Data}` record. Clients send lock
//! requests carrying the lock name in `Data`; the server answers a granted
//! request with the same type and `Data = "true"`.

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// Length of the ASCII decimal frame header
pub const FRAME_HEADER_LEN: usize = 6;

/// Largest body a six digit header can describe
pub const MAX_BODY_LEN: usize = 999_999;

/// Data carried by a granted lock response
pub const ACK_DATA: &str = "true";

// Numeric packet types as they appear on the wire
pub const PACKET_TYPE_TEST: i32 = 0;
pub const PACKET_TYPE_LOCK: i32 = 1;

/// Packet type enumeration
///
/// Types the server does not know are preserved as `Unknown` so that decoding
/// never fails on them; the server simply ignores such packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum PacketType {
    /// Liveness / connectivity check
    #[default]
    Test,
    /// Lock request, `Data` holds the lock name
    Lock,
    Unknown(i32),
}

impl PacketType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PacketType::Test => "TEST",
            PacketType::Lock => "LOCK_REQUEST",
            PacketType::Unknown(_) => "UNKNOWN",
        }
    }
}

impl From<i32> for PacketType {
    fn from(value: i32) -> Self {
        match value {
            PACKET_TYPE_TEST => PacketType::Test,
            PACKET_TYPE_LOCK => PacketType::Lock,
            other => PacketType::Unknown(other),
        }
    }
}

impl From<PacketType> for i32 {
    fn from(value: PacketType) -> Self {
        match value {
            PacketType::Test => PACKET_TYPE_TEST,
            PacketType::Lock => PACKET_TYPE_LOCK,
            PacketType::Unknown(other) => other,
        }
    }
}

impl Display for PacketType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            PacketType::Unknown(v) => write!(f, "UNKNOWN({})", v),
            _ => write!(f, "{}", self.as_str()),
        }
    }
}

/// A single protocol message
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Packet {
    #[serde(rename = "Type", alias = "type", default)]
    pub kind: PacketType,
    #[serde(rename = "Data", alias = "data", default)]
    pub data: String,
}

impl Packet {
    pub fn new(kind: PacketType, data: impl Into<String>) -> Self {
        Self {
            kind,
            data: data.into(),
        }
    }

    /// Liveness check packet
    pub fn test() -> Self {
        Self::new(PacketType::Test, "")
    }

    /// Request for the named lock
    pub fn lock_request(name: impl Into<String>) -> Self {
        Self::new(PacketType::Lock, name)
    }

    /// Acknowledgment echoing the request type
    pub fn ack(kind: PacketType) -> Self {
        Self::new(kind, ACK_DATA)
    }

    pub fn is_ack(&self) -> bool {
        self.data == ACK_DATA
    }
}
