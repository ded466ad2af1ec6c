//! Packet model and JSON wire encoding.
//!
//! Wire shape:
//! ```text
//! {"h": "<header>", "b": <body>, "t": <type-code>, "k": "<key>"?, "s": "<signature>"?}
//! ```
//! `k` and `s` are omitted when absent. Non-ASCII body text is written as raw
//! UTF-8, never `\u` escaped.

use crate::error::{constants, FrameworkError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Closed set of packet kinds. Unknown wire codes map to `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum PacketType {
    #[default]
    Unknown = 0,
    /// Expects a `Response` carrying the same key
    Request = 1,
    Response = 2,
    /// Liveness signal
    Heartbeat = 3,
    Error = 4,
    Message = 5,
    Data = 6,
    Command = 7,
}

impl PacketType {
    /// Wire code of this type
    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Map a wire code onto the closed set
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => PacketType::Request,
            2 => PacketType::Response,
            3 => PacketType::Heartbeat,
            4 => PacketType::Error,
            5 => PacketType::Message,
            6 => PacketType::Data,
            7 => PacketType::Command,
            _ => PacketType::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PacketType::Unknown => "unknown",
            PacketType::Request => "request",
            PacketType::Response => "response",
            PacketType::Heartbeat => "heartbeat",
            PacketType::Error => "error",
            PacketType::Message => "message",
            PacketType::Data => "data",
            PacketType::Command => "command",
        }
    }
}

impl fmt::Display for PacketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for PacketType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for PacketType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let code = i64::deserialize(deserializer)?;
        Ok(PacketType::from_code(code))
    }
}

/// The protocol's atomic message unit
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Packet {
    /// Application-chosen discriminator, used as the event name
    pub header: String,
    /// Opaque payload
    pub body: Value,
    pub packet_type: PacketType,
    /// Correlates a `Response` with its `Request`
    pub key: Option<String>,
    /// HMAC signature, see [`PacketSigner`](crate::core::signing::PacketSigner)
    pub signature: Option<String>,
}

#[derive(Serialize)]
struct WirePacket<'a> {
    h: &'a str,
    b: &'a Value,
    t: PacketType,
    #[serde(skip_serializing_if = "Option::is_none")]
    k: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    s: Option<&'a str>,
}

impl Packet {
    pub fn new(header: impl Into<String>, packet_type: PacketType) -> Self {
        Self {
            header: header.into(),
            body: Value::Null,
            packet_type,
            key: None,
            signature: None,
        }
    }

    pub fn with_body(mut self, body: impl Into<Value>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Request with a fresh correlation key
    pub fn request(header: impl Into<String>, body: impl Into<Value>) -> Self {
        Self::new(header, PacketType::Request)
            .with_body(body)
            .with_key(uuid::Uuid::new_v4().to_string())
    }

    /// Response correlated with `request` through its key
    pub fn response_to(request: &Packet, body: impl Into<Value>) -> Self {
        let mut packet = Self::new(request.header.clone(), PacketType::Response).with_body(body);
        packet.key = request.key.clone();
        packet
    }

    /// Error reply correlated with `request`
    pub fn error_to(request: &Packet, message: impl Into<String>) -> Self {
        let mut packet = Self::error(request.header.clone(), message);
        packet.key = request.key.clone();
        packet
    }

    pub fn error(header: impl Into<String>, message: impl Into<String>) -> Self {
        let mut body = Map::new();
        body.insert("message".to_string(), Value::String(message.into()));
        Self::new(header, PacketType::Error).with_body(Value::Object(body))
    }

    pub fn heartbeat() -> Self {
        Self::new(HEARTBEAT_HEADER, PacketType::Heartbeat)
    }

    pub fn message(header: impl Into<String>, body: impl Into<Value>) -> Self {
        Self::new(header, PacketType::Message).with_body(body)
    }

    /// Command invocation; the body carries the ordered argument list
    pub fn command(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self::new(name, PacketType::Command)
            .with_body(Value::Array(args))
            .with_key(uuid::Uuid::new_v4().to_string())
    }

    /// Field of an object body
    pub fn body_value(&self, key: &str) -> Option<&Value> {
        self.body.as_object().and_then(|map| map.get(key))
    }

    /// Append the wire encoding to `buf`
    pub fn encode_into(&self, buf: &mut Vec<u8>) -> Result<()> {
        let wire = WirePacket {
            h: &self.header,
            b: &self.body,
            t: self.packet_type,
            k: self.key.as_deref(),
            s: self.signature.as_deref(),
        };
        serde_json::to_writer(buf, &wire)?;
        Ok(())
    }

    /// Wire encoding of this packet
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64 + self.header.len());
        self.encode_into(&mut buf)?;
        Ok(buf)
    }

    /// Parse a packet, failing with `ProtocolFormat` on non-conforming input
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(FrameworkError::ProtocolFormat(
                constants::ERR_EMPTY_PACKET.to_string(),
            ));
        }

        let value: Value = serde_json::from_slice(bytes)
            .map_err(|e| FrameworkError::ProtocolFormat(e.to_string()))?;
        let Value::Object(mut map) = value else {
            return Err(FrameworkError::ProtocolFormat(
                constants::ERR_NOT_AN_OBJECT.to_string(),
            ));
        };

        let header = match map.remove("h") {
            Some(Value::String(h)) => h,
            _ => {
                return Err(FrameworkError::ProtocolFormat(
                    constants::ERR_MISSING_HEADER.to_string(),
                ))
            }
        };

        let packet_type = match map.remove("t") {
            None | Some(Value::Null) => PacketType::Unknown,
            Some(Value::Number(n)) => match (n.as_i64(), n.as_u64()) {
                (Some(code), _) => PacketType::from_code(code),
                (None, Some(_)) => PacketType::Unknown,
                _ => {
                    return Err(FrameworkError::ProtocolFormat(
                        constants::ERR_BAD_TYPE_CODE.to_string(),
                    ))
                }
            },
            Some(_) => {
                return Err(FrameworkError::ProtocolFormat(
                    constants::ERR_BAD_TYPE_CODE.to_string(),
                ))
            }
        };

        let key = optional_string(map.remove("k"), constants::ERR_BAD_KEY)?;
        let signature = optional_string(map.remove("s"), constants::ERR_BAD_SIGNATURE_FIELD)?;

        Ok(Self {
            header,
            body: map.remove("b").unwrap_or(Value::Null),
            packet_type,
            key,
            signature,
        })
    }
}

/// Header used by liveness packets
pub const HEARTBEAT_HEADER: &str = "heartbeat";

fn optional_string(value: Option<Value>, err: &str) -> Result<Option<String>> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(_) => Err(FrameworkError::ProtocolFormat(err.to_string())),
    }
}

/// Encode a packet from its parts
pub fn encode(
    header: &str,
    packet_type: PacketType,
    body: &Value,
    key: Option<&str>,
) -> Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(64 + header.len());
    let wire = WirePacket {
        h: header,
        b: body,
        t: packet_type,
        k: key,
        s: None,
    };
    serde_json::to_writer(&mut buf, &wire)?;
    Ok(buf)
}

/// Decode a packet from wire bytes
pub fn decode(bytes: &[u8]) -> Result<Packet> {
    Packet::decode(bytes)
}
