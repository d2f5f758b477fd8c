//! Engine.IO v4 / Socket.IO v5 text framing, as spoken by the session relay.
//!
//! Only the default namespace and text frames are supported; binary
//! attachments never occur in this protocol.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("Empty frame")]
    Empty,
    #[error("Unknown packet type: {0}")]
    UnknownType(String),
    #[error("Invalid JSON in packet: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Event packet is not a [name, payload] array")]
    InvalidEvent,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// `0{...}` handshake sent by the server when the socket opens.
    Open(Value),
    Close,
    Ping,
    Pong,
    Noop,
    /// `40` from a client, `40{"sid":...}` back from the server.
    Connect(Option<Value>),
    Disconnect,
    /// `42["name", payload]`.
    Event { name: String, payload: Value },
    ConnectError(Value),
}

impl Packet {
    pub fn event(name: impl Into<String>, payload: Value) -> Self {
        Packet::Event { name: name.into(), payload }
    }

    pub fn encode(&self) -> String {
        match self {
            Packet::Open(handshake) => format!("0{handshake}"),
            Packet::Close => "1".to_owned(),
            Packet::Ping => "2".to_owned(),
            Packet::Pong => "3".to_owned(),
            Packet::Noop => "6".to_owned(),
            Packet::Connect(None) => "40".to_owned(),
            Packet::Connect(Some(data)) => format!("40{data}"),
            Packet::Disconnect => "41".to_owned(),
            Packet::Event { name, payload } => {
                let frame = Value::Array(vec![Value::String(name.clone()), payload.clone()]);
                format!("42{frame}")
            }
            Packet::ConnectError(data) => format!("44{data}"),
        }
    }

    pub fn decode(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let Some(engine_type) = chars.next() else {
            return Err(PacketError::Empty);
        };
        let rest = chars.as_str();

        match engine_type {
            '0' => Ok(Packet::Open(serde_json::from_str(rest)?)),
            '1' => Ok(Packet::Close),
            '2' => Ok(Packet::Ping),
            '3' => Ok(Packet::Pong),
            '6' => Ok(Packet::Noop),
            '4' => Self::decode_socket(rest),
            other => Err(PacketError::UnknownType(other.to_string())),
        }
    }

    fn decode_socket(frame: &str) -> Result<Self, PacketError> {
        let mut chars = frame.chars();
        let Some(socket_type) = chars.next() else {
            return Err(PacketError::Empty);
        };
        let body = strip_namespace(chars.as_str());

        match socket_type {
            '0' if body.is_empty() => Ok(Packet::Connect(None)),
            '0' => Ok(Packet::Connect(Some(serde_json::from_str(body)?))),
            '1' => Ok(Packet::Disconnect),
            '2' => {
                // ack ids precede the array and are not used by this protocol
                let body = body.trim_start_matches(|c: char| c.is_ascii_digit());
                let Value::Array(mut items) = serde_json::from_str(body)? else {
                    return Err(PacketError::InvalidEvent);
                };
                if items.is_empty() {
                    return Err(PacketError::InvalidEvent);
                }
                let payload = if items.len() > 1 { items.swap_remove(1) } else { Value::Null };
                let Value::String(name) = items.swap_remove(0) else {
                    return Err(PacketError::InvalidEvent);
                };
                Ok(Packet::Event { name, payload })
            }
            '4' => Ok(Packet::ConnectError(serde_json::from_str(body)?)),
            other => Err(PacketError::UnknownType(format!("4{other}"))),
        }
    }
}

fn strip_namespace(body: &str) -> &str {
    if body.starts_with('/') {
        match body.find(',') {
            Some(idx) => &body[idx + 1..],
            None => "",
        }
    } else {
        body
    }
}
