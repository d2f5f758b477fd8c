use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Packet, SignalMessage};

pub const JOIN_SESSION: &str = "joinSession";
pub const PEER_JOINED: &str = "peerJoined";
pub const SIGNAL: &str = "signal";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PeerJoined {
    pub peer_id: String,
}

/// Events of the relay contract. Connection teardown is not an event here: it
/// travels as a Socket.IO disconnect packet or as the socket closing.
#[derive(Debug, Clone, PartialEq)]
pub enum RelayEvent {
    JoinSession(String),
    PeerJoined(PeerJoined),
    Signal(SignalMessage),
}

impl RelayEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RelayEvent::JoinSession(_) => JOIN_SESSION,
            RelayEvent::PeerJoined(_) => PEER_JOINED,
            RelayEvent::Signal(_) => SIGNAL,
        }
    }

    /// Returns `Ok(None)` for event names outside the contract.
    pub fn from_event(name: &str, payload: Value) -> Result<Option<Self>, serde_json::Error> {
        let event = match name {
            JOIN_SESSION => RelayEvent::JoinSession(serde_json::from_value(payload)?),
            PEER_JOINED => RelayEvent::PeerJoined(serde_json::from_value(payload)?),
            SIGNAL => RelayEvent::Signal(serde_json::from_value(payload)?),
            _ => return Ok(None),
        };
        Ok(Some(event))
    }

    pub fn to_packet(&self) -> Result<Packet, serde_json::Error> {
        let payload = match self {
            RelayEvent::JoinSession(session_id) => Value::String(session_id.clone()),
            RelayEvent::PeerJoined(joined) => serde_json::to_value(joined)?,
            RelayEvent::Signal(message) => serde_json::to_value(message)?,
        };
        Ok(Packet::event(self.name(), payload))
    }
}
