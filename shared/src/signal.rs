use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

/// Envelope carried by the relay's `signal` event.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub peer_id: Option<String>,
    #[serde(default)]
    pub data: Value,
}

impl SignalMessage {
    pub fn new(
        session_id: impl Into<String>,
        peer_id: Option<String>,
        payload: &SignalPayload,
    ) -> Self {
        Self { session_id: session_id.into(), peer_id, data: payload.to_value() }
    }

    pub fn payload(&self) -> Result<SignalPayload, PayloadError> {
        SignalPayload::parse(&self.data)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
    Message,
    Typing,
    ChannelConnected,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
            SignalKind::Message => "message",
            SignalKind::Typing => "typing",
            SignalKind::ChannelConnected => "channelConnected",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "offer" => Some(SignalKind::Offer),
            "answer" => Some(SignalKind::Answer),
            "ice-candidate" => Some(SignalKind::IceCandidate),
            "message" => Some(SignalKind::Message),
            "typing" => Some(SignalKind::Typing),
            "channelConnected" => Some(SignalKind::ChannelConnected),
            _ => None,
        }
    }

    /// Whether this kind drives peer negotiation, as opposed to carrying
    /// application text through the relay.
    pub fn is_negotiation(&self) -> bool {
        matches!(self, SignalKind::Offer | SignalKind::Answer | SignalKind::IceCandidate)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    #[serde(rename = "type")]
    pub sdp_type: String,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: "offer".to_owned(), sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { sdp_type: "answer".to_owned(), sdp: sdp.into() }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default, rename = "sdpMLineIndex")]
    pub sdp_mline_index: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username_fragment: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum PayloadError {
    #[error("Signal payload has no type")]
    MissingType,
    #[error("Unknown signal type: {0}")]
    UnknownType(String),
    #[error("Malformed {kind} payload: {source}")]
    Malformed { kind: SignalKind, source: serde_json::Error },
}

/// Typed view over the `data` field of a [`SignalMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalPayload {
    Offer(SessionDescription),
    Answer(SessionDescription),
    IceCandidate(IceCandidate),
    Message { content: String, live_typing: bool },
    Typing { content: String },
    ChannelConnected,
}

#[derive(Deserialize)]
struct DescriptionBody {
    #[serde(default)]
    offer: Option<SessionDescription>,
    #[serde(default)]
    answer: Option<SessionDescription>,
    #[serde(default)]
    sdp: Option<String>,
}

#[derive(Deserialize)]
struct CandidateBody {
    candidate: IceCandidate,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TextBody {
    #[serde(default)]
    content: String,
    #[serde(default)]
    is_live_typing: bool,
}

impl SignalPayload {
    pub fn kind(&self) -> SignalKind {
        match self {
            SignalPayload::Offer(_) => SignalKind::Offer,
            SignalPayload::Answer(_) => SignalKind::Answer,
            SignalPayload::IceCandidate(_) => SignalKind::IceCandidate,
            SignalPayload::Message { .. } => SignalKind::Message,
            SignalPayload::Typing { .. } => SignalKind::Typing,
            SignalPayload::ChannelConnected => SignalKind::ChannelConnected,
        }
    }

    pub fn message(content: impl Into<String>) -> Self {
        SignalPayload::Message { content: content.into(), live_typing: false }
    }

    /// Some senders stringify the payload before emitting it, so a JSON
    /// string is decoded before the type is inspected.
    pub fn parse(data: &Value) -> Result<Self, PayloadError> {
        if let Value::String(raw) = data {
            let inner: Value =
                serde_json::from_str(raw).map_err(|_| PayloadError::MissingType)?;
            return Self::parse(&inner);
        }

        let name = data.get("type").and_then(Value::as_str).ok_or(PayloadError::MissingType)?;
        let kind =
            SignalKind::from_name(name).ok_or_else(|| PayloadError::UnknownType(name.to_owned()))?;
        let malformed = |source| PayloadError::Malformed { kind, source };

        match kind {
            SignalKind::Offer | SignalKind::Answer => {
                let body = DescriptionBody::deserialize(data).map_err(malformed)?;
                let nested = if kind == SignalKind::Offer { body.offer } else { body.answer };
                let description = match (nested, body.sdp) {
                    (Some(description), _) => description,
                    (None, Some(sdp)) => SessionDescription { sdp_type: kind.to_string(), sdp },
                    (None, None) => {
                        let missing = kind.as_str();
                        return Err(malformed(serde::de::Error::missing_field(missing)));
                    }
                };
                Ok(if kind == SignalKind::Offer {
                    SignalPayload::Offer(description)
                } else {
                    SignalPayload::Answer(description)
                })
            }
            SignalKind::IceCandidate => {
                let body = CandidateBody::deserialize(data).map_err(malformed)?;
                Ok(SignalPayload::IceCandidate(body.candidate))
            }
            SignalKind::Message => {
                let body = TextBody::deserialize(data).map_err(malformed)?;
                let live_typing = body.is_live_typing;
                Ok(SignalPayload::Message { content: body.content, live_typing })
            }
            SignalKind::Typing => {
                let body = TextBody::deserialize(data).map_err(malformed)?;
                Ok(SignalPayload::Typing { content: body.content })
            }
            SignalKind::ChannelConnected => Ok(SignalPayload::ChannelConnected),
        }
    }

    pub fn to_value(&self) -> Value {
        let kind = self.kind().as_str();
        match self {
            SignalPayload::Offer(description) => json!({ "type": kind, "offer": description }),
            SignalPayload::Answer(description) => json!({ "type": kind, "answer": description }),
            SignalPayload::IceCandidate(candidate) => {
                json!({ "type": kind, "candidate": candidate })
            }
            SignalPayload::Message { content, live_typing } => {
                json!({ "type": kind, "content": content, "isLiveTyping": live_typing })
            }
            SignalPayload::Typing { content } => json!({ "type": kind, "content": content }),
            SignalPayload::ChannelConnected => json!({ "type": kind }),
        }
    }
}
