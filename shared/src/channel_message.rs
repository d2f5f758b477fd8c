use serde::{Deserialize, Serialize};

/// Payloads exchanged over an open data channel, in the shape the display
/// apps understand.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type")]
pub enum ChannelMessage {
    #[serde(rename = "MESSAGE")]
    Message {
        content: String,
        #[serde(rename = "isLiveTyping", default)]
        live_typing: bool,
    },
    #[serde(rename = "TYPING")]
    Typing {
        #[serde(default)]
        content: String,
    },
    #[serde(rename = "CHANNEL_CONNECTED")]
    ChannelConnected,
}

impl ChannelMessage {
    pub fn text(content: impl Into<String>) -> Self {
        ChannelMessage::Message { content: content.into(), live_typing: false }
    }

    pub fn encode(&self) -> String {
        // serializing a plain enum of strings and bools cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Frames that are not one of the known JSON shapes are plain text, which
    /// is what simpler senders put on the channel.
    pub fn decode(frame: &str) -> Self {
        serde_json::from_str(frame).unwrap_or_else(|_| ChannelMessage::text(frame))
    }
}
