use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum SignalingError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(#[from] tokio_tungstenite::tungstenite::Error),
    #[error("Timed out after {0:?} connecting to the relay")]
    Timeout(Duration),
    #[error("Relay refused the connection: {0}")]
    Refused(String),
    #[error("Relay closed the connection during the handshake")]
    HandshakeClosed,
    #[error("Packet error: {0}")]
    PacketError(#[from] clipcast_shared::PacketError),
    #[error("Serialize error: {0}")]
    SerializeError(#[from] serde_json::Error),
    #[error("Signaling channel is closed")]
    ChannelClosed,
}
