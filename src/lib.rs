pub mod config;
pub mod display;
pub mod networking;
pub mod orchestrator;
pub mod peer;
pub mod producers;
pub mod session_id;
pub mod share;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Signaling error: {0}")]
    SignalingError(#[from] networking::SignalingError),
    #[error("WebRTC error: {0}")]
    WebRtcError(#[from] networking::webrtc::WebRTCError),
    #[error("Relay error: {0}")]
    RelayError(#[from] orchestrator::RelayError),
    #[error("Session id error: {0}")]
    SessionIdError(#[from] session_id::SessionIdError),
    #[error("Clipboard error: {0}")]
    ClipboardError(#[from] producers::ClipboardError),
    #[error("Task error: {0}")]
    TaskError(#[from] tokio::task::JoinError),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
