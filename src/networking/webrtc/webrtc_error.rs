pub type WebRTCResult<T> = Result<T, WebRTCError>;

#[derive(thiserror::Error, Debug)]
pub enum WebRTCError {
    #[error("Peer connection error: {0}")]
    PeerConnectionError(webrtc::Error),
    #[error("Codec error: {0}")]
    CodecError(webrtc::Error),
    #[error("SDP error: {0}")]
    SdpError(webrtc::Error),
    #[error("Data channel error: {0}")]
    DataChannelError(webrtc::Error),
    #[error("Unsupported session description type: {0}")]
    UnsupportedSdpType(String),
    #[error("Data channel is not open")]
    ChannelNotOpen,
}
