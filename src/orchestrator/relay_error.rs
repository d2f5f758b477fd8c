use clipcast_shared::{PayloadError, SignalKind};

use crate::{
    networking::{SignalingError, webrtc::WebRTCError},
    peer::PeerError,
};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Relay connection failed: {0}")]
    ConnectionError(#[from] SignalingError),
    #[error("Could not create a connection for {peer_id}: {source}")]
    TransportError { peer_id: String, source: WebRTCError },
    #[error("Negotiation with {peer_id} failed: {source}")]
    NegotiationError { peer_id: String, source: PeerError },
    #[error("Got {kind} for unknown peer {peer_id}")]
    UnknownPeer { peer_id: String, kind: SignalKind },
    #[error("Got {kind} without a peer id")]
    MissingPeerId { kind: SignalKind },
    #[error("Malformed signal: {0}")]
    MalformedSignal(#[from] PayloadError),
}
