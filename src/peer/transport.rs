//! The seam between the negotiation state machine and the WebRTC stack.

use async_trait::async_trait;
use clipcast_shared::{IceCandidate, SessionDescription};
use tokio::sync::mpsc;

use crate::networking::webrtc::WebRTCResult;

pub type PeerId = String;

/// Which side of the offer/answer exchange this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Creates the data channel and sends the offer.
    Initiator,
    /// Waits for the remote data channel and answers.
    Responder,
}

/// Callbacks raised by a transport, on whatever task the stack runs them.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    LocalCandidate(IceCandidate),
    ChannelOpen,
    ChannelClosed,
    /// The underlying connection failed or was closed by the remote side.
    ConnectionLost,
    Message(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    pub peer_id: PeerId,
    /// Distinguishes a recreated connection from the one it replaced.
    pub connection_id: u64,
    pub event: TransportEvent,
}

/// Tags transport callbacks with their connection before handing them to
/// the dispatch loop.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    peer_id: PeerId,
    connection_id: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSink {
    pub fn new(
        peer_id: impl Into<PeerId>,
        connection_id: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self { peer_id: peer_id.into(), connection_id, tx }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    /// Returns false once the dispatch loop is gone.
    pub fn send(&self, event: TransportEvent) -> bool {
        let peer_id = self.peer_id.clone();
        self.tx.send(PeerEvent { peer_id, connection_id: self.connection_id, event }).is_ok()
    }
}

#[async_trait]
pub trait PeerTransport: Send + Sync {
    async fn create_offer(&self) -> WebRTCResult<SessionDescription>;
    async fn create_answer(&self) -> WebRTCResult<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> WebRTCResult<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> WebRTCResult<()>;
    async fn add_ice_candidate(&self, candidate: IceCandidate) -> WebRTCResult<()>;
    async fn send_text(&self, text: &str) -> WebRTCResult<()>;
    async fn close(&self) -> WebRTCResult<()>;
}

#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Builds a fresh transport. An initiator's transport already owns its
    /// outgoing data channel when this returns.
    async fn create(
        &self,
        role: Role,
        events: PeerEventSink,
    ) -> WebRTCResult<Box<dyn PeerTransport>>;
}
