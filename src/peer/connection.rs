use std::fmt;

use clipcast_shared::{IceCandidate, SessionDescription, SignalKind, SignalPayload};

use crate::{
    networking::{SessionLink, SignalingError, webrtc::WebRTCError},
    peer::transport::{PeerId, PeerTransport, Role},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationState {
    New,
    OfferSent,
    OfferReceived,
    AnswerSent,
    Negotiating,
    Open,
    Closed,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::New => "new",
            Self::OfferSent => "offer-sent",
            Self::OfferReceived => "offer-received",
            Self::AnswerSent => "answer-sent",
            Self::Negotiating => "negotiating",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Connecting,
    Open,
    Closed,
}

#[derive(Debug, thiserror::Error)]
pub enum PeerError {
    #[error("Negotiation failed: {0}")]
    NegotiationError(#[from] WebRTCError),
    #[error("Signaling failed: {0}")]
    SignalingError(#[from] SignalingError),
    #[error("Unexpected {kind} while {state}")]
    UnexpectedSignal { kind: SignalKind, state: NegotiationState },
    #[error("Remote candidate rejected: {0}")]
    CandidateRejected(WebRTCError),
    #[error("Delivery failed: {0}")]
    DeliveryFailed(WebRTCError),
    #[error("Data channel is not open")]
    NotOpen,
}

impl PeerError {
    /// Fatal errors close the connection they came from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NegotiationError(_) | Self::SignalingError(_))
    }
}

/// One remote peer: the offer/answer state machine plus the candidate
/// queues that keep ICE ordering independent of relay timing.
pub struct PeerConnection {
    peer_id: PeerId,
    connection_id: u64,
    role: Role,
    state: NegotiationState,
    history: Vec<NegotiationState>,
    channel: ChannelState,
    transport: Box<dyn PeerTransport>,
    remote_description_set: bool,
    local_description_sent: bool,
    pending_local: Vec<IceCandidate>,
    pending_remote: Vec<IceCandidate>,
}

impl fmt::Debug for PeerConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PeerConnection")
            .field("peer_id", &self.peer_id)
            .field("connection_id", &self.connection_id)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

impl PeerConnection {
    pub fn new(
        peer_id: impl Into<PeerId>,
        connection_id: u64,
        role: Role,
        transport: Box<dyn PeerTransport>,
    ) -> Self {
        Self {
            peer_id: peer_id.into(),
            connection_id,
            role,
            state: NegotiationState::New,
            history: vec![NegotiationState::New],
            channel: ChannelState::Connecting,
            transport,
            remote_description_set: false,
            local_description_sent: false,
            pending_local: Vec::new(),
            pending_remote: Vec::new(),
        }
    }

    pub fn peer_id(&self) -> &str {
        &self.peer_id
    }

    pub fn connection_id(&self) -> u64 {
        self.connection_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn state(&self) -> NegotiationState {
        self.state
    }

    pub fn channel_state(&self) -> ChannelState {
        self.channel
    }

    /// Every state this connection has been in, starting with `New`.
    pub fn history(&self) -> &[NegotiationState] {
        &self.history
    }

    pub fn is_open(&self) -> bool {
        self.state == NegotiationState::Open && self.channel == ChannelState::Open
    }

    pub fn is_closed(&self) -> bool {
        self.state == NegotiationState::Closed
    }

    pub fn pending_remote_candidates(&self) -> usize {
        self.pending_remote.len()
    }

    pub fn pending_local_candidates(&self) -> usize {
        self.pending_local.len()
    }

    /// Creates, applies and sends the local offer.
    pub async fn start_offer(&mut self, link: &SessionLink) -> Result<(), PeerError> {
        let result = self.send_offer(link).await;
        self.settle(result).await
    }

    /// Applies a remote offer and sends back the answer.
    pub async fn accept_offer(
        &mut self,
        offer: SessionDescription,
        link: &SessionLink,
    ) -> Result<(), PeerError> {
        let result = self.answer_offer(offer, link).await;
        self.settle(result).await
    }

    /// Applies the remote answer to our offer.
    pub async fn accept_answer(&mut self, answer: SessionDescription) -> Result<(), PeerError> {
        let result = self.apply_answer(answer).await;
        self.settle(result).await
    }

    /// Applies a remote candidate, or queues it until the remote description
    /// is in place.
    pub async fn add_remote_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.is_closed() {
            let kind = SignalKind::IceCandidate;
            return Err(PeerError::UnexpectedSignal { kind, state: self.state });
        }
        if !self.remote_description_set {
            tracing::debug!("Queueing remote candidate for {} until its description", self.peer_id);
            self.pending_remote.push(candidate);
            return Ok(());
        }
        self.transport.add_ice_candidate(candidate).await.map_err(PeerError::CandidateRejected)
    }

    /// Sends a locally gathered candidate, or holds it until our own
    /// description has gone out.
    pub fn on_local_candidate(
        &mut self,
        candidate: IceCandidate,
        link: &SessionLink,
    ) -> Result<(), PeerError> {
        if self.is_closed() {
            return Ok(());
        }
        if !self.local_description_sent {
            self.pending_local.push(candidate);
            return Ok(());
        }
        link.emit(&self.peer_id, &SignalPayload::IceCandidate(candidate))?;
        Ok(())
    }

    /// Returns true when this callback completed the connection.
    pub fn on_channel_open(&mut self) -> bool {
        if self.is_closed() {
            return false;
        }
        self.channel = ChannelState::Open;
        self.open_if_ready()
    }

    pub async fn on_channel_closed(&mut self) {
        self.channel = ChannelState::Closed;
        self.close().await;
    }

    pub async fn send_text(&self, text: &str) -> Result<(), PeerError> {
        if !self.is_open() {
            return Err(PeerError::NotOpen);
        }
        self.transport.send_text(text).await.map_err(PeerError::DeliveryFailed)
    }

    /// Idempotent; closing drops any queued candidates.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        if let Err(e) = self.transport.close().await {
            tracing::warn!("Failed to close transport for {}: {}", self.peer_id, e);
        }
        self.channel = ChannelState::Closed;
        self.pending_local.clear();
        self.pending_remote.clear();
        self.transition(NegotiationState::Closed);
    }

    async fn send_offer(&mut self, link: &SessionLink) -> Result<(), PeerError> {
        self.require_state(SignalKind::Offer, NegotiationState::New)?;
        let offer = self.transport.create_offer().await?;
        self.transport.set_local_description(offer.clone()).await?;
        link.emit(&self.peer_id, &SignalPayload::Offer(offer))?;
        self.local_description_sent = true;
        self.transition(NegotiationState::OfferSent);
        self.flush_local(link)
    }

    async fn answer_offer(
        &mut self,
        offer: SessionDescription,
        link: &SessionLink,
    ) -> Result<(), PeerError> {
        self.require_state(SignalKind::Offer, NegotiationState::New)?;
        self.transition(NegotiationState::OfferReceived);
        self.apply_remote(offer).await?;

        let answer = self.transport.create_answer().await?;
        self.transport.set_local_description(answer.clone()).await?;
        link.emit(&self.peer_id, &SignalPayload::Answer(answer))?;
        self.local_description_sent = true;
        self.transition(NegotiationState::AnswerSent);
        self.flush_local(link)?;

        self.transition(NegotiationState::Negotiating);
        self.open_if_ready();
        Ok(())
    }

    async fn apply_answer(&mut self, answer: SessionDescription) -> Result<(), PeerError> {
        self.require_state(SignalKind::Answer, NegotiationState::OfferSent)?;
        self.apply_remote(answer).await?;
        self.transition(NegotiationState::Negotiating);
        self.open_if_ready();
        Ok(())
    }

    fn require_state(&self, kind: SignalKind, state: NegotiationState) -> Result<(), PeerError> {
        if self.state != state {
            return Err(PeerError::UnexpectedSignal { kind, state: self.state });
        }
        Ok(())
    }

    async fn apply_remote(&mut self, description: SessionDescription) -> Result<(), PeerError> {
        self.transport.set_remote_description(description).await?;
        self.remote_description_set = true;

        let pending = std::mem::take(&mut self.pending_remote);
        if !pending.is_empty() {
            tracing::debug!("Applying {} queued candidates for {}", pending.len(), self.peer_id);
        }
        for candidate in pending {
            if let Err(e) = self.transport.add_ice_candidate(candidate).await {
                tracing::warn!("Queued candidate for {} was rejected: {}", self.peer_id, e);
            }
        }
        Ok(())
    }

    fn flush_local(&mut self, link: &SessionLink) -> Result<(), PeerError> {
        for candidate in std::mem::take(&mut self.pending_local) {
            link.emit(&self.peer_id, &SignalPayload::IceCandidate(candidate))?;
        }
        Ok(())
    }

    fn open_if_ready(&mut self) -> bool {
        if self.state == NegotiationState::Negotiating && self.channel == ChannelState::Open {
            self.transition(NegotiationState::Open);
            return true;
        }
        false
    }

    fn transition(&mut self, next: NegotiationState) {
        tracing::debug!("Peer {} {} -> {}", self.peer_id, self.state, next);
        self.state = next;
        self.history.push(next);
    }

    async fn settle(&mut self, result: Result<(), PeerError>) -> Result<(), PeerError> {
        if let Err(e) = &result {
            if e.is_fatal() {
                tracing::warn!("Closing connection to {}: {}", self.peer_id, e);
                self.close().await;
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use clipcast_shared::{Packet, SignalMessage};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        networking::SignalingChannel,
        peer::mock::{Call, Faults, MockTransport},
        session_id::SessionId,
    };

    fn link() -> (SessionLink, mpsc::UnboundedReceiver<Packet>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let session_id = SessionId::parse("quick-lazy-fox").unwrap();
        let link = SessionLink::new(SignalingChannel::new(tx), session_id);
        (link, rx)
    }

    fn emitted(rx: &mut mpsc::UnboundedReceiver<Packet>) -> Vec<SignalPayload> {
        let mut payloads = Vec::new();
        while let Ok(Packet::Event { payload, .. }) = rx.try_recv() {
            let message: SignalMessage = serde_json::from_value(payload).unwrap();
            payloads.push(message.payload().unwrap());
        }
        payloads
    }

    fn candidate(name: &str) -> IceCandidate {
        IceCandidate {
            candidate: name.to_owned(),
            sdp_mid: Some("0".to_owned()),
            sdp_mline_index: Some(0),
            username_fragment: None,
        }
    }

    fn peer(role: Role, faults: Faults) -> (PeerConnection, MockTransport) {
        let transport = MockTransport::new(faults);
        (PeerConnection::new("display-1", 1, role, Box::new(transport.clone())), transport)
    }

    #[tokio::test]
    async fn initiator_walks_to_open() {
        let (link, mut rx) = link();
        let (mut conn, transport) = peer(Role::Initiator, Faults::default());

        conn.start_offer(&link).await.unwrap();
        assert_eq!(conn.state(), NegotiationState::OfferSent);
        conn.accept_answer(SessionDescription::answer("v=0")).await.unwrap();
        assert_eq!(conn.state(), NegotiationState::Negotiating);
        assert!(!conn.is_open());
        assert!(conn.on_channel_open());

        assert_eq!(
            conn.history(),
            [
                NegotiationState::New,
                NegotiationState::OfferSent,
                NegotiationState::Negotiating,
                NegotiationState::Open
            ]
        );
        assert!(matches!(emitted(&mut rx)[..], [SignalPayload::Offer(_)]));

        conn.send_text("hello").await.unwrap();
        assert_eq!(transport.sent(), ["hello"]);
    }

    #[tokio::test]
    async fn responder_answers_and_opens() {
        let (link, mut rx) = link();
        let (mut conn, transport) = peer(Role::Responder, Faults::default());

        conn.accept_offer(SessionDescription::offer("v=0"), &link).await.unwrap();
        conn.on_channel_open();

        assert_eq!(
            conn.history(),
            [
                NegotiationState::New,
                NegotiationState::OfferReceived,
                NegotiationState::AnswerSent,
                NegotiationState::Negotiating,
                NegotiationState::Open
            ]
        );
        assert!(matches!(emitted(&mut rx)[..], [SignalPayload::Answer(_)]));
        assert_eq!(
            transport.calls(),
            [
                Call::SetRemote("offer".to_owned()),
                Call::CreateAnswer,
                Call::SetLocal("answer".to_owned())
            ]
        );
    }

    #[tokio::test]
    async fn early_candidates_are_applied_once_after_the_description() {
        let (link, _rx) = link();
        let (mut conn, transport) = peer(Role::Initiator, Faults::default());

        conn.start_offer(&link).await.unwrap();
        conn.add_remote_candidate(candidate("c1")).await.unwrap();
        conn.add_remote_candidate(candidate("c2")).await.unwrap();
        assert_eq!(conn.pending_remote_candidates(), 2);
        assert!(!transport.calls().iter().any(|call| matches!(call, Call::AddCandidate(_))));

        conn.accept_answer(SessionDescription::answer("v=0")).await.unwrap();
        conn.add_remote_candidate(candidate("c3")).await.unwrap();

        let applied: Vec<Call> = transport
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::AddCandidate(_)))
            .collect();
        assert_eq!(
            applied,
            [
                Call::AddCandidate("c1".to_owned()),
                Call::AddCandidate("c2".to_owned()),
                Call::AddCandidate("c3".to_owned())
            ]
        );
        assert_eq!(conn.pending_remote_candidates(), 0);
    }

    #[tokio::test]
    async fn local_candidates_follow_the_offer() {
        let (link, mut rx) = link();
        let (mut conn, _transport) = peer(Role::Initiator, Faults::default());

        conn.on_local_candidate(candidate("early"), &link).unwrap();
        assert_eq!(conn.pending_local_candidates(), 1);
        assert!(emitted(&mut rx).is_empty());

        conn.start_offer(&link).await.unwrap();
        conn.on_local_candidate(candidate("late"), &link).unwrap();

        let payloads = emitted(&mut rx);
        assert!(matches!(payloads[0], SignalPayload::Offer(_)));
        assert_eq!(payloads[1], SignalPayload::IceCandidate(candidate("early")));
        assert_eq!(payloads[2], SignalPayload::IceCandidate(candidate("late")));
    }

    #[tokio::test]
    async fn channel_open_before_negotiating_waits() {
        let (link, _rx) = link();
        let (mut conn, _transport) = peer(Role::Initiator, Faults::default());

        conn.start_offer(&link).await.unwrap();
        assert!(!conn.on_channel_open());
        assert_eq!(conn.state(), NegotiationState::OfferSent);

        conn.accept_answer(SessionDescription::answer("v=0")).await.unwrap();
        assert_eq!(conn.state(), NegotiationState::Open);
    }

    #[tokio::test]
    async fn out_of_order_signals_are_not_fatal() {
        let (link, _rx) = link();
        let (mut conn, _transport) = peer(Role::Responder, Faults::default());

        let err = conn.accept_answer(SessionDescription::answer("v=0")).await.unwrap_err();
        assert!(!err.is_fatal());
        assert!(matches!(
            err,
            PeerError::UnexpectedSignal { kind: SignalKind::Answer, state: NegotiationState::New }
        ));

        conn.accept_offer(SessionDescription::offer("v=0"), &link).await.unwrap();
        let err = conn.accept_offer(SessionDescription::offer("v=0"), &link).await.unwrap_err();
        assert!(matches!(err, PeerError::UnexpectedSignal { kind: SignalKind::Offer, .. }));
        assert_eq!(conn.state(), NegotiationState::Negotiating);
    }

    #[tokio::test]
    async fn negotiation_failure_closes() {
        let (link, mut rx) = link();
        let faults = Faults { offer: true, ..Faults::default() };
        let (mut conn, transport) = peer(Role::Initiator, faults);

        let err = conn.start_offer(&link).await.unwrap_err();
        assert!(err.is_fatal());
        assert!(conn.is_closed());
        assert_eq!(transport.calls().last(), Some(&Call::Close));
        assert!(emitted(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn sending_requires_an_open_channel() {
        let (link, _rx) = link();
        let (mut conn, transport) = peer(Role::Initiator, Faults::default());
        assert!(matches!(conn.send_text("x").await, Err(PeerError::NotOpen)));

        conn.start_offer(&link).await.unwrap();
        conn.accept_answer(SessionDescription::answer("v=0")).await.unwrap();
        conn.on_channel_open();
        conn.on_channel_closed().await;

        assert!(conn.is_closed());
        assert!(matches!(conn.send_text("x").await, Err(PeerError::NotOpen)));
        assert!(transport.sent().is_empty());
        assert!(!conn.on_channel_open());
    }
}
