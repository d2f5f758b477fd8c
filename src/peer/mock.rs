//! In-memory transport used by unit tests across the crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use clipcast_shared::{IceCandidate, SessionDescription};

use super::transport::{PeerEventSink, PeerTransport, Role, TransportEvent, TransportFactory};
use crate::networking::webrtc::{WebRTCError, WebRTCResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateOffer,
    CreateAnswer,
    SetLocal(String),
    SetRemote(String),
    AddCandidate(String),
    SendText(String),
    Close,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Faults {
    pub offer: bool,
    pub answer: bool,
    pub candidate: bool,
    pub send: bool,
}

fn failure() -> WebRTCError {
    WebRTCError::PeerConnectionError(webrtc::Error::ErrConnectionClosed)
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<Call>>>,
    faults: Faults,
}

impl MockTransport {
    pub fn new(faults: Faults) -> Self {
        Self { calls: Arc::default(), faults }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::SendText(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn create_offer(&self) -> WebRTCResult<SessionDescription> {
        self.record(Call::CreateOffer);
        if self.faults.offer {
            return Err(failure());
        }
        Ok(SessionDescription::offer("v=0 mock-offer"))
    }

    async fn create_answer(&self) -> WebRTCResult<SessionDescription> {
        self.record(Call::CreateAnswer);
        if self.faults.answer {
            return Err(failure());
        }
        Ok(SessionDescription::answer("v=0 mock-answer"))
    }

    async fn set_local_description(&self, description: SessionDescription) -> WebRTCResult<()> {
        self.record(Call::SetLocal(description.sdp_type));
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> WebRTCResult<()> {
        self.record(Call::SetRemote(description.sdp_type));
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> WebRTCResult<()> {
        self.record(Call::AddCandidate(candidate.candidate));
        if self.faults.candidate {
            return Err(failure());
        }
        Ok(())
    }

    async fn send_text(&self, text: &str) -> WebRTCResult<()> {
        self.record(Call::SendText(text.to_owned()));
        if self.faults.send {
            return Err(failure());
        }
        Ok(())
    }

    async fn close(&self) -> WebRTCResult<()> {
        self.record(Call::Close);
        Ok(())
    }
}

/// A transport handed out by [`MockFactory`], with the sink its callbacks
/// would go to.
#[derive(Debug, Clone)]
pub struct Created {
    pub role: Role,
    pub events: PeerEventSink,
    pub transport: MockTransport,
}

impl Created {
    pub fn raise(&self, event: TransportEvent) {
        assert!(self.events.send(event));
    }
}

#[derive(Debug, Default)]
pub struct MockFactory {
    created: Mutex<Vec<Created>>,
    faults: Mutex<Faults>,
    refuse: Mutex<bool>,
}

impl MockFactory {
    pub fn set_faults(&self, faults: Faults) {
        *self.faults.lock().unwrap() = faults;
    }

    pub fn refuse(&self, refuse: bool) {
        *self.refuse.lock().unwrap() = refuse;
    }

    pub fn created(&self) -> Vec<Created> {
        self.created.lock().unwrap().clone()
    }

    /// The most recent transport created for `peer_id`.
    pub fn latest(&self, peer_id: &str) -> Created {
        self.created()
            .into_iter()
            .rev()
            .find(|created| created.events.peer_id() == peer_id)
            .unwrap_or_else(|| panic!("no transport for {peer_id}"))
    }

    pub fn count_for(&self, peer_id: &str) -> usize {
        self.created().iter().filter(|created| created.events.peer_id() == peer_id).count()
    }
}

#[async_trait]
impl TransportFactory for MockFactory {
    async fn create(
        &self,
        role: Role,
        events: PeerEventSink,
    ) -> WebRTCResult<Box<dyn PeerTransport>> {
        if *self.refuse.lock().unwrap() {
            return Err(failure());
        }
        let transport = MockTransport::new(*self.faults.lock().unwrap());
        self.created.lock().unwrap().push(Created { role, events, transport: transport.clone() });
        Ok(Box::new(transport))
    }
}
