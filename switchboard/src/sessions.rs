//! Session membership and signal routing for the relay.

use std::collections::HashMap;

use clipcast_shared::{Packet, PeerJoined, RelayEvent, SignalMessage};
use tokio::sync::mpsc;

pub type Outbox = mpsc::UnboundedSender<Packet>;

#[derive(Debug, PartialEq, Eq)]
pub enum RouteError {
    NotInSession,
    UnknownTarget(String),
}

#[derive(Debug, Default)]
pub struct SessionTable {
    sessions: HashMap<String, HashMap<String, Outbox>>,
    membership: HashMap<String, String>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `peer_id` to `session_id`, leaving any previous session first, and
    /// announces the newcomer to every other member. Returns how many members
    /// were notified.
    pub fn join(&mut self, session_id: &str, peer_id: &str, outbox: Outbox) -> usize {
        if self.membership.get(peer_id).is_some_and(|current| current != session_id) {
            self.leave(peer_id);
        }

        let members = self.sessions.entry(session_id.to_owned()).or_default();
        members.insert(peer_id.to_owned(), outbox);
        self.membership.insert(peer_id.to_owned(), session_id.to_owned());

        let announcement = RelayEvent::PeerJoined(PeerJoined { peer_id: peer_id.to_owned() });
        let Ok(packet) = announcement.to_packet() else {
            return 0;
        };

        members
            .iter()
            .filter(|(id, _)| id.as_str() != peer_id)
            .filter(|(_, tx)| tx.send(packet.clone()).is_ok())
            .count()
    }

    /// Returns the session the peer left, if any. Empty sessions are dropped.
    pub fn leave(&mut self, peer_id: &str) -> Option<String> {
        let session_id = self.membership.remove(peer_id)?;
        if let Some(members) = self.sessions.get_mut(&session_id) {
            members.remove(peer_id);
            if members.is_empty() {
                self.sessions.remove(&session_id);
            }
        }
        Some(session_id)
    }

    /// Forwards a signal from `from` within its session. A targeted signal
    /// reaches only its `peerId`; an untargeted one reaches every other
    /// member. Either way the receiver sees the sender's id in `peerId`.
    pub fn route(&self, from: &str, mut message: SignalMessage) -> Result<usize, RouteError> {
        let session_id = self.membership.get(from).ok_or(RouteError::NotInSession)?;
        let members = self.sessions.get(session_id).ok_or(RouteError::NotInSession)?;

        let target = message.peer_id.replace(from.to_owned());
        message.session_id = session_id.clone();
        let Ok(packet) = RelayEvent::Signal(message).to_packet() else {
            return Ok(0);
        };

        match target {
            Some(target) => {
                let tx = members.get(&target).ok_or(RouteError::UnknownTarget(target))?;
                Ok(usize::from(tx.send(packet).is_ok()))
            }
            None => Ok(members
                .iter()
                .filter(|(id, _)| id.as_str() != from)
                .filter(|(_, tx)| tx.send(packet.clone()).is_ok())
                .count()),
        }
    }

    pub fn session_of(&self, peer_id: &str) -> Option<&str> {
        self.membership.get(peer_id).map(String::as_str)
    }

    pub fn member_count(&self, session_id: &str) -> usize {
        self.sessions.get(session_id).map_or(0, HashMap::len)
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use clipcast_shared::SignalPayload;

    use super::*;

    fn member() -> (Outbox, mpsc::UnboundedReceiver<Packet>) {
        mpsc::unbounded_channel()
    }

    fn signal_of(packet: Packet) -> SignalMessage {
        let Packet::Event { name, payload } = packet else { panic!("expected event") };
        match RelayEvent::from_event(&name, payload).unwrap() {
            Some(RelayEvent::Signal(message)) => message,
            other => panic!("expected signal, got {other:?}"),
        }
    }

    #[test]
    fn newcomer_is_announced_to_existing_members_only() {
        let mut table = SessionTable::new();
        let (sender_tx, mut sender_rx) = member();
        let (display_tx, mut display_rx) = member();

        assert_eq!(table.join("quick-lazy-fox", "sender", sender_tx), 0);
        assert_eq!(table.join("quick-lazy-fox", "display", display_tx), 1);

        let Packet::Event { name, payload } = sender_rx.try_recv().unwrap() else {
            panic!("expected event");
        };
        assert_eq!(name, "peerJoined");
        assert_eq!(payload["peerId"], "display");
        assert!(display_rx.try_recv().is_err());
    }

    #[test]
    fn targeted_signal_is_rewritten_with_sender_id() {
        let mut table = SessionTable::new();
        let (sender_tx, _sender_rx) = member();
        let (a_tx, mut a_rx) = member();
        let (b_tx, mut b_rx) = member();
        table.join("s", "sender", sender_tx);
        table.join("s", "a", a_tx);
        table.join("s", "b", b_tx);

        let offer = SignalMessage::new("s", Some("a".to_owned()), &SignalPayload::message("x"));
        assert_eq!(table.route("sender", offer), Ok(1));

        let delivered = signal_of(a_rx.try_recv().unwrap());
        assert_eq!(delivered.peer_id.as_deref(), Some("sender"));
        assert!(b_rx.try_recv().is_err());
    }

    #[test]
    fn untargeted_signal_reaches_everyone_else() {
        let mut table = SessionTable::new();
        let (typed_tx, mut typed_rx) = member();
        let (display_tx, mut display_rx) = member();
        table.join("s", "typed", typed_tx);
        table.join("s", "display", display_tx);

        let message = SignalMessage::new("s", None, &SignalPayload::message("hi"));
        assert_eq!(table.route("typed", message), Ok(1));
        assert_eq!(signal_of(display_rx.try_recv().unwrap()).peer_id.as_deref(), Some("typed"));
        assert!(typed_rx.try_recv().is_err());
    }

    #[test]
    fn routing_requires_membership_and_known_target() {
        let mut table = SessionTable::new();
        let (tx, _rx) = member();
        let message =
            SignalMessage::new("s", Some("ghost".to_owned()), &SignalPayload::ChannelConnected);

        assert_eq!(table.route("stranger", message.clone()), Err(RouteError::NotInSession));
        table.join("s", "sender", tx);
        let unknown = RouteError::UnknownTarget("ghost".to_owned());
        assert_eq!(table.route("sender", message), Err(unknown));
    }

    #[test]
    fn sessions_are_isolated_and_dropped_when_empty() {
        let mut table = SessionTable::new();
        let (a_tx, mut a_rx) = member();
        let (b_tx, _b_rx) = member();
        table.join("one", "a", a_tx.clone());
        table.join("two", "b", b_tx);
        assert_eq!(a_rx.try_recv().ok(), None);
        assert_eq!(table.session_count(), 2);

        // switching sessions leaves the old one
        table.join("two", "a", a_tx);
        assert_eq!(table.session_of("a"), Some("two"));
        assert_eq!(table.session_count(), 1);
        assert_eq!(table.member_count("two"), 2);

        assert_eq!(table.leave("a"), Some("two".to_owned()));
        assert_eq!(table.leave("b"), Some("two".to_owned()));
        assert_eq!(table.session_count(), 0);
        assert_eq!(table.leave("b"), None);
    }
}
