//! The dispatch loop that ties relay signaling, peer connections and
//! outgoing text together.
//!
//! Everything that touches connection state runs on the loop in
//! [`RelayOrchestrator::run`]: relay events, transport callbacks, commands
//! from producers and retry timers all arrive as messages and are handled
//! one at a time.

mod relay_error;

use std::{collections::HashMap, sync::Arc, time::Duration};

use clipcast_shared::{ChannelMessage, SignalMessage, SignalPayload};
use tokio::sync::mpsc;

pub use relay_error::RelayError;

use crate::{
    display::TextRenderer,
    networking::{SessionLink, SignalingEvent, webrtc::WebRTCError},
    peer::{
        NegotiationState, PeerConnection, PeerError, PeerEvent, PeerEventSink, PeerRegistry, Role,
        TransportEvent, TransportFactory,
    },
    session_id::SessionId,
};

type Result<T> = std::result::Result<T, RelayError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Offers a data channel to every display that joins and pushes text to
    /// the open ones.
    Host,
    /// Answers offers and renders what arrives.
    Display,
    /// Skips WebRTC and sends text through the relay itself.
    Typed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Broadcast(String),
    Typing(String),
    Shutdown,
}

/// Cloneable entry point for producers. Sends never block.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl RelayHandle {
    pub fn new(tx: mpsc::UnboundedSender<Command>) -> Self {
        Self { tx }
    }

    /// Returns false once the orchestrator has stopped.
    pub fn broadcast(&self, text: impl Into<String>) -> bool {
        self.tx.send(Command::Broadcast(text.into())).is_ok()
    }

    pub fn typing(&self, content: impl Into<String>) -> bool {
        self.tx.send(Command::Typing(content.into())).is_ok()
    }

    pub fn shutdown(&self) {
        let _ = self.tx.send(Command::Shutdown);
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// How a host re-offers to a display whose connection was lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub interval: Duration,
    /// An offer that has not reached an open channel by then counts as a
    /// failed attempt.
    pub offer_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            interval: Duration::from_secs(5),
            offer_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug)]
enum Timer {
    Retry(String),
    OfferDeadline { peer_id: String, connection_id: u64 },
}

struct Inbox {
    signaling: mpsc::Receiver<SignalingEvent>,
    peers: mpsc::UnboundedReceiver<PeerEvent>,
    commands: mpsc::UnboundedReceiver<Command>,
    timers: mpsc::UnboundedReceiver<Timer>,
}

pub struct RelayOrchestrator {
    mode: Mode,
    link: SessionLink,
    factory: Arc<dyn TransportFactory>,
    renderer: Box<dyn TextRenderer>,
    registry: PeerRegistry,
    retry: RetryPolicy,
    attempts: HashMap<String, u32>,
    next_connection_id: u64,
    relay_connected: bool,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    timer_tx: mpsc::UnboundedSender<Timer>,
    inbox: Inbox,
}

impl RelayOrchestrator {
    pub fn new(
        mode: Mode,
        link: SessionLink,
        signaling: mpsc::Receiver<SignalingEvent>,
        factory: Arc<dyn TransportFactory>,
        renderer: Box<dyn TextRenderer>,
        retry: RetryPolicy,
    ) -> (Self, RelayHandle) {
        let (peer_tx, peers) = mpsc::unbounded_channel();
        let (timer_tx, timers) = mpsc::unbounded_channel();
        let (command_tx, commands) = mpsc::unbounded_channel();

        let orchestrator = Self {
            mode,
            link,
            factory,
            renderer,
            registry: PeerRegistry::new(),
            retry,
            attempts: HashMap::new(),
            next_connection_id: 0,
            relay_connected: true,
            peer_tx,
            timer_tx,
            inbox: Inbox { signaling, peers, commands, timers },
        };
        (orchestrator, RelayHandle::new(command_tx))
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session_id(&self) -> &SessionId {
        self.link.session_id()
    }

    pub fn registry(&self) -> &PeerRegistry {
        &self.registry
    }

    pub fn relay_connected(&self) -> bool {
        self.relay_connected
    }

    /// Runs until a shutdown command arrives or every [`RelayHandle`] is
    /// dropped, then closes all peers and leaves the relay.
    pub async fn run(mut self) -> Result<()> {
        self.start()?;

        loop {
            tokio::select! {
                command = self.inbox.commands.recv() => match command {
                    Some(Command::Broadcast(text)) => {
                        self.broadcast(&text).await;
                    }
                    Some(Command::Typing(content)) => {
                        self.typing(&content).await;
                    }
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.inbox.signaling.recv() => {
                    if let Err(e) = self.handle_signaling_event(event).await {
                        tracing::warn!("{}", e);
                    }
                }
                Some(event) = self.inbox.peers.recv() => {
                    if let Err(e) = self.handle_peer_event(event).await {
                        tracing::warn!("{}", e);
                    }
                }
                Some(timer) = self.inbox.timers.recv() => {
                    if let Err(e) = self.handle_timer(timer).await {
                        tracing::warn!("{}", e);
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Announces a typed session to whoever is already listening.
    pub fn start(&mut self) -> Result<()> {
        tracing::info!("Serving session {} as {:?}", self.link.session_id(), self.mode);
        if self.mode == Mode::Typed {
            self.link.broadcast(&SignalPayload::ChannelConnected)?;
        }
        Ok(())
    }

    pub async fn handle_signaling_event(&mut self, event: SignalingEvent) -> Result<()> {
        match event {
            SignalingEvent::PeerJoined(peer_id) => self.handle_peer_joined(peer_id).await,
            SignalingEvent::Signal(message) => self.handle_signal(message).await,
            SignalingEvent::Disconnected => {
                tracing::warn!("Lost the relay connection; open peers keep working");
                self.relay_connected = false;
                Ok(())
            }
        }
    }

    async fn handle_peer_joined(&mut self, peer_id: String) -> Result<()> {
        if self.mode != Mode::Host {
            tracing::debug!("Ignoring join of {} in {:?} mode", peer_id, self.mode);
            return Ok(());
        }
        tracing::info!("Display {} joined, sending offer", peer_id);
        self.attempts.remove(&peer_id);
        self.offer_to(&peer_id).await
    }

    async fn handle_signal(&mut self, message: SignalMessage) -> Result<()> {
        if message.session_id != self.link.session_id().as_str() {
            tracing::debug!("Ignoring signal for session {}", message.session_id);
            return Ok(());
        }
        let payload = message.payload()?;
        let kind = payload.kind();

        if !kind.is_negotiation() {
            return self.handle_relayed_text(message.peer_id.as_deref(), payload);
        }
        if self.mode == Mode::Typed {
            tracing::debug!("Ignoring {} in typed mode", kind);
            return Ok(());
        }
        let peer_id = message.peer_id.ok_or(RelayError::MissingPeerId { kind })?;

        match payload {
            SignalPayload::Offer(offer) => {
                let started = self.registry.get(&peer_id).map(PeerConnection::state);
                if started.is_some_and(|state| state != NegotiationState::New) {
                    tracing::info!("New offer from {}, replacing its connection", peer_id);
                    self.drop_peer(&peer_id).await;
                }

                let factory = self.factory.clone();
                let sink = self.sink_for(&peer_id);
                let connection = self
                    .registry
                    .get_or_create(&peer_id, || async move {
                        let connection_id = sink.connection_id();
                        let remote = sink.peer_id().to_owned();
                        let transport = factory.create(Role::Responder, sink).await?;
                        let connection =
                            PeerConnection::new(remote, connection_id, Role::Responder, transport);
                        Ok::<_, WebRTCError>(connection)
                    })
                    .await
                    .map_err(|source| RelayError::TransportError {
                        peer_id: peer_id.clone(),
                        source,
                    })?;

                let result = connection.accept_offer(offer, &self.link).await;
                self.check(&peer_id, result).await
            }
            SignalPayload::Answer(answer) => {
                let connection = self
                    .registry
                    .get_mut(&peer_id)
                    .ok_or_else(|| RelayError::UnknownPeer { peer_id: peer_id.clone(), kind })?;
                let result = connection.accept_answer(answer).await;
                self.check(&peer_id, result).await
            }
            SignalPayload::IceCandidate(candidate) => {
                let connection = self
                    .registry
                    .get_mut(&peer_id)
                    .ok_or_else(|| RelayError::UnknownPeer { peer_id: peer_id.clone(), kind })?;
                let result = connection.add_remote_candidate(candidate).await;
                self.check(&peer_id, result).await
            }
            _ => Ok(()),
        }
    }

    /// Text that came through the relay instead of a data channel.
    fn handle_relayed_text(&mut self, from: Option<&str>, payload: SignalPayload) -> Result<()> {
        let message = match payload {
            SignalPayload::Message { content, live_typing } => {
                ChannelMessage::Message { content, live_typing }
            }
            SignalPayload::Typing { content } => ChannelMessage::Typing { content },
            SignalPayload::ChannelConnected => ChannelMessage::ChannelConnected,
            other => {
                tracing::debug!("Unexpected relayed {}", other.kind());
                return Ok(());
            }
        };
        self.present(from.unwrap_or("relay"), message);
        Ok(())
    }

    pub async fn handle_peer_event(&mut self, event: PeerEvent) -> Result<()> {
        let PeerEvent { peer_id, connection_id, event } = event;
        let Some(connection) = self.registry.get_mut(&peer_id) else {
            tracing::debug!("Dropping {:?} for removed peer {}", event, peer_id);
            return Ok(());
        };
        if connection.connection_id() != connection_id {
            tracing::debug!("Dropping {:?} from a replaced connection to {}", event, peer_id);
            return Ok(());
        }

        match event {
            TransportEvent::LocalCandidate(candidate) => {
                let result = connection.on_local_candidate(candidate, &self.link);
                self.check(&peer_id, result).await
            }
            TransportEvent::ChannelOpen => {
                if connection.on_channel_open() {
                    self.on_peer_open(&peer_id).await;
                }
                Ok(())
            }
            TransportEvent::ChannelClosed | TransportEvent::ConnectionLost => {
                tracing::info!("Connection to {} lost", peer_id);
                connection.on_channel_closed().await;
                self.drop_peer(&peer_id).await;
                self.schedule_retry(&peer_id);
                Ok(())
            }
            TransportEvent::Message(text) => {
                self.present(&peer_id, ChannelMessage::decode(&text));
                Ok(())
            }
        }
    }

    async fn on_peer_open(&mut self, peer_id: &str) {
        tracing::info!("Data channel to {} is open", peer_id);
        self.attempts.remove(peer_id);

        if self.mode == Mode::Display {
            self.renderer.render_status("connected");
            if let Some(connection) = self.registry.get(peer_id) {
                let confirm = ChannelMessage::ChannelConnected.encode();
                if let Err(e) = connection.send_text(&confirm).await {
                    tracing::warn!("Failed to confirm channel to {}: {}", peer_id, e);
                }
            }
        }
    }

    fn present(&mut self, from: &str, message: ChannelMessage) {
        match (self.mode, message) {
            (Mode::Display, ChannelMessage::Message { content, .. }) => {
                self.renderer.render_text(&content)
            }
            (Mode::Display, ChannelMessage::Typing { content }) => {
                let status = if content.is_empty() {
                    "idle".to_owned()
                } else {
                    format!("typing: {content}")
                };
                self.renderer.render_status(&status);
            }
            (Mode::Display, ChannelMessage::ChannelConnected) => {
                self.renderer.render_status("sender connected")
            }
            (_, ChannelMessage::ChannelConnected) => tracing::info!("{} is ready", from),
            (mode, message) => {
                tracing::debug!("Ignoring {:?} from {} in {:?} mode", message, from, mode)
            }
        }
    }

    /// Sends `text` to every open peer, or through the relay in typed mode.
    /// Returns how many deliveries succeeded.
    pub async fn broadcast(&mut self, text: &str) -> usize {
        match self.mode {
            Mode::Host => self.send_to_open(&ChannelMessage::text(text)).await,
            Mode::Typed => self.relay(&SignalPayload::message(text)),
            Mode::Display => {
                tracing::warn!("Displays do not broadcast");
                0
            }
        }
    }

    pub async fn typing(&mut self, content: &str) -> usize {
        let content = content.to_owned();
        match self.mode {
            Mode::Host => self.send_to_open(&ChannelMessage::Typing { content }).await,
            Mode::Typed => self.relay(&SignalPayload::Typing { content }),
            Mode::Display => 0,
        }
    }

    async fn send_to_open(&self, message: &ChannelMessage) -> usize {
        let frame = message.encode();
        let mut delivered = 0;
        for peer in self.registry.open_peers() {
            match peer.send_text(&frame).await {
                Ok(()) => delivered += 1,
                Err(e) => tracing::warn!("Failed to send to {}: {}", peer.peer_id(), e),
            }
        }
        if delivered == 0 {
            tracing::info!("No open peers to send to");
        } else {
            tracing::debug!("Sent to {} peers", delivered);
        }
        delivered
    }

    fn relay(&self, payload: &SignalPayload) -> usize {
        match self.link.broadcast(payload) {
            Ok(()) => 1,
            Err(e) => {
                tracing::warn!("Failed to relay {}: {}", payload.kind(), e);
                0
            }
        }
    }

    async fn handle_timer(&mut self, timer: Timer) -> Result<()> {
        match timer {
            Timer::Retry(peer_id) => self.handle_retry(&peer_id).await,
            Timer::OfferDeadline { peer_id, connection_id } => {
                self.handle_offer_deadline(&peer_id, connection_id).await;
                Ok(())
            }
        }
    }

    pub async fn handle_retry(&mut self, peer_id: &str) -> Result<()> {
        if self.registry.contains(peer_id) {
            tracing::debug!("{} reconnected before its retry", peer_id);
            return Ok(());
        }
        tracing::info!("Re-offering to {}", peer_id);
        self.offer_to(peer_id).await
    }

    fn schedule_retry(&mut self, peer_id: &str) {
        if self.mode != Mode::Host {
            return;
        }
        let attempts = self.attempts.entry(peer_id.to_owned()).or_insert(0);
        if *attempts >= self.retry.max_retries {
            tracing::warn!("Giving up on {} after {} retries", peer_id, attempts);
            self.attempts.remove(peer_id);
            return;
        }
        *attempts += 1;

        self.fire_after(self.retry.interval, Timer::Retry(peer_id.to_owned()));
    }

    /// Gives up on an offer that never reached an open channel. A display
    /// that left and came back has a new id, so nothing would ever answer.
    async fn handle_offer_deadline(&mut self, peer_id: &str, connection_id: u64) {
        let expired = self.registry.get(peer_id).is_some_and(|connection| {
            connection.connection_id() == connection_id
                && connection.state() != NegotiationState::Open
        });
        if !expired {
            return;
        }
        tracing::info!("Offer to {} went unanswered for {:?}", peer_id, self.retry.offer_timeout);
        self.drop_peer(peer_id).await;
        self.schedule_retry(peer_id);
    }

    fn fire_after(&self, delay: Duration, timer: Timer) {
        let tx = self.timer_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(timer);
        });
    }

    async fn offer_to(&mut self, peer_id: &str) -> Result<()> {
        let sink = self.sink_for(peer_id);
        let connection_id = sink.connection_id();
        let transport = self
            .factory
            .create(Role::Initiator, sink)
            .await
            .map_err(|source| RelayError::TransportError { peer_id: peer_id.to_owned(), source })?;

        let connection = PeerConnection::new(peer_id, connection_id, Role::Initiator, transport);
        if let Some(mut evicted) = self.registry.insert(connection) {
            tracing::info!("Replacing existing connection to {}", peer_id);
            evicted.close().await;
        }

        self.fire_after(
            self.retry.offer_timeout,
            Timer::OfferDeadline { peer_id: peer_id.to_owned(), connection_id },
        );

        let Some(connection) = self.registry.get_mut(peer_id) else {
            return Ok(());
        };
        let result = connection.start_offer(&self.link).await;
        self.check(peer_id, result).await
    }

    fn sink_for(&mut self, peer_id: &str) -> PeerEventSink {
        self.next_connection_id += 1;
        PeerEventSink::new(peer_id, self.next_connection_id, self.peer_tx.clone())
    }

    /// Removes peers whose connection a fatal error just closed.
    async fn check(
        &mut self,
        peer_id: &str,
        result: std::result::Result<(), PeerError>,
    ) -> Result<()> {
        let Err(source) = result else {
            return Ok(());
        };
        if source.is_fatal() {
            self.drop_peer(peer_id).await;
        }
        Err(RelayError::NegotiationError { peer_id: peer_id.to_owned(), source })
    }

    async fn drop_peer(&mut self, peer_id: &str) {
        if let Some(mut connection) = self.registry.remove(peer_id) {
            connection.close().await;
        }
    }

    pub async fn shutdown(&mut self) {
        tracing::info!("Shutting down session {}", self.link.session_id());
        for mut connection in self.registry.drain() {
            connection.close().await;
        }
        self.link.disconnect();
    }

    /// Handles everything already queued without waiting for more.
    #[cfg(test)]
    pub(crate) async fn pump(&mut self) {
        loop {
            if let Ok(event) = self.inbox.peers.try_recv() {
                let _ = self.handle_peer_event(event).await;
            } else if let Ok(timer) = self.inbox.timers.try_recv() {
                let _ = self.handle_timer(timer).await;
            } else {
                break;
            }
        }
    }
}
