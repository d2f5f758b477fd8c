use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use clipcast_shared::{Packet, RelayEvent};
use futures::{sink::SinkExt, stream::StreamExt};
use serde_json::json;
use tokio::{
    net::{TcpListener, ToSocketAddrs},
    sync::{RwLock, mpsc},
};

use crate::sessions::{RouteError, SessionTable};

const PING_TIMEOUT: Duration = Duration::from_secs(20);
const MAX_PAYLOAD: usize = 1_000_000;

#[derive(Debug)]
struct RelayState {
    sessions: SessionTable,
    ping_interval: Duration,
}

type SharedState = Arc<RwLock<RelayState>>;

#[derive(Debug, Clone)]
pub struct SignalingServer {
    state: SharedState,
}

impl SignalingServer {
    pub fn new(ping_interval: Duration) -> Self {
        let state = RelayState { sessions: SessionTable::new(), ping_interval };
        Self { state: Arc::new(RwLock::new(state)) }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/socket.io/", get(Self::ws_handler))
            .route("/", get(Self::ws_handler))
            .with_state(self.state.clone())
    }

    pub async fn listen(
        &self,
        listen_addr: impl ToSocketAddrs + std::fmt::Debug,
    ) -> anyhow::Result<()> {
        tracing::info!("Relay listening on {:?}", listen_addr);
        let listener = TcpListener::bind(listen_addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(&self, listener: TcpListener) -> anyhow::Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    pub async fn session_count(&self) -> usize {
        self.state.read().await.sessions.session_count()
    }

    async fn ws_handler(
        ws: WebSocketUpgrade,
        State(state): State<SharedState>,
    ) -> impl IntoResponse {
        ws.on_upgrade(|socket| Self::handle_socket(socket, state))
    }

    async fn handle_socket(socket: WebSocket, state: SharedState) {
        // The Engine.IO sid doubles as the peer id inside sessions.
        let peer_id = uuid::Uuid::new_v4().to_string();
        tracing::info!("New relay connection with ID: {}", peer_id);

        let (mut sender, mut receiver) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Packet>();
        let ping_interval = state.read().await.ping_interval;

        let handshake = json!({
            "sid": peer_id,
            "upgrades": [],
            "pingInterval": ping_interval.as_millis() as u64,
            "pingTimeout": PING_TIMEOUT.as_millis() as u64,
            "maxPayload": MAX_PAYLOAD,
        });
        if tx.send(Packet::Open(handshake)).is_err() {
            return;
        }

        // Writes queued packets to the socket and keeps the Engine.IO heartbeat going.
        let writer = tokio::spawn(async move {
            let mut heartbeat = tokio::time::interval(ping_interval);
            heartbeat.tick().await;
            loop {
                let packet = tokio::select! {
                    packet = rx.recv() => match packet {
                        Some(packet) => packet,
                        None => break,
                    },
                    _ = heartbeat.tick() => Packet::Ping,
                };
                let closing = matches!(packet, Packet::Disconnect | Packet::Close);
                if sender.send(Message::Text(packet.encode().into())).await.is_err() || closing {
                    break;
                }
            }
            let _ = sender.close().await;
        });

        while let Some(Ok(msg)) = receiver.next().await {
            let Message::Text(text) = msg else {
                continue;
            };
            let packet = match Packet::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::warn!("Dropping undecodable frame from {}: {}", peer_id, e);
                    continue;
                }
            };

            match packet {
                Packet::Connect(_) => {
                    let _ = tx.send(Packet::Connect(Some(json!({ "sid": peer_id }))));
                }
                Packet::Ping => {
                    let _ = tx.send(Packet::Pong);
                }
                Packet::Event { name, payload } => {
                    Self::handle_event(&state, &peer_id, &tx, &name, payload).await;
                }
                Packet::Disconnect | Packet::Close => break,
                Packet::Pong | Packet::Noop => {}
                other => tracing::debug!("Ignoring {:?} from {}", other, peer_id),
            }
        }

        tracing::info!("Peer {} disconnected", peer_id);
        {
            let mut state = state.write().await;
            if let Some(session_id) = state.sessions.leave(&peer_id) {
                tracing::debug!("Peer {} left session {}", peer_id, session_id);
            }
        }
        writer.abort();
    }

    async fn handle_event(
        state: &SharedState,
        peer_id: &str,
        tx: &mpsc::UnboundedSender<Packet>,
        name: &str,
        payload: serde_json::Value,
    ) {
        let event = match RelayEvent::from_event(name, payload) {
            Ok(Some(event)) => event,
            Ok(None) => {
                tracing::debug!("Ignoring unknown event '{}' from {}", name, peer_id);
                return;
            }
            Err(e) => {
                tracing::warn!("Malformed '{}' event from {}: {}", name, peer_id, e);
                return;
            }
        };

        match event {
            RelayEvent::JoinSession(session_id) => {
                let notified = state.write().await.sessions.join(&session_id, peer_id, tx.clone());
                tracing::info!(
                    "Peer {} joined session {} ({} peers notified)",
                    peer_id,
                    session_id,
                    notified
                );
            }
            RelayEvent::Signal(message) => {
                let result = state.read().await.sessions.route(peer_id, message);
                match result {
                    Ok(delivered) => {
                        tracing::debug!("Routed signal from {} to {} peers", peer_id, delivered)
                    }
                    Err(RouteError::NotInSession) => {
                        tracing::warn!("Peer {} sent a signal before joining a session", peer_id);
                    }
                    Err(RouteError::UnknownTarget(target)) => {
                        tracing::warn!("Target peer {} not found", target);
                    }
                }
            }
            RelayEvent::PeerJoined(_) => {
                tracing::debug!("Ignoring client-sent peerJoined from {}", peer_id);
            }
        }
    }
}
