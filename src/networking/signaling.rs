use std::time::Duration;

use clipcast_shared::{Packet, RelayEvent, SignalMessage, SignalPayload};
use futures_util::{
    SinkExt, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

use crate::{networking::signaling_error::SignalingError, session_id::SessionId};

type Result<T> = std::result::Result<T, SignalingError>;
type RelaySocket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ENGINE_IO_QUERY: &str = "EIO=4&transport=websocket";

/// Inbound relay traffic, delivered in arrival order on the event channel
/// passed to [`SignalingChannel::connect`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalingEvent {
    PeerJoined(String),
    Signal(SignalMessage),
    /// Sent once; the channel never reconnects on its own.
    Disconnected,
}

/// Outbound half of the relay connection. Every send is a non-blocking
/// enqueue onto the writer task, so emission order is send order.
#[derive(Debug, Clone)]
pub struct SignalingChannel {
    to_server_tx: mpsc::UnboundedSender<Packet>,
}

impl SignalingChannel {
    pub fn new(to_server_tx: mpsc::UnboundedSender<Packet>) -> Self {
        Self { to_server_tx }
    }

    /// Connects to the relay and completes the Engine.IO handshake within
    /// `timeout`. Incoming events are sent to `event_tx`.
    pub async fn connect(
        url: &str,
        timeout: Duration,
        event_tx: mpsc::Sender<SignalingEvent>,
    ) -> Result<Self> {
        let url = engine_io_url(url);
        let (ws_stream, sid) = tokio::time::timeout(timeout, handshake(&url))
            .await
            .map_err(|_| SignalingError::Timeout(timeout))??;

        tracing::info!("Connected to relay at {} (sid {})", url, sid);

        let (write, read) = ws_stream.split();
        let (to_server_tx, to_server_rx) = mpsc::unbounded_channel::<Packet>();

        spawn_writer_task(to_server_rx, write);
        spawn_reader_task(read, to_server_tx.clone(), event_tx);

        Ok(Self::new(to_server_tx))
    }

    /// Not deduplicated; joining twice is left to the relay.
    pub fn join_session(&self, session_id: &SessionId) -> Result<()> {
        self.send_event(RelayEvent::JoinSession(session_id.to_string()))
    }

    pub fn emit_signal(&self, message: SignalMessage) -> Result<()> {
        self.send_event(RelayEvent::Signal(message))
    }

    pub fn disconnect(&self) {
        let _ = self.to_server_tx.send(Packet::Disconnect);
    }

    pub fn is_closed(&self) -> bool {
        self.to_server_tx.is_closed()
    }

    fn send_event(&self, event: RelayEvent) -> Result<()> {
        let packet = event.to_packet()?;
        self.to_server_tx.send(packet).map_err(|_| SignalingError::ChannelClosed)
    }
}

/// A [`SignalingChannel`] bound to the session this process joined.
#[derive(Debug, Clone)]
pub struct SessionLink {
    channel: SignalingChannel,
    session_id: SessionId,
}

impl SessionLink {
    pub fn new(channel: SignalingChannel, session_id: SessionId) -> Self {
        Self { channel, session_id }
    }

    pub fn join(channel: SignalingChannel, session_id: SessionId) -> Result<Self> {
        channel.join_session(&session_id)?;
        tracing::info!("Joined session {}", session_id);
        Ok(Self::new(channel, session_id))
    }

    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Sends a payload to one peer of the session.
    pub fn emit(&self, peer_id: &str, payload: &SignalPayload) -> Result<()> {
        let message =
            SignalMessage::new(self.session_id.as_str(), Some(peer_id.to_owned()), payload);
        self.channel.emit_signal(message)
    }

    /// Sends a payload to every other member of the session.
    pub fn broadcast(&self, payload: &SignalPayload) -> Result<()> {
        self.channel.emit_signal(SignalMessage::new(self.session_id.as_str(), None, payload))
    }

    pub fn disconnect(&self) {
        self.channel.disconnect();
    }
}

/// Points a plain relay address at its Engine.IO endpoint. URLs that already
/// carry an `EIO=` query are used as given.
pub fn engine_io_url(url: &str) -> String {
    let url = if let Some(rest) = url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        url.to_owned()
    };

    if url.contains("EIO=") {
        return url;
    }

    let (base, query) = match url.split_once('?') {
        Some((base, query)) => (base, Some(query)),
        None => (url.as_str(), None),
    };
    let base = base.trim_end_matches('/');
    let path = if base.ends_with("/socket.io") {
        format!("{base}/")
    } else {
        format!("{base}/socket.io/")
    };

    match query {
        Some(query) => format!("{path}?{ENGINE_IO_QUERY}&{query}"),
        None => format!("{path}?{ENGINE_IO_QUERY}"),
    }
}

async fn next_packet(ws_stream: &mut RelaySocket) -> Result<Packet> {
    while let Some(message) = ws_stream.next().await {
        match message? {
            Message::Text(text) => return Ok(Packet::decode(&text)?),
            Message::Close(_) => break,
            _ => continue,
        }
    }
    Err(SignalingError::HandshakeClosed)
}

/// Waits for the server's open packet, connects to the default namespace and
/// waits for the acknowledgement. Returns the session id the relay assigned.
async fn handshake(url: &str) -> Result<(RelaySocket, String)> {
    let (mut ws_stream, _) = connect_async(url).await?;

    let sid = loop {
        match next_packet(&mut ws_stream).await? {
            Packet::Open(handshake) => {
                let sid = handshake.get("sid").and_then(|sid| sid.as_str()).unwrap_or_default();
                break sid.to_owned();
            }
            Packet::Close => return Err(SignalingError::HandshakeClosed),
            other => tracing::debug!("Ignoring {:?} before the open packet", other),
        }
    };

    ws_stream.send(Message::Text(Packet::Connect(None).encode().into())).await?;

    loop {
        match next_packet(&mut ws_stream).await? {
            Packet::Connect(_) => break,
            Packet::ConnectError(reason) => return Err(SignalingError::Refused(reason.to_string())),
            Packet::Ping => {
                ws_stream.send(Message::Text(Packet::Pong.encode().into())).await?;
            }
            Packet::Close | Packet::Disconnect => return Err(SignalingError::HandshakeClosed),
            other => tracing::debug!("Ignoring {:?} during the handshake", other),
        }
    }

    Ok((ws_stream, sid))
}

fn spawn_writer_task(
    mut to_server_rx: mpsc::UnboundedReceiver<Packet>,
    mut write: SplitSink<RelaySocket, Message>,
) {
    tokio::spawn(async move {
        while let Some(packet) = to_server_rx.recv().await {
            let closing = packet == Packet::Disconnect;
            if write.send(Message::Text(packet.encode().into())).await.is_err() {
                tracing::error!("Failed to send packet to relay. WebSocket connection closed.");
                break;
            }
            if closing {
                let _ = write.close().await;
                break;
            }
        }
        tracing::info!("Signaling WebSocket writer task finished.");
    });
}

fn spawn_reader_task(
    mut read: SplitStream<RelaySocket>,
    to_server_tx: mpsc::UnboundedSender<Packet>,
    event_tx: mpsc::Sender<SignalingEvent>,
) {
    tokio::spawn(async move {
        while let Some(message) = read.next().await {
            let text = match message {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::error!("Error receiving from relay: {}", e);
                    break;
                }
            };

            let packet = match Packet::decode(&text) {
                Ok(packet) => packet,
                Err(e) => {
                    tracing::warn!("Failed to decode relay frame: {}", e);
                    continue;
                }
            };

            let event = match packet {
                Packet::Ping => {
                    let _ = to_server_tx.send(Packet::Pong);
                    continue;
                }
                Packet::Disconnect | Packet::Close => break,
                Packet::Event { name, payload } => match RelayEvent::from_event(&name, payload) {
                    Ok(Some(RelayEvent::PeerJoined(joined))) => {
                        SignalingEvent::PeerJoined(joined.peer_id)
                    }
                    Ok(Some(RelayEvent::Signal(message))) => SignalingEvent::Signal(message),
                    Ok(Some(RelayEvent::JoinSession(_))) | Ok(None) => {
                        tracing::debug!("Ignoring relay event '{}'", name);
                        continue;
                    }
                    Err(e) => {
                        tracing::warn!("Malformed '{}' event from relay: {}", name, e);
                        continue;
                    }
                },
                _ => continue,
            };

            if event_tx.send(event).await.is_err() {
                tracing::error!("Failed to forward relay event. Channel closed.");
                break;
            }
        }

        let _ = event_tx.send(SignalingEvent::Disconnected).await;
        tracing::info!("Signaling WebSocket reader task finished.");
    });
}
