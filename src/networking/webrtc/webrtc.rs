use std::sync::Arc;

use async_trait::async_trait;
use clipcast_shared::{IceCandidate, SessionDescription};
use tokio::sync::Mutex;
#[cfg(debug_assertions)]
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::{
    api::{
        API, APIBuilder, interceptor_registry::register_default_interceptors,
        media_engine::MediaEngine,
    },
    data_channel::{
        RTCDataChannel, data_channel_message::DataChannelMessage,
        data_channel_state::RTCDataChannelState,
    },
    ice_transport::{
        ice_candidate::{RTCIceCandidate, RTCIceCandidateInit},
        ice_server::RTCIceServer,
    },
    interceptor::registry::Registry,
    peer_connection::{
        RTCPeerConnection, configuration::RTCConfiguration,
        peer_connection_state::RTCPeerConnectionState,
        sdp::session_description::RTCSessionDescription,
    },
};

use crate::{
    networking::webrtc::{WebRTCError, WebRTCResult},
    peer::{PeerEventSink, PeerTransport, Role, TransportEvent, TransportFactory},
};

type ChannelSlot = Arc<Mutex<Option<Arc<RTCDataChannel>>>>;

/// Builds data-channel-only peer connections that share one API instance.
pub struct WebRTCFactory {
    api: API,
    config: RTCConfiguration,
    channel_label: String,
}

impl WebRTCFactory {
    pub fn new(stun_servers: &[String], channel_label: impl Into<String>) -> WebRTCResult<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(WebRTCError::CodecError)?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(WebRTCError::CodecError)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = if stun_servers.is_empty() {
            Vec::new()
        } else {
            vec![RTCIceServer { urls: stun_servers.to_vec(), ..Default::default() }]
        };
        let config = RTCConfiguration { ice_servers, ..Default::default() };

        Ok(Self { api, config, channel_label: channel_label.into() })
    }
}

#[async_trait]
impl TransportFactory for WebRTCFactory {
    async fn create(
        &self,
        role: Role,
        events: PeerEventSink,
    ) -> WebRTCResult<Box<dyn PeerTransport>> {
        let peer_connection = self
            .api
            .new_peer_connection(self.config.clone())
            .await
            .map_err(WebRTCError::PeerConnectionError)?;
        let peer_connection = Arc::new(peer_connection);
        let channel: ChannelSlot = Arc::default();

        match role {
            Role::Initiator => {
                let data_channel = peer_connection
                    .create_data_channel(&self.channel_label, None)
                    .await
                    .map_err(WebRTCError::DataChannelError)?;
                wire_channel(&data_channel, events.clone());
                *channel.lock().await = Some(data_channel);
            }
            Role::Responder => {
                let slot = channel.clone();
                let channel_events = events.clone();
                peer_connection.on_data_channel(Box::new(move |data_channel: Arc<RTCDataChannel>| {
                    tracing::debug!("Remote opened data channel '{}'", data_channel.label());
                    let slot = slot.clone();
                    let events = channel_events.clone();
                    Box::pin(async move { adopt_channel(&slot, data_channel, events).await })
                }));
            }
        }

        let candidate_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            Box::pin(async move {
                let Some(candidate) = c else {
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        events.send(TransportEvent::LocalCandidate(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_mline_index: init.sdp_mline_index,
                            username_fragment: init.username_fragment,
                        }));
                    }
                    Err(e) => tracing::error!("Failed to serialize ICE candidate: {}", e),
                }
            })
        }));

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let peer_id = state_events.peer_id();
                tracing::debug!("Peer {} connection state has changed: {}", peer_id, s);
                if matches!(s, RTCPeerConnectionState::Failed | RTCPeerConnectionState::Closed) {
                    state_events.send(TransportEvent::ConnectionLost);
                }
                Box::pin(async {})
            },
        ));

        #[cfg(debug_assertions)]
        peer_connection.on_ice_connection_state_change(Box::new(|s: RTCIceConnectionState| {
            tracing::debug!("ICE Connection State has changed: {}", s);
            Box::pin(async {})
        }));

        tracing::info!("Peer connection created for {} as {:?}.", events.peer_id(), role);

        Ok(Box::new(WebRTCTransport { peer_connection, channel }))
    }
}
/// Stores a remotely opened channel before wiring it, so `send_text` already
/// finds it when `ChannelOpen` is handled.
async fn adopt_channel(slot: &ChannelSlot, channel: Arc<RTCDataChannel>, events: PeerEventSink) {
    *slot.lock().await = Some(channel.clone());
    wire_channel(&channel, events);
}

fn wire_channel(channel: &Arc<RTCDataChannel>, events: PeerEventSink) {
    let label = channel.label().to_owned();

    let open_events = events.clone();
    channel.on_open(Box::new(move || {
        tracing::info!("Data channel '{}' to {} is open", label, open_events.peer_id());
        open_events.send(TransportEvent::ChannelOpen);
        Box::pin(async {})
    }));

    let close_events = events.clone();
    channel.on_close(Box::new(move || {
        close_events.send(TransportEvent::ChannelClosed);
        Box::pin(async {})
    }));

    channel.on_message(Box::new(move |msg: DataChannelMessage| {
        match String::from_utf8(msg.data.to_vec()) {
            Ok(text) => {
                events.send(TransportEvent::Message(text));
            }
            Err(e) => tracing::warn!("Dropping non-UTF-8 frame from {}: {}", events.peer_id(), e),
        }
        Box::pin(async {})
    }));
}

fn to_rtc(description: SessionDescription) -> WebRTCResult<RTCSessionDescription> {
    match description.sdp_type.as_str() {
        "offer" => RTCSessionDescription::offer(description.sdp).map_err(WebRTCError::SdpError),
        "answer" => RTCSessionDescription::answer(description.sdp).map_err(WebRTCError::SdpError),
        other => Err(WebRTCError::UnsupportedSdpType(other.to_owned())),
    }
}

fn from_rtc(description: RTCSessionDescription) -> SessionDescription {
    SessionDescription { sdp_type: description.sdp_type.to_string(), sdp: description.sdp }
}

/// One peer connection and the data channel it carries.
pub struct WebRTCTransport {
    peer_connection: Arc<RTCPeerConnection>,
    channel: ChannelSlot,
}

#[async_trait]
impl PeerTransport for WebRTCTransport {
    async fn create_offer(&self) -> WebRTCResult<SessionDescription> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .map_err(WebRTCError::PeerConnectionError)?;
        Ok(from_rtc(offer))
    }

    async fn create_answer(&self) -> WebRTCResult<SessionDescription> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .map_err(WebRTCError::PeerConnectionError)?;
        Ok(from_rtc(answer))
    }

    async fn set_local_description(&self, description: SessionDescription) -> WebRTCResult<()> {
        self.peer_connection
            .set_local_description(to_rtc(description)?)
            .await
            .map_err(WebRTCError::PeerConnectionError)
    }

    async fn set_remote_description(&self, description: SessionDescription) -> WebRTCResult<()> {
        self.peer_connection
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(WebRTCError::PeerConnectionError)
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> WebRTCResult<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .map_err(WebRTCError::PeerConnectionError)
    }

    async fn send_text(&self, text: &str) -> WebRTCResult<()> {
        let channel = self.channel.lock().await.clone().ok_or(WebRTCError::ChannelNotOpen)?;
        if channel.ready_state() != RTCDataChannelState::Open {
            return Err(WebRTCError::ChannelNotOpen);
        }
        channel.send_text(text.to_owned()).await.map_err(WebRTCError::DataChannelError)?;
        Ok(())
    }

    async fn close(&self) -> WebRTCResult<()> {
        self.peer_connection.close().await.map_err(WebRTCError::PeerConnectionError)
    }
}
