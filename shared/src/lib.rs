mod channel_message;
mod event;
mod packet;
mod signal;

pub use channel_message::ChannelMessage;
pub use event::{JOIN_SESSION, PEER_JOINED, PeerJoined, RelayEvent, SIGNAL};
pub use packet::{Packet, PacketError};
pub use signal::{
    IceCandidate, PayloadError, SessionDescription, SignalKind, SignalMessage, SignalPayload,
};
