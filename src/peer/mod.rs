pub mod connection;
#[cfg(test)]
pub(crate) mod mock;
pub mod registry;
pub mod transport;

pub use connection::{ChannelState, NegotiationState, PeerConnection, PeerError};
pub use registry::PeerRegistry;
pub use transport::{
    PeerEvent, PeerEventSink, PeerId, PeerTransport, Role, TransportEvent, TransportFactory,
};
