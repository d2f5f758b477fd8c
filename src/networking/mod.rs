pub mod signaling;
pub mod signaling_error;
pub mod webrtc;

pub use signaling::{SessionLink, SignalingChannel, SignalingEvent};
pub use signaling_error::SignalingError;
