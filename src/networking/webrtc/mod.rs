pub mod webrtc;
mod webrtc_error;

pub use self::webrtc::{WebRTCFactory, WebRTCTransport};
pub use webrtc_error::{WebRTCError, WebRTCResult};
