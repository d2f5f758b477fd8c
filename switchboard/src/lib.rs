mod sessions;
mod signaling_server;

pub use sessions::{Outbox, RouteError, SessionTable};
pub use signaling_server::SignalingServer;
