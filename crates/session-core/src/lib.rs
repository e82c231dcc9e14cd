//! Signaling session layer for crossline.
//!
//! This crate is the background half of a call. It owns the signaling
//! library seam ([`signaling`]), the registration and call-lifecycle state
//! machine ([`manager::SessionManager`]), and the bridge that satisfies the
//! library's synchronous-looking session-description contract by awaiting
//! round trips to the media context ([`bridge::SessionDescriptionBridge`]).
//!
//! Nothing here touches a peer connection or a media stream. The only way
//! in or out of this context is the [`protocol::ChannelMessage`] vocabulary
//! flowing over the infra channel.

pub mod bridge;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod signaling;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use bridge::{BridgeEvent, BridgeEventKind, SessionDescriptionBridge};
pub use error::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use protocol::ChannelMessage;
pub use signaling::{
    ClientDelegate, DescriptionBody, DescriptionHandler, SignalingClient, SignalingSession,
    SDP_CONTENT_TYPE,
};
pub use types::{CallDirection, CallId, RegistrationData, SessionState};
