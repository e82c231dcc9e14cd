//! Media negotiation layer for crossline.
//!
//! This crate owns the foreground half of a call: the peer connection and
//! the local/remote media streams. The actual media engine (capture, codecs,
//! ICE plumbing) is an external collaborator reached through the
//! [`MediaEngine`] / [`PeerConnection`] traits; what lives here is the
//! negotiation logic layered on top of it:
//!
//! - [`adapter::MediaEngineAdapter`] - creates and tracks one peer
//!   connection at a time, attaches local media, and runs the
//!   offer/answer + ICE-gathering algorithm that produces a local
//!   description ready to send
//! - [`modifier`] - the declared, ordered pipeline of SDP transforms every
//!   description passes through before being committed or sent
//! - [`sdp`] - plain value types shared with the signaling side
//!
//! With the `testing` feature a deterministic in-process engine is available
//! under [`testing`] for this crate's tests and for dependents.

pub mod adapter;
pub mod engine;
pub mod error;
pub mod modifier;
pub mod sdp;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use adapter::{AdapterEvent, AdapterEventKind, MediaEngineAdapter};
pub use engine::{
    IceServer, MediaEngine, MediaStream, MediaTrack, PeerConnection, PeerConnectionEvent,
    RtcConfiguration, SenderId, DEFAULT_STUN_SERVER,
};
pub use error::{MediaError, MediaResult};
pub use modifier::{apply_modifiers, ModifierError, SdpModifier};
pub use sdp::{
    IceConnectionState, IceGatheringState, MediaConstraints, MediaKind, SdpKind,
    SessionDescription, SignalingState,
};
