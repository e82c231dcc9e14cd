//! The media engine seam.
//!
//! The physical engine - capture devices, codecs, the real ICE stack - is an
//! external collaborator. These traits describe exactly the surface the
//! adapter needs from it, in the shape of the browser-native peer-connection
//! API it fronts. Engine events arrive on a broadcast channel so the adapter
//! and the negotiation wait can subscribe independently.

use crate::error::MediaResult;
use crate::sdp::{
    IceConnectionState, IceGatheringState, MediaConstraints, MediaKind, SessionDescription,
    SignalingState,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Public STUN server used when the caller configures no ICE servers.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// One ICE server entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Peer connection configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RtcConfiguration {
    #[serde(default)]
    pub ice_servers: Vec<IceServer>,
}

impl RtcConfiguration {
    /// Fill in the default STUN entry when no ICE servers are configured.
    pub fn or_default_ice_servers(mut self) -> Self {
        if self.ice_servers.is_empty() {
            self.ice_servers.push(IceServer::stun(DEFAULT_STUN_SERVER));
        }
        self
    }
}

/// Identifier of an outbound RTP sender on a peer connection.
pub type SenderId = Uuid;

/// Handle to one local or remote media track.
///
/// The track payload itself never leaves the media engine; this handle only
/// carries identity, kind, and the stopped flag shared across clones.
#[derive(Debug, Clone)]
pub struct MediaTrack {
    id: Uuid,
    kind: MediaKind,
    stopped: Arc<AtomicBool>,
}

impl MediaTrack {
    pub fn new(kind: MediaKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// Stop the track. Visible through every clone of the handle.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Handle to a stream of media tracks.
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: Uuid,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: Uuid::new_v4(),
            tracks,
        }
    }

    /// A stream matching `constraints`, one track per enabled kind.
    pub fn from_constraints(constraints: MediaConstraints) -> Self {
        let mut tracks = Vec::new();
        if constraints.audio {
            tracks.push(MediaTrack::new(MediaKind::Audio));
        }
        if constraints.video {
            tracks.push(MediaTrack::new(MediaKind::Video));
        }
        Self::new(tracks)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Stop every track in the stream.
    pub fn stop_tracks(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}

/// Notifications emitted by a peer connection.
#[derive(Debug, Clone)]
pub enum PeerConnectionEvent {
    SignalingStateChanged(SignalingState),
    IceConnectionStateChanged(IceConnectionState),
    IceGatheringStateChanged(IceGatheringState),
    /// First media stream received from the remote party.
    RemoteTrack(MediaStream),
}

/// The peer-connection surface the adapter drives.
#[async_trait]
pub trait PeerConnection: Send + Sync {
    fn signaling_state(&self) -> SignalingState;
    fn ice_gathering_state(&self) -> IceGatheringState;
    fn ice_connection_state(&self) -> IceConnectionState;

    /// The committed local description, if any. After ICE gathering it
    /// includes the gathered candidates.
    fn local_description(&self) -> Option<SessionDescription>;
    fn remote_description(&self) -> Option<SessionDescription>;

    async fn create_offer(&self, ice_restart: bool) -> MediaResult<SessionDescription>;
    async fn create_answer(&self) -> MediaResult<SessionDescription>;
    async fn set_local_description(&self, description: SessionDescription) -> MediaResult<()>;
    async fn set_remote_description(&self, description: SessionDescription) -> MediaResult<()>;

    /// Request fresh ICE credentials on the live connection.
    fn restart_ice(&self);

    fn senders(&self) -> Vec<SenderId>;
    async fn add_track(&self, track: MediaTrack) -> MediaResult<SenderId>;
    async fn remove_sender(&self, sender: SenderId) -> MediaResult<()>;

    /// Subscribe to connection events from this point on.
    fn subscribe(&self) -> broadcast::Receiver<PeerConnectionEvent>;

    fn close(&self);
}

/// Factory surface of the media engine.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_peer_connection(
        &self,
        config: RtcConfiguration,
    ) -> MediaResult<Arc<dyn PeerConnection>>;

    /// Acquire local capture media. Denial or device unavailability is
    /// returned to the caller, not retried.
    async fn get_user_media(&self, constraints: MediaConstraints) -> MediaResult<MediaStream>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ice_servers_fill_only_when_empty() {
        let config = RtcConfiguration::default().or_default_ice_servers();
        assert_eq!(config.ice_servers.len(), 1);
        assert_eq!(config.ice_servers[0].urls, vec![DEFAULT_STUN_SERVER]);

        let custom = RtcConfiguration {
            ice_servers: vec![IceServer::stun("stun:stun.example.org:3478")],
        }
        .or_default_ice_servers();
        assert_eq!(custom.ice_servers.len(), 1);
        assert_eq!(custom.ice_servers[0].urls, vec!["stun:stun.example.org:3478"]);
    }

    #[test]
    fn stopping_a_stream_stops_clones_of_its_tracks() {
        let stream = MediaStream::from_constraints(MediaConstraints::audio_only());
        let clone = stream.clone();
        stream.stop_tracks();
        assert!(clone.tracks().iter().all(|t| t.is_stopped()));
    }
}
