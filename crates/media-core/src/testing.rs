//! Deterministic in-process media engine for tests.
//!
//! `FakeMediaEngine` hands out `FakePeerConnection`s that follow the real
//! signaling-state machine (offer/answer transitions, gathering phases,
//! close) with fabricated but stable SDP text. Gathering latency and failure
//! modes are configurable per engine so tests can drive the fast path, the
//! awaited path, and the timeout path.

use crate::engine::{
    MediaEngine, MediaStream, MediaTrack, PeerConnection, PeerConnectionEvent, RtcConfiguration,
    SenderId,
};
use crate::error::{MediaError, MediaResult};
use crate::sdp::{
    IceConnectionState, IceGatheringState, MediaConstraints, SdpKind, SessionDescription,
    SignalingState,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

const CANDIDATE_LINES: &str =
    "a=candidate:1 1 UDP 2122252543 192.0.2.1 49152 typ host\r\na=end-of-candidates\r\n";

/// How a fake connection completes ICE gathering after a local description
/// is committed.
#[derive(Debug, Clone, Copy)]
enum GatheringMode {
    /// Complete synchronously inside `set_local_description`.
    Instant,
    /// Complete after the given delay.
    Delayed(Duration),
    /// Never complete (exercises the timeout path).
    Stalled,
}

struct Inner {
    signaling: SignalingState,
    gathering: IceGatheringState,
    ice: IceConnectionState,
    local: Option<SessionDescription>,
    remote: Option<SessionDescription>,
    senders: Vec<(SenderId, MediaTrack)>,
}

/// Scripted peer connection.
pub struct FakePeerConnection {
    config: RtcConfiguration,
    mode: GatheringMode,
    inner: Arc<Mutex<Inner>>,
    events: broadcast::Sender<PeerConnectionEvent>,
    offer_seq: AtomicU32,
    restarts: AtomicU32,
    ops: Arc<Mutex<Vec<&'static str>>>,
}

impl FakePeerConnection {
    fn new(
        config: RtcConfiguration,
        mode: GatheringMode,
        ops: Arc<Mutex<Vec<&'static str>>>,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            config,
            mode,
            inner: Arc::new(Mutex::new(Inner {
                signaling: SignalingState::Stable,
                gathering: IceGatheringState::New,
                ice: IceConnectionState::New,
                local: None,
                remote: None,
                senders: Vec::new(),
            })),
            events,
            offer_seq: AtomicU32::new(0),
            restarts: AtomicU32::new(0),
            ops,
        }
    }

    /// The configuration this connection was created with.
    pub fn config(&self) -> RtcConfiguration {
        self.config.clone()
    }

    /// Number of ICE restarts requested on this connection.
    pub fn ice_restart_count(&self) -> u32 {
        self.restarts.load(Ordering::SeqCst)
    }

    /// Drive the ICE connection state from a test.
    pub fn set_ice_connection_state(&self, state: IceConnectionState) {
        self.inner.lock().ice = state;
        let _ = self
            .events
            .send(PeerConnectionEvent::IceConnectionStateChanged(state));
    }

    /// Deliver a remote media stream from a test.
    pub fn inject_remote_stream(&self, stream: MediaStream) {
        let _ = self.events.send(PeerConnectionEvent::RemoteTrack(stream));
    }

    fn emit_signaling(&self, state: SignalingState) {
        let _ = self
            .events
            .send(PeerConnectionEvent::SignalingStateChanged(state));
    }

    fn sdp_body(&self, seq: u32) -> String {
        format!(
            "v=0\r\no=- 46465 {seq} IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
             a=ice-ufrag:f{seq}\r\n\
             m=audio 49152 UDP/TLS/RTP/SAVPF 111 0 8\r\n\
             a=rtpmap:111 opus/48000/2\r\na=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\n"
        )
    }

    fn begin_gathering(&self) {
        {
            self.inner.lock().gathering = IceGatheringState::Gathering;
        }
        let _ = self.events.send(PeerConnectionEvent::IceGatheringStateChanged(
            IceGatheringState::Gathering,
        ));
        match self.mode {
            GatheringMode::Instant => complete_gathering(&self.inner, &self.events),
            GatheringMode::Delayed(delay) => {
                let inner = self.inner.clone();
                let events = self.events.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    complete_gathering(&inner, &events);
                });
            }
            GatheringMode::Stalled => {}
        }
    }
}

fn complete_gathering(
    inner: &Arc<Mutex<Inner>>,
    events: &broadcast::Sender<PeerConnectionEvent>,
) {
    {
        let mut guard = inner.lock();
        if let Some(local) = guard.local.as_mut() {
            if !local.sdp.contains("a=candidate") {
                local.sdp.push_str(CANDIDATE_LINES);
            }
        }
        guard.gathering = IceGatheringState::Complete;
    }
    let _ = events.send(PeerConnectionEvent::IceGatheringStateChanged(
        IceGatheringState::Complete,
    ));
}

#[async_trait]
impl PeerConnection for FakePeerConnection {
    fn signaling_state(&self) -> SignalingState {
        self.inner.lock().signaling
    }

    fn ice_gathering_state(&self) -> IceGatheringState {
        self.inner.lock().gathering
    }

    fn ice_connection_state(&self) -> IceConnectionState {
        self.inner.lock().ice
    }

    fn local_description(&self) -> Option<SessionDescription> {
        self.inner.lock().local.clone()
    }

    fn remote_description(&self) -> Option<SessionDescription> {
        self.inner.lock().remote.clone()
    }

    async fn create_offer(&self, ice_restart: bool) -> MediaResult<SessionDescription> {
        self.ops.lock().push("createOffer");
        if self.signaling_state() == SignalingState::Closed {
            return Err(MediaError::ConnectionClosed);
        }
        if ice_restart {
            self.offer_seq.fetch_add(1, Ordering::SeqCst);
        }
        let seq = self.offer_seq.load(Ordering::SeqCst);
        Ok(SessionDescription::offer(self.sdp_body(seq)))
    }

    async fn create_answer(&self) -> MediaResult<SessionDescription> {
        self.ops.lock().push("createAnswer");
        let guard = self.inner.lock();
        if guard.signaling == SignalingState::Closed {
            return Err(MediaError::ConnectionClosed);
        }
        if guard.remote.is_none() {
            return Err(MediaError::Engine {
                reason: "cannot answer without a remote offer".to_string(),
            });
        }
        drop(guard);
        let seq = self.offer_seq.load(Ordering::SeqCst);
        Ok(SessionDescription::answer(self.sdp_body(seq)))
    }

    async fn set_local_description(&self, description: SessionDescription) -> MediaResult<()> {
        let next = {
            let mut guard = self.inner.lock();
            if guard.signaling == SignalingState::Closed {
                return Err(MediaError::ConnectionClosed);
            }
            guard.signaling = match description.kind {
                SdpKind::Offer => SignalingState::HaveLocalOffer,
                SdpKind::Answer => SignalingState::Stable,
            };
            guard.local = Some(description);
            guard.signaling
        };
        self.emit_signaling(next);
        self.begin_gathering();
        Ok(())
    }

    async fn set_remote_description(&self, description: SessionDescription) -> MediaResult<()> {
        let next = {
            let mut guard = self.inner.lock();
            if guard.signaling == SignalingState::Closed {
                return Err(MediaError::ConnectionClosed);
            }
            guard.signaling = match description.kind {
                SdpKind::Offer => SignalingState::HaveRemoteOffer,
                SdpKind::Answer => SignalingState::Stable,
            };
            guard.remote = Some(description);
            guard.signaling
        };
        self.emit_signaling(next);
        Ok(())
    }

    fn restart_ice(&self) {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        self.inner.lock().gathering = IceGatheringState::New;
    }

    fn senders(&self) -> Vec<SenderId> {
        self.inner.lock().senders.iter().map(|(id, _)| *id).collect()
    }

    async fn add_track(&self, track: MediaTrack) -> MediaResult<SenderId> {
        let id = Uuid::new_v4();
        self.inner.lock().senders.push((id, track));
        Ok(id)
    }

    async fn remove_sender(&self, sender: SenderId) -> MediaResult<()> {
        self.inner.lock().senders.retain(|(id, _)| *id != sender);
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PeerConnectionEvent> {
        self.events.subscribe()
    }

    fn close(&self) {
        {
            let mut guard = self.inner.lock();
            if guard.signaling == SignalingState::Closed {
                return;
            }
            guard.signaling = SignalingState::Closed;
        }
        self.emit_signaling(SignalingState::Closed);
    }
}

/// Scripted media engine.
pub struct FakeMediaEngine {
    mode: GatheringMode,
    fail_media: Mutex<bool>,
    connections: Mutex<Vec<Arc<FakePeerConnection>>>,
    ops: Arc<Mutex<Vec<&'static str>>>,
}

impl FakeMediaEngine {
    pub fn new() -> Self {
        Self {
            mode: GatheringMode::Instant,
            fail_media: Mutex::new(false),
            connections: Mutex::new(Vec::new()),
            ops: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Engine and connection operations in invocation order
    /// (`createPeerConnection`, `getUserMedia`, `createOffer`, ...).
    pub fn operations(&self) -> Vec<&'static str> {
        self.ops.lock().clone()
    }

    /// Complete ICE gathering only after `delay`.
    pub fn with_gathering_delay(mut self, delay: Duration) -> Self {
        self.mode = GatheringMode::Delayed(delay);
        self
    }

    /// Never complete ICE gathering.
    pub fn with_stalled_gathering(mut self) -> Self {
        self.mode = GatheringMode::Stalled;
        self
    }

    /// Make `get_user_media` fail, as a denied capture permission would.
    pub fn fail_media_acquisition(&self) {
        *self.fail_media.lock() = true;
    }

    /// Number of peer connections created over the engine's lifetime.
    pub fn connection_count(&self) -> usize {
        self.connections.lock().len()
    }

    /// The most recently created connection.
    pub fn last_connection(&self) -> Option<Arc<FakePeerConnection>> {
        self.connections.lock().last().cloned()
    }
}

#[async_trait]
impl MediaEngine for FakeMediaEngine {
    async fn create_peer_connection(
        &self,
        config: RtcConfiguration,
    ) -> MediaResult<Arc<dyn PeerConnection>> {
        self.ops.lock().push("createPeerConnection");
        let connection = Arc::new(FakePeerConnection::new(config, self.mode, self.ops.clone()));
        self.connections.lock().push(connection.clone());
        Ok(connection)
    }

    async fn get_user_media(&self, constraints: MediaConstraints) -> MediaResult<MediaStream> {
        self.ops.lock().push("getUserMedia");
        if *self.fail_media.lock() {
            return Err(MediaError::MediaAcquisition {
                reason: "capture permission denied".to_string(),
            });
        }
        Ok(MediaStream::from_constraints(constraints))
    }
}
