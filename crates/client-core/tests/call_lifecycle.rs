//! End-to-end lifecycle tests: the real orchestrator, session manager,
//! bridge, and adapter, driven by the fake media engine and signaling
//! client.

use async_trait::async_trait;
use crossline_client_core::{
    CallClient, CallEventHandler, CallState, ClientConfig, ClientError, InvitationInfo,
    MediaStream, RegistrationData,
};
use crossline_media_core::testing::FakeMediaEngine;
use crossline_media_core::{IceConnectionState, PeerConnection};
use crossline_session_core::testing::FakeSignalingClient;
use crossline_session_core::SessionState;
use crossline_session_core::SignalingSession;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingHandler {
    states: Mutex<Vec<CallState>>,
    local_streams: Mutex<Vec<MediaStream>>,
    remote_streams: Mutex<Vec<MediaStream>>,
    invitations: Mutex<Vec<InvitationInfo>>,
    refers: AtomicUsize,
    ended: AtomicUsize,
}

#[async_trait]
impl CallEventHandler for RecordingHandler {
    async fn on_call_state_changed(&self, state: CallState) {
        self.states.lock().push(state);
    }

    async fn on_local_stream(&self, stream: MediaStream) {
        self.local_streams.lock().push(stream);
    }

    async fn on_remote_stream(&self, stream: MediaStream) {
        self.remote_streams.lock().push(stream);
    }

    async fn on_invitation(&self, info: InvitationInfo) {
        self.invitations.lock().push(info);
    }

    async fn on_refer(&self) {
        self.refers.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_ended(&self) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

impl RecordingHandler {
    fn states(&self) -> Vec<CallState> {
        self.states.lock().clone()
    }
}

struct Fixture {
    client: CallClient,
    engine: Arc<FakeMediaEngine>,
    signaling: Arc<FakeSignalingClient>,
    handler: Arc<RecordingHandler>,
}

fn fixture_with(engine: FakeMediaEngine, signaling: FakeSignalingClient) -> Fixture {
    let engine = Arc::new(engine);
    let signaling = Arc::new(signaling);
    let handler = Arc::new(RecordingHandler::default());
    let config = ClientConfig::new().with_negotiation_timeout(Duration::from_millis(500));
    let client = CallClient::new(config, engine.clone(), signaling.clone(), handler.clone());
    Fixture {
        client,
        engine,
        signaling,
        handler,
    }
}

fn fixture() -> Fixture {
    fixture_with(FakeMediaEngine::new(), FakeSignalingClient::new())
}

fn registration() -> RegistrationData {
    RegistrationData::new("pbx.example.com", "1004")
        .with_credentials("alice", "secret")
        .with_ws_url("wss://pbx.example.com:7443")
}

async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for: {what}");
}

impl Fixture {
    async fn register(&self) {
        self.client.register(registration()).await.unwrap();
        wait_until("registered state", || {
            self.client.current_state() == CallState::Registered
        })
        .await;
    }

    /// Register, place a call, and drive ICE to connected.
    async fn establish_call(&self) {
        self.register().await;
        self.client.call("42").await.unwrap();
        wait_until("signaling established", || {
            self.signaling
                .last_session()
                .map_or(false, |s| s.state() == SessionState::Established)
        })
        .await;
        self.engine
            .last_connection()
            .unwrap()
            .set_ice_connection_state(IceConnectionState::Connected);
        wait_until("connected state", || {
            self.client.current_state() == CallState::Connected
        })
        .await;
    }
}

#[tokio::test]
async fn registration_reaches_the_registred_state() {
    let fx = fixture();
    fx.register().await;
    assert_eq!(
        fx.handler.states(),
        vec![CallState::Registering, CallState::Registered]
    );
    assert_eq!(fx.client.current_state().to_string(), "registred");
}

#[tokio::test]
async fn refused_registration_reverts_to_unregistered() {
    let fx = fixture_with(
        FakeMediaEngine::new(),
        FakeSignalingClient::new().refuse_registration(),
    );
    fx.client.register(registration()).await.unwrap();
    wait_until("unregistered again", || {
        fx.client.current_state() == CallState::Unregistered
    })
    .await;
    assert_eq!(
        fx.handler.states(),
        vec![CallState::Registering, CallState::Unregistered]
    );
}

#[tokio::test]
async fn call_requires_registration() {
    let fx = fixture();
    let err = fx.client.call("42").await.unwrap_err();
    assert!(matches!(err, ClientError::NotRegistered));
}

#[tokio::test]
async fn outbound_call_prepares_media_before_negotiating() {
    let fx = fixture();
    fx.establish_call().await;

    // The engine saw: connection creation, then capture, then negotiation.
    let ops = fx.engine.operations();
    let connection = ops.iter().position(|o| *o == "createPeerConnection").unwrap();
    let capture = ops.iter().position(|o| *o == "getUserMedia").unwrap();
    let negotiate = ops.iter().position(|o| *o == "createOffer").unwrap();
    assert!(connection < capture && capture < negotiate);

    // The local stream was surfaced exactly once.
    assert_eq!(fx.handler.local_streams.lock().len(), 1);

    // The scripted remote answer was applied.
    let pc = fx.engine.last_connection().unwrap();
    assert!(pc.remote_description().is_some());
}

#[tokio::test]
async fn facade_states_progress_in_order() {
    let fx = fixture();
    fx.establish_call().await;
    fx.client.disconnect().await.unwrap();
    wait_until("disconnected state", || {
        fx.client.current_state() == CallState::Disconnected
    })
    .await;

    assert_eq!(
        fx.handler.states(),
        vec![
            CallState::Registering,
            CallState::Registered,
            CallState::Connecting,
            CallState::Connected,
            CallState::Disconnected,
        ]
    );
}

#[tokio::test]
async fn second_call_is_rejected_not_queued() {
    let fx = fixture();
    fx.establish_call().await;
    let err = fx.client.call("43").await.unwrap_err();
    assert!(matches!(err, ClientError::CallInProgress));
}

#[tokio::test]
async fn disconnect_always_releases_local_media() {
    let fx = fixture();
    fx.establish_call().await;

    let stream = fx.handler.local_streams.lock()[0].clone();
    assert!(stream.tracks().iter().all(|t| !t.is_stopped()));

    fx.client.disconnect().await.unwrap();
    wait_until("local media released", || {
        stream.tracks().iter().all(|t| t.is_stopped())
    })
    .await;
}

#[tokio::test]
async fn remote_hangup_surfaces_ended() {
    let fx = fixture();
    fx.establish_call().await;

    fx.signaling
        .last_session()
        .unwrap()
        .push_state(SessionState::Terminated);
    wait_until("ended state", || fx.client.current_state() == CallState::Ended).await;
    assert_eq!(fx.handler.ended.load(Ordering::SeqCst), 1);

    let stream = fx.handler.local_streams.lock()[0].clone();
    assert!(stream.tracks().iter().all(|t| t.is_stopped()));
}

#[tokio::test]
async fn remote_stream_is_surfaced_exactly_once() {
    let fx = fixture();
    fx.establish_call().await;

    let pc = fx.engine.last_connection().unwrap();
    pc.inject_remote_stream(MediaStream::new(vec![]));
    pc.inject_remote_stream(MediaStream::new(vec![]));
    wait_until("remote stream surfaced", || {
        !fx.handler.remote_streams.lock().is_empty()
    })
    .await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(fx.handler.remote_streams.lock().len(), 1);
}

#[tokio::test]
async fn ice_failure_recovers_without_facade_involvement() {
    let fx = fixture();
    fx.establish_call().await;

    let pc = fx.engine.last_connection().unwrap();
    pc.set_ice_connection_state(IceConnectionState::Failed);
    wait_until("automatic ICE restart", || pc.ice_restart_count() == 1).await;
    // The facade saw no state change out of connected.
    assert_eq!(fx.client.current_state(), CallState::Connected);
}

#[tokio::test]
async fn invitation_is_deferred_to_the_consumer() {
    let fx = fixture();
    fx.register().await;

    let invitation = fx.signaling.push_invitation("sip:7001@pbx.example.com");
    wait_until("invitation surfaced", || {
        !fx.handler.invitations.lock().is_empty()
    })
    .await;
    assert_eq!(
        fx.handler.invitations.lock()[0].from,
        "sip:7001@pbx.example.com"
    );
    // Nothing accepted yet.
    assert_eq!(invitation.state(), SessionState::Initial);

    fx.client.accept().await.unwrap();
    wait_until("invitation established", || {
        invitation.state() == SessionState::Established
    })
    .await;

    // Inbound negotiation answered, not offered.
    let ops = fx.engine.operations();
    assert!(ops.contains(&"createAnswer"));
    assert!(!ops.contains(&"createOffer"));
}

#[tokio::test]
async fn invitation_can_be_rejected() {
    let fx = fixture();
    fx.register().await;

    let invitation = fx.signaling.push_invitation("sip:7001@pbx.example.com");
    wait_until("invitation surfaced", || {
        !fx.handler.invitations.lock().is_empty()
    })
    .await;

    fx.client.reject().await.unwrap();
    wait_until("invitation rejected", || {
        invitation.state() == SessionState::Terminated
    })
    .await;

    // The decision slot is spent.
    let err = fx.client.accept().await.unwrap_err();
    assert!(matches!(err, ClientError::NoPendingInvitation));
}

#[tokio::test]
async fn refer_notifications_reach_the_handler() {
    let fx = fixture();
    fx.register().await;
    fx.signaling.push_refer();
    wait_until("refer surfaced", || fx.handler.refers.load(Ordering::SeqCst) == 1).await;
}

#[tokio::test]
async fn media_denial_ends_the_call_attempt() {
    let fx = fixture();
    fx.engine.fail_media_acquisition();
    fx.register().await;
    fx.client.call("42").await.unwrap();

    wait_until("ended state", || fx.client.current_state() == CallState::Ended).await;
    assert_eq!(fx.handler.ended.load(Ordering::SeqCst), 1);
    assert!(fx.handler.local_streams.lock().is_empty());
}

#[tokio::test]
async fn reconnect_restarts_ice_and_reinvites() {
    let fx = fixture();
    fx.establish_call().await;
    let sessions_before = fx.signaling.last_session().unwrap().sent_bodies().len();

    fx.client.reconnect().await.unwrap();
    wait_until("re-invite negotiated", || {
        fx.signaling.last_session().unwrap().sent_bodies().len() > sessions_before
    })
    .await;
    assert!(fx.engine.last_connection().unwrap().ice_restart_count() >= 1);
}

#[tokio::test]
async fn end_twice_is_safe() {
    let fx = fixture();
    fx.establish_call().await;
    fx.client.end().await.unwrap();
    wait_until("client stopped", || !fx.signaling.is_started()).await;
    fx.client.end().await.unwrap();
}
