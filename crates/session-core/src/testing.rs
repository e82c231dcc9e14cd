//! Deterministic in-process signaling client for tests.
//!
//! `FakeSignalingClient` plays both the library and the remote party: an
//! outbound invite drives the supplied description handler through the real
//! offer/answer contract (get the local offer, deliver a scripted remote
//! answer), and `push_invitation` stages an inbound call whose `accept`
//! drives the handler through the inbound flow. Registration outcomes and
//! transient failures are scriptable.

use crate::error::{SessionError, SessionResult};
use crate::signaling::{
    ClientDelegate, DescriptionBody, DescriptionHandler, SignalingClient, SignalingSession,
};
use crate::types::{CallDirection, RegistrationData, SessionState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

const REMOTE_SDP: &str = "v=0\r\no=- 999 1 IN IP4 198.51.100.7\r\ns=-\r\nt=0 0\r\n\
                          m=audio 40000 UDP/TLS/RTP/SAVPF 0 8\r\n\
                          a=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\n";

/// Scripted signaling session (an Inviter or an Invitation).
pub struct FakeSignalingSession {
    direction: CallDirection,
    remote: String,
    state: Arc<watch::Sender<SessionState>>,
    handler: Mutex<Option<Arc<dyn DescriptionHandler>>>,
    /// The remote offer carried by an inbound invitation.
    remote_offer: Option<String>,
    /// Whether the scripted remote party answers outbound invites.
    auto_answer: bool,
    sent_bodies: Arc<Mutex<Vec<DescriptionBody>>>,
}

impl FakeSignalingSession {
    fn new(direction: CallDirection, remote: String, remote_offer: Option<String>, auto_answer: bool) -> Self {
        let (state, _) = watch::channel(SessionState::Initial);
        Self {
            direction,
            remote,
            state: Arc::new(state),
            handler: Mutex::new(None),
            remote_offer,
            auto_answer,
            sent_bodies: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Description bodies the "library" would have put on the wire.
    pub fn sent_bodies(&self) -> Vec<DescriptionBody> {
        self.sent_bodies.lock().clone()
    }

    /// Drive the session to a state from a test (e.g. a remote hangup).
    pub fn push_state(&self, state: SessionState) {
        let _ = self.state.send(state);
    }

    fn set_state(&self, state: SessionState) {
        // Record the transition unconditionally: a rejected/cancelled session
        // is never subscribed to, and `send` would drop the update (and leave
        // `state()` stale) when there are no receivers.
        self.state.send_replace(state);
    }

    fn spawn_outbound_negotiation(&self, handler: Arc<dyn DescriptionHandler>) {
        let state = self.state.clone();
        let sent = self.sent_bodies.clone();
        let auto_answer = self.auto_answer;
        tokio::spawn(async move {
            let _ = state.send(SessionState::Establishing);
            match handler.get_description(vec![]).await {
                Ok(body) => {
                    sent.lock().push(body);
                    if auto_answer {
                        if let Err(e) = handler
                            .set_description(REMOTE_SDP.to_string(), vec![])
                            .await
                        {
                            debug!(error = %e, "fake remote answer rejected");
                            handler.close();
                            let _ = state.send(SessionState::Terminated);
                            return;
                        }
                        let _ = state.send(SessionState::Established);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "fake invite negotiation failed");
                    handler.close();
                    let _ = state.send(SessionState::Terminated);
                }
            }
        });
    }
}

#[async_trait]
impl SignalingSession for FakeSignalingSession {
    fn remote_target(&self) -> String {
        self.remote.clone()
    }

    fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    async fn invite(&self) -> SessionResult<()> {
        let handler = self.handler.lock().clone().ok_or(SessionError::Signaling {
            reason: "no description handler attached".to_string(),
        })?;
        self.spawn_outbound_negotiation(handler);
        Ok(())
    }

    async fn accept(&self, handler: Arc<dyn DescriptionHandler>) -> SessionResult<()> {
        if self.direction != CallDirection::Incoming {
            return Err(SessionError::Signaling {
                reason: "accept on an outbound session".to_string(),
            });
        }
        let offer = self.remote_offer.clone().unwrap_or_else(|| REMOTE_SDP.to_string());
        *self.handler.lock() = Some(handler.clone());

        let state = self.state.clone();
        let sent = self.sent_bodies.clone();
        tokio::spawn(async move {
            let _ = state.send(SessionState::Establishing);
            if let Err(e) = handler.set_description(offer, vec![]).await {
                debug!(error = %e, "inbound offer rejected");
                handler.close();
                let _ = state.send(SessionState::Terminated);
                return;
            }
            match handler.get_description(vec![]).await {
                Ok(body) => {
                    sent.lock().push(body);
                    let _ = state.send(SessionState::Established);
                }
                Err(e) => {
                    debug!(error = %e, "inbound answer negotiation failed");
                    handler.close();
                    let _ = state.send(SessionState::Terminated);
                }
            }
        });
        Ok(())
    }

    async fn reject(&self) -> SessionResult<()> {
        self.set_state(SessionState::Terminated);
        Ok(())
    }

    async fn cancel(&self) -> SessionResult<()> {
        self.set_state(SessionState::Terminated);
        Ok(())
    }

    async fn bye(&self) -> SessionResult<()> {
        self.set_state(SessionState::Terminated);
        if let Some(handler) = self.handler.lock().clone() {
            handler.close();
        }
        Ok(())
    }
}

struct ClientInner {
    started: AtomicBool,
    delegate: Mutex<Option<Arc<dyn ClientDelegate>>>,
    registration: Mutex<Option<RegistrationData>>,
    sessions: Mutex<Vec<Arc<FakeSignalingSession>>>,
    register_failures: AtomicU32,
    refuse_registration: AtomicBool,
    auto_answer: AtomicBool,
}

/// Scripted signaling client.
pub struct FakeSignalingClient {
    inner: Arc<ClientInner>,
}

impl FakeSignalingClient {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ClientInner {
                started: AtomicBool::new(false),
                delegate: Mutex::new(None),
                registration: Mutex::new(None),
                sessions: Mutex::new(Vec::new()),
                register_failures: AtomicU32::new(0),
                refuse_registration: AtomicBool::new(false),
                auto_answer: AtomicBool::new(true),
            }),
        }
    }

    /// Fail the first `n` register attempts with a transient error.
    pub fn with_register_failures(self, n: u32) -> Self {
        self.inner.register_failures.store(n, Ordering::SeqCst);
        self
    }

    /// Refuse registration outright.
    pub fn refuse_registration(self) -> Self {
        self.inner.refuse_registration.store(true, Ordering::SeqCst);
        self
    }

    /// Leave outbound invites ringing (no scripted remote answer).
    pub fn without_auto_answer(self) -> Self {
        self.inner.auto_answer.store(false, Ordering::SeqCst);
        self
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }

    /// The registration record passed to `start`.
    pub fn registration(&self) -> Option<RegistrationData> {
        self.inner.registration.lock().clone()
    }

    /// Every session created so far, oldest first.
    pub fn sessions(&self) -> Vec<Arc<FakeSignalingSession>> {
        self.inner.sessions.lock().clone()
    }

    pub fn last_session(&self) -> Option<Arc<FakeSignalingSession>> {
        self.inner.sessions.lock().last().cloned()
    }

    /// Stage an inbound invitation from `from` and notify the delegate.
    pub fn push_invitation(&self, from: &str) -> Arc<FakeSignalingSession> {
        let session = Arc::new(FakeSignalingSession::new(
            CallDirection::Incoming,
            from.to_string(),
            Some(REMOTE_SDP.to_string()),
            true,
        ));
        self.inner.sessions.lock().push(session.clone());
        if let Some(delegate) = self.inner.delegate.lock().clone() {
            delegate.on_invitation(session.clone());
        }
        session
    }

    /// Notify the delegate of a referral.
    pub fn push_refer(&self) {
        if let Some(delegate) = self.inner.delegate.lock().clone() {
            delegate.on_refer();
        }
    }
}

impl Default for FakeSignalingClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingClient for FakeSignalingClient {
    async fn start(
        &self,
        registration: RegistrationData,
        delegate: Arc<dyn ClientDelegate>,
    ) -> SessionResult<()> {
        *self.inner.registration.lock() = Some(registration);
        *self.inner.delegate.lock() = Some(delegate);
        self.inner.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn register(&self) -> SessionResult<()> {
        if !self.is_started() {
            return Err(SessionError::Signaling {
                reason: "register before start".to_string(),
            });
        }
        if self.inner.refuse_registration.load(Ordering::SeqCst) {
            return Err(SessionError::Signaling {
                reason: "registration refused".to_string(),
            });
        }
        let remaining = self.inner.register_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.inner
                .register_failures
                .store(remaining - 1, Ordering::SeqCst);
            return Err(SessionError::Signaling {
                reason: "registrar unreachable".to_string(),
            });
        }
        if let Some(delegate) = self.inner.delegate.lock().clone() {
            delegate.on_registration_state(true);
        }
        Ok(())
    }

    async fn unregister(&self) -> SessionResult<()> {
        if let Some(delegate) = self.inner.delegate.lock().clone() {
            delegate.on_registration_state(false);
        }
        Ok(())
    }

    async fn invite(
        &self,
        target: &str,
        handler: Arc<dyn DescriptionHandler>,
    ) -> SessionResult<Arc<dyn SignalingSession>> {
        if !self.is_started() {
            return Err(SessionError::Signaling {
                reason: "invite before start".to_string(),
            });
        }
        let session = Arc::new(FakeSignalingSession::new(
            CallDirection::Outgoing,
            target.to_string(),
            None,
            self.inner.auto_answer.load(Ordering::SeqCst),
        ));
        *session.handler.lock() = Some(handler.clone());
        session.spawn_outbound_negotiation(handler);
        self.inner.sessions.lock().push(session.clone());
        Ok(session)
    }

    async fn stop(&self) -> SessionResult<()> {
        self.inner.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}
