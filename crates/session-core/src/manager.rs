//! The signaling session manager.
//!
//! Runs as the background context's event loop: it owns the signaling
//! client, the registration flag, and the single active call session, and it
//! is the only component that both reads the cross-context channel and hears
//! the signaling library's delegate notifications. All state lives inside
//! the task; the foreground context can only reach it through messages.

use crate::bridge::{BridgeEventKind, SessionDescriptionBridge};
use crate::protocol::ChannelMessage;
use crate::signaling::{ClientDelegate, SignalingClient, SignalingSession};
use crate::types::{CallDirection, CallId, SessionState};
use crossline_infra_common::events::ListenerId;
use crossline_infra_common::{retry_with_backoff, Endpoint, RetryConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Notifications funneled into the manager loop from the delegate and the
/// per-call watcher tasks.
enum ManagerEvent {
    Invitation(Arc<dyn SignalingSession>),
    Refer,
    RegistrationState(bool),
    SessionEnded,
    BridgeClosed,
}

struct ManagerDelegate {
    events: mpsc::UnboundedSender<ManagerEvent>,
}

impl ClientDelegate for ManagerDelegate {
    fn on_invitation(&self, session: Arc<dyn SignalingSession>) {
        let _ = self.events.send(ManagerEvent::Invitation(session));
    }

    fn on_refer(&self) {
        let _ = self.events.send(ManagerEvent::Refer);
    }

    fn on_registration_state(&self, registered: bool) {
        let _ = self.events.send(ManagerEvent::RegistrationState(registered));
    }
}

/// The active call session. Exactly zero or one exists at a time.
struct ActiveCall {
    id: CallId,
    direction: CallDirection,
    session: Arc<dyn SignalingSession>,
    bridge: Arc<SessionDescriptionBridge>,
    bridge_listener: ListenerId<BridgeEventKind>,
    watch_task: JoinHandle<()>,
}

/// Background-context owner of registration and the call state machine.
pub struct SessionManager {
    client: Arc<dyn SignalingClient>,
    endpoint: Endpoint<ChannelMessage>,
    events_tx: mpsc::UnboundedSender<ManagerEvent>,
    events_rx: mpsc::UnboundedReceiver<ManagerEvent>,
    started: bool,
    registered: bool,
    active: Option<ActiveCall>,
    pending_invitation: Option<Arc<dyn SignalingSession>>,
    negotiation_timeout: Duration,
}

impl SessionManager {
    pub fn new(client: Arc<dyn SignalingClient>, endpoint: Endpoint<ChannelMessage>) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            client,
            endpoint,
            events_tx,
            events_rx,
            started: false,
            registered: false,
            active: None,
            pending_invitation: None,
            negotiation_timeout: crate::bridge::DEFAULT_NEGOTIATION_TIMEOUT,
        }
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }

    /// Run the background context until the foreground endpoint goes away.
    pub async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.endpoint.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        debug!("media context gone; stopping session manager");
                        break;
                    }
                },
                Some(event) = self.events_rx.recv() => self.handle_event(event).await,
            }
        }
    }

    async fn handle_message(&mut self, message: ChannelMessage) {
        debug!(kind = message.kind(), "channel message");
        match message {
            ChannelMessage::Register { registration } => {
                info!(extension = %registration.extension, "starting registration");
                if !self.started {
                    let delegate = Arc::new(ManagerDelegate {
                        events: self.events_tx.clone(),
                    });
                    if let Err(e) = self.client.start(registration, delegate).await {
                        error!(error = %e, "signaling client failed to start");
                        self.endpoint
                            .send(ChannelMessage::RegistrationState { registered: false });
                        return;
                    }
                    self.started = true;
                }
                let client = self.client.clone();
                let outcome = retry_with_backoff("register", RetryConfig::quick(), || {
                    let client = client.clone();
                    async move { client.register().await }
                })
                .await;
                if let Err(e) = outcome {
                    error!(error = %e, "registration failed");
                    self.endpoint
                        .send(ChannelMessage::RegistrationState { registered: false });
                }
                // Confirmation arrives through the delegate.
            }

            ChannelMessage::Call { number, media } => {
                if !self.registered {
                    warn!(%number, "call ignored: not registered");
                    return;
                }
                if self.active.is_some() || self.pending_invitation.is_some() {
                    warn!(%number, "call ignored: a session is already active");
                    return;
                }
                debug!(%number, audio = media.audio, video = media.video, "placing call");

                self.endpoint.send(ChannelMessage::InitPeerConnection);
                self.endpoint.send(ChannelMessage::GetMediaStream);

                let bridge = self.new_bridge(CallDirection::Outgoing);
                let listener = self.watch_bridge(&bridge);
                let client = self.client.clone();
                let invited = client.invite(&number, bridge.clone()).await;
                match invited {
                    Ok(session) => self.install_call(CallDirection::Outgoing, session, bridge, listener),
                    Err(e) => {
                        error!(error = %e, "invite failed");
                        bridge.events().off(listener);
                        self.endpoint.send(ChannelMessage::Ended);
                    }
                }
            }

            ChannelMessage::Accept { media } => {
                let Some(invitation) = self.pending_invitation.take() else {
                    warn!("accept ignored: no pending invitation");
                    return;
                };
                debug!(audio = media.audio, video = media.video, "accepting invitation");

                self.endpoint.send(ChannelMessage::InitPeerConnection);
                self.endpoint.send(ChannelMessage::GetMediaStream);

                let bridge = self.new_bridge(CallDirection::Incoming);
                let listener = self.watch_bridge(&bridge);
                let accepted = invitation.accept(bridge.clone()).await;
                match accepted {
                    Ok(()) => self.install_call(CallDirection::Incoming, invitation, bridge, listener),
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        bridge.events().off(listener);
                        self.endpoint.send(ChannelMessage::Ended);
                    }
                }
            }

            ChannelMessage::Reject => {
                let Some(invitation) = self.pending_invitation.take() else {
                    warn!("reject ignored: no pending invitation");
                    return;
                };
                if let Err(e) = invitation.reject().await {
                    warn!(error = %e, "reject failed");
                }
            }

            ChannelMessage::LocalDescription { description } => match &self.active {
                Some(call) => call.bridge.resolve_local_description(description),
                None => debug!("discarding local description for a destroyed session"),
            },

            ChannelMessage::PeerConnectionSignalingState { state } => {
                if let Some(call) = &self.active {
                    call.bridge.set_mirrored_state(state);
                }
            }

            ChannelMessage::Reconnect => {
                let Some(call) = &self.active else {
                    warn!("reconnect ignored: no active session");
                    return;
                };
                info!(call = %call.id, "re-inviting after reconnect");
                self.endpoint.send(ChannelMessage::InitPeerConnection);
                self.endpoint.send(ChannelMessage::GetMediaStream);
                if let Err(e) = call.session.invite().await {
                    error!(error = %e, "re-invite failed");
                }
            }

            ChannelMessage::Disconnect => {
                self.terminate_call().await;
            }

            ChannelMessage::EndSession => {
                self.terminate_call().await;
                if self.started {
                    if let Err(e) = self.client.unregister().await {
                        warn!(error = %e, "unregister failed");
                    }
                    if let Err(e) = self.client.stop().await {
                        warn!(error = %e, "signaling client stop failed");
                    }
                    self.started = false;
                }
                self.registered = false;
            }

            other => {
                debug!(kind = other.kind(), "message not addressed to the signaling context");
            }
        }
    }

    async fn handle_event(&mut self, event: ManagerEvent) {
        match event {
            ManagerEvent::RegistrationState(registered) => {
                info!(registered, "registration state changed");
                self.registered = registered;
                self.endpoint
                    .send(ChannelMessage::RegistrationState { registered });
            }

            ManagerEvent::Invitation(session) => {
                if self.active.is_some() || self.pending_invitation.is_some() {
                    // One session at a time: a second invitation is declined
                    // busy, never queued.
                    info!(from = %session.remote_target(), "busy; rejecting inbound invitation");
                    if let Err(e) = session.reject().await {
                        warn!(error = %e, "busy reject failed");
                    }
                    return;
                }
                info!(from = %session.remote_target(), "inbound invitation");
                let from = session.remote_target();
                self.pending_invitation = Some(session);
                self.endpoint.send(ChannelMessage::GotInvitation { from });
            }

            ManagerEvent::Refer => {
                self.endpoint.send(ChannelMessage::GotRefer);
            }

            ManagerEvent::SessionEnded => {
                info!("signaling session ended");
                self.cleanup_call();
            }

            ManagerEvent::BridgeClosed => {
                debug!("description handler closed by the signaling library");
                self.cleanup_call();
            }
        }
    }

    fn new_bridge(&self, direction: CallDirection) -> Arc<SessionDescriptionBridge> {
        Arc::new(
            SessionDescriptionBridge::new(direction, self.endpoint.sender())
                .with_timeout(self.negotiation_timeout),
        )
    }

    fn watch_bridge(&self, bridge: &Arc<SessionDescriptionBridge>) -> ListenerId<BridgeEventKind> {
        let events = self.events_tx.clone();
        bridge.events().on(BridgeEventKind::Closed, move |_| {
            let _ = events.send(ManagerEvent::BridgeClosed);
        })
    }

    fn install_call(
        &mut self,
        direction: CallDirection,
        session: Arc<dyn SignalingSession>,
        bridge: Arc<SessionDescriptionBridge>,
        bridge_listener: ListenerId<BridgeEventKind>,
    ) {
        let id = Uuid::new_v4();
        let watch_task = spawn_state_watch(id, session.state_changes(), self.events_tx.clone());
        debug!(call = %id, direction = ?direction, "session installed");
        self.active = Some(ActiveCall {
            id,
            direction,
            session,
            bridge,
            bridge_listener,
            watch_task,
        });
    }

    /// Send the termination appropriate to the session's phase, then clean
    /// up. Also declines a still-pending invitation.
    async fn terminate_call(&mut self) {
        if let Some(invitation) = self.pending_invitation.take() {
            if let Err(e) = invitation.reject().await {
                warn!(error = %e, "reject of pending invitation failed");
            }
        }
        if let Some(call) = &self.active {
            let result = match call.session.state() {
                SessionState::Initial | SessionState::Establishing => match call.direction {
                    CallDirection::Outgoing => call.session.cancel().await,
                    CallDirection::Incoming => call.session.reject().await,
                },
                SessionState::Established => call.session.bye().await,
                SessionState::Terminating | SessionState::Terminated => Ok(()),
            };
            if let Err(e) = result {
                warn!(error = %e, "session termination signal failed");
            }
        }
        self.cleanup_call();
    }

    /// Drop the active call, detach its bridge listener so nothing dispatches
    /// into the destroyed session, and tell the media side to release
    /// per-call resources.
    fn cleanup_call(&mut self) {
        if let Some(call) = self.active.take() {
            call.bridge.events().off(call.bridge_listener);
            call.watch_task.abort();
            self.endpoint.send(ChannelMessage::Ended);
        }
    }
}

/// Watch a session's state and funnel termination into the manager loop.
///
/// `Established` deliberately emits nothing: the media-level connected event
/// is what drives the user-visible state. Loss of the watch channel before
/// termination is an invariant violation and is treated as session loss.
fn spawn_state_watch(
    call: CallId,
    mut states: watch::Receiver<SessionState>,
    events: mpsc::UnboundedSender<ManagerEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match states.changed().await {
                Ok(()) => {
                    let state = *states.borrow_and_update();
                    debug!(call = %call, state = %state, "session state changed");
                    match state {
                        SessionState::Terminating | SessionState::Terminated => {
                            let _ = events.send(ManagerEvent::SessionEnded);
                            break;
                        }
                        _ => {}
                    }
                }
                Err(_) => {
                    error!(call = %call, "session state channel lost before termination");
                    let _ = events.send(ManagerEvent::SessionEnded);
                    break;
                }
            }
        }
    })
}
