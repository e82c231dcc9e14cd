//! The call orchestrator.
//!
//! [`CallClient`] is the single object the presentation layer talks to. It
//! spawns both execution contexts - the background signaling task (a
//! [`SessionManager`]) and the foreground media loop - wires them together
//! with one channel pair, and fans lifecycle events out to the consumer's
//! [`CallEventHandler`].
//!
//! The foreground loop owns the media engine adapter and the local stream.
//! Nothing else may touch them: facade methods with foreground side effects
//! (disconnect, reconnect, end) are delivered to the loop as commands, never
//! executed on the caller's task.

use crate::config::ClientConfig;
use crate::error::{ClientError, ClientResult};
use crate::events::{CallEventHandler, CallState, InvitationInfo};
use chrono::Utc;
use crossline_infra_common::channel::{self, Endpoint, MessageSender};
use crossline_infra_common::events::ListenerId;
use crossline_media_core::{
    AdapterEvent, AdapterEventKind, MediaConstraints, MediaEngine, MediaEngineAdapter,
};
use crossline_session_core::{ChannelMessage, RegistrationData, SessionManager, SignalingClient};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Facade requests with foreground-context side effects.
enum FacadeCommand {
    Disconnect,
    Reconnect,
    End,
}

/// Adapter events that need async handling on the loop.
enum AdapterNotice {
    Connected,
    RemoteStream(crossline_media_core::MediaStream),
}

/// State observable from both the facade and the foreground loop.
struct Shared {
    state: Mutex<CallState>,
    pending_invitation: AtomicBool,
    /// Media acquisition failed for the current call attempt; negotiation
    /// messages still in flight for it are dropped instead of answered.
    media_failed: AtomicBool,
    handler: Arc<dyn CallEventHandler>,
}

impl Shared {
    fn current(&self) -> CallState {
        *self.state.lock()
    }

    async fn transition(&self, state: CallState) {
        let changed = {
            let mut current = self.state.lock();
            if *current == state {
                false
            } else {
                debug!(from = %current, to = %state, "call state changed");
                *current = state;
                true
            }
        };
        if changed {
            self.handler.on_call_state_changed(state).await;
        }
    }
}

/// The single object the presentation layer talks to.
pub struct CallClient {
    to_background: MessageSender<ChannelMessage>,
    commands: mpsc::UnboundedSender<FacadeCommand>,
    shared: Arc<Shared>,
    media: MediaConstraints,
    foreground: JoinHandle<()>,
    background: JoinHandle<()>,
}

impl CallClient {
    /// Build the orchestrator: spawns the background signaling context and
    /// the foreground media loop, connected by one channel pair.
    pub fn new(
        config: ClientConfig,
        engine: Arc<dyn MediaEngine>,
        signaling: Arc<dyn SignalingClient>,
        handler: Arc<dyn CallEventHandler>,
    ) -> Self {
        let (media_side, signaling_side) = channel::pair();

        let manager = SessionManager::new(signaling, signaling_side)
            .with_negotiation_timeout(config.negotiation_timeout);
        let background = tokio::spawn(manager.run());

        let shared = Arc::new(Shared {
            state: Mutex::new(CallState::Unregistered),
            pending_invitation: AtomicBool::new(false),
            media_failed: AtomicBool::new(false),
            handler,
        });

        let (commands, command_rx) = mpsc::unbounded_channel();
        let to_background = media_side.sender();
        let media = config.media;

        let foreground_loop =
            ForegroundLoop::new(media_side, command_rx, engine, config, shared.clone());
        let foreground = tokio::spawn(foreground_loop.run());

        Self {
            to_background,
            commands,
            shared,
            media,
            foreground,
            background,
        }
    }

    /// The state currently visible to the presentation layer.
    pub fn current_state(&self) -> CallState {
        self.shared.current()
    }

    /// Begin registration with the signaling endpoint. Confirmation arrives
    /// as a transition to the registered state.
    pub async fn register(&self, registration: RegistrationData) -> ClientResult<()> {
        if registration.extension.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration {
                field: "extension".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        self.shared.transition(CallState::Registering).await;
        self.to_background
            .send(ChannelMessage::Register { registration });
        Ok(())
    }

    /// Place an outbound call. Valid only when registered and idle; a second
    /// concurrent call is rejected, never queued.
    pub async fn call(&self, number: &str) -> ClientResult<()> {
        if number.trim().is_empty() {
            return Err(ClientError::InvalidConfiguration {
                field: "number".to_string(),
                reason: "must not be empty".to_string(),
            });
        }
        match self.current_state() {
            CallState::Unregistered | CallState::Registering => Err(ClientError::NotRegistered),
            CallState::Connecting | CallState::Connected => Err(ClientError::CallInProgress),
            CallState::Registered | CallState::Disconnected | CallState::Ended => {
                self.shared.media_failed.store(false, Ordering::SeqCst);
                self.to_background.send(ChannelMessage::Call {
                    number: number.to_string(),
                    media: self.media,
                });
                Ok(())
            }
        }
    }

    /// Accept the pending inbound invitation.
    pub async fn accept(&self) -> ClientResult<()> {
        if !self.shared.pending_invitation.swap(false, Ordering::SeqCst) {
            return Err(ClientError::NoPendingInvitation);
        }
        self.shared.media_failed.store(false, Ordering::SeqCst);
        self.to_background
            .send(ChannelMessage::Accept { media: self.media });
        Ok(())
    }

    /// Decline the pending inbound invitation.
    pub async fn reject(&self) -> ClientResult<()> {
        if !self.shared.pending_invitation.swap(false, Ordering::SeqCst) {
            return Err(ClientError::NoPendingInvitation);
        }
        self.to_background.send(ChannelMessage::Reject);
        Ok(())
    }

    /// Tear down the current call but keep the registration. Local media is
    /// always released, whatever state the call was in.
    pub async fn disconnect(&self) -> ClientResult<()> {
        self.command(FacadeCommand::Disconnect)
    }

    /// Recover the media path: ICE restart (or reconstruction when the
    /// connection is closed) followed by a re-invite.
    pub async fn reconnect(&self) -> ClientResult<()> {
        self.shared.media_failed.store(false, Ordering::SeqCst);
        self.command(FacadeCommand::Reconnect)
    }

    /// Tear down the call, the registration, and both contexts. Safe to call
    /// more than once; once the foreground loop has stopped there is nothing
    /// left to end.
    pub async fn end(&self) -> ClientResult<()> {
        let _ = self.commands.send(FacadeCommand::End);
        Ok(())
    }

    fn command(&self, command: FacadeCommand) -> ClientResult<()> {
        self.commands
            .send(command)
            .map_err(|_| ClientError::InternalError {
                message: "foreground context is gone".to_string(),
            })
    }
}

impl Drop for CallClient {
    fn drop(&mut self) {
        self.foreground.abort();
        self.background.abort();
    }
}

/// The foreground context: owns the adapter and the local stream, serves the
/// signaling context's requests, and feeds adapter events back to it.
struct ForegroundLoop {
    endpoint: Endpoint<ChannelMessage>,
    commands: mpsc::UnboundedReceiver<FacadeCommand>,
    notices: mpsc::UnboundedReceiver<AdapterNotice>,
    engine: Arc<dyn MediaEngine>,
    adapter: MediaEngineAdapter,
    adapter_listeners: Vec<ListenerId<AdapterEventKind>>,
    local_stream: Option<crossline_media_core::MediaStream>,
    media: MediaConstraints,
    pending_ice_restart: bool,
    shared: Arc<Shared>,
}

impl ForegroundLoop {
    fn new(
        endpoint: Endpoint<ChannelMessage>,
        commands: mpsc::UnboundedReceiver<FacadeCommand>,
        engine: Arc<dyn MediaEngine>,
        config: ClientConfig,
        shared: Arc<Shared>,
    ) -> Self {
        let adapter = MediaEngineAdapter::new(engine.clone(), config.rtc);
        let (notice_tx, notices) = mpsc::unbounded_channel();
        let mut adapter_listeners = Vec::new();

        // The signaling-state mirror goes straight onto the channel; the
        // emitting task's send order is all the ordering the mirror gets.
        let mirror = endpoint.sender();
        adapter_listeners.push(adapter.events().on(
            AdapterEventKind::SignalingState,
            move |event| {
                if let AdapterEvent::SignalingState(state) = event {
                    mirror.send(ChannelMessage::PeerConnectionSignalingState { state: *state });
                }
            },
        ));

        let connected = notice_tx.clone();
        adapter_listeners.push(adapter.events().on(AdapterEventKind::Connected, move |_| {
            let _ = connected.send(AdapterNotice::Connected);
        }));

        let remote = notice_tx;
        adapter_listeners.push(adapter.events().on(
            AdapterEventKind::RemoteStream,
            move |event| {
                if let AdapterEvent::RemoteStream(stream) = event {
                    let _ = remote.send(AdapterNotice::RemoteStream(stream.clone()));
                }
            },
        ));

        Self {
            endpoint,
            commands,
            notices,
            engine,
            adapter,
            adapter_listeners,
            local_stream: None,
            media: config.media,
            pending_ice_restart: false,
            shared,
        }
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                message = self.endpoint.recv() => match message {
                    Some(message) => self.handle_message(message).await,
                    None => {
                        debug!("signaling context gone; stopping foreground loop");
                        break;
                    }
                },
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle_command(command).await {
                            break;
                        }
                    }
                    None => break,
                },
                Some(notice) = self.notices.recv() => self.handle_notice(notice).await,
            }
        }
        self.teardown();
    }

    async fn handle_message(&mut self, message: ChannelMessage) {
        debug!(kind = message.kind(), "channel message");
        match message {
            ChannelMessage::InitPeerConnection => {
                if self.attempt_failed() {
                    return;
                }
                self.shared.transition(CallState::Connecting).await;
                if let Err(e) = self.adapter.configure(None).await {
                    error!(error = %e, "peer connection setup failed");
                }
            }

            ChannelMessage::GetMediaStream => {
                if self.attempt_failed() {
                    return;
                }
                if !self.ensure_local_media().await {
                    // Capture denied: the call attempt cannot proceed. Mark
                    // the attempt failed, tell the signaling side to give
                    // up, and surface the end once.
                    self.shared.media_failed.store(true, Ordering::SeqCst);
                    self.endpoint.send(ChannelMessage::Disconnect);
                    if !matches!(
                        self.shared.current(),
                        CallState::Disconnected | CallState::Ended
                    ) {
                        self.shared.transition(CallState::Ended).await;
                        self.shared.handler.on_ended().await;
                    }
                }
            }

            ChannelMessage::CreateOfferOrAnswer { modifiers } => {
                if self.attempt_failed() {
                    // No reply: the bridge's bounded wait (or the abandoned
                    // request) turns silence into an explicit negotiation
                    // failure on the signaling side.
                    return;
                }
                let ice_restart = std::mem::take(&mut self.pending_ice_restart);
                match self
                    .adapter
                    .create_offer_or_answer(&modifiers, ice_restart)
                    .await
                {
                    Ok(description) => {
                        self.endpoint
                            .send(ChannelMessage::LocalDescription { description });
                    }
                    Err(e) => error!(error = %e, "negotiation failed"),
                }
            }

            ChannelMessage::SetDescription { description } => {
                if let Err(e) = self.adapter.set_remote_description(description).await {
                    error!(error = %e, "applying remote description failed");
                }
            }

            ChannelMessage::RegistrationState { registered } => {
                self.shared
                    .transition(if registered {
                        CallState::Registered
                    } else {
                        CallState::Unregistered
                    })
                    .await;
            }

            ChannelMessage::GotInvitation { from } => {
                info!(%from, "inbound invitation");
                self.shared.pending_invitation.store(true, Ordering::SeqCst);
                self.shared
                    .handler
                    .on_invitation(InvitationInfo {
                        from,
                        received_at: Utc::now(),
                    })
                    .await;
            }

            ChannelMessage::GotRefer => {
                self.shared.handler.on_refer().await;
            }

            ChannelMessage::Ended => {
                self.release_media();
                self.shared.pending_invitation.store(false, Ordering::SeqCst);
                // Already terminal (e.g. a local disconnect raced the
                // signaling side's notification): release only.
                if !matches!(
                    self.shared.current(),
                    CallState::Disconnected | CallState::Ended
                ) {
                    self.shared.transition(CallState::Ended).await;
                    self.shared.handler.on_ended().await;
                }
            }

            other => {
                debug!(kind = other.kind(), "message not addressed to the media context");
            }
        }
    }

    /// Returns true when the loop should stop.
    async fn handle_command(&mut self, command: FacadeCommand) -> bool {
        match command {
            FacadeCommand::Disconnect => {
                self.endpoint.send(ChannelMessage::Disconnect);
                self.adapter.close();
                self.release_media();
                self.shared.transition(CallState::Disconnected).await;
                false
            }
            FacadeCommand::Reconnect => {
                if let Err(e) = self.adapter.restart_ice().await {
                    error!(error = %e, "ICE restart failed");
                    return false;
                }
                if !self.ensure_local_media().await {
                    return false;
                }
                self.pending_ice_restart = true;
                self.endpoint.send(ChannelMessage::Reconnect);
                false
            }
            FacadeCommand::End => {
                self.endpoint.send(ChannelMessage::EndSession);
                true
            }
        }
    }

    async fn handle_notice(&mut self, notice: AdapterNotice) {
        match notice {
            AdapterNotice::Connected => {
                self.shared.transition(CallState::Connected).await;
            }
            AdapterNotice::RemoteStream(stream) => {
                self.shared.handler.on_remote_stream(stream).await;
            }
        }
    }

    fn attempt_failed(&self) -> bool {
        if self.shared.media_failed.load(Ordering::SeqCst) {
            debug!("dropping message for a failed call attempt");
            true
        } else {
            false
        }
    }

    /// Acquire local media once per call and attach it to the connection.
    /// Returns false when acquisition fails.
    async fn ensure_local_media(&mut self) -> bool {
        if let Some(stream) = &self.local_stream {
            // Renegotiation: re-attaching replaces the senders.
            if let Err(e) = self.adapter.attach_local_media(stream).await {
                warn!(error = %e, "re-attaching local media failed");
            }
            return true;
        }
        match self.engine.get_user_media(self.media).await {
            Ok(stream) => {
                if let Err(e) = self.adapter.attach_local_media(&stream).await {
                    error!(error = %e, "attaching local media failed");
                }
                self.shared.handler.on_local_stream(stream.clone()).await;
                self.local_stream = Some(stream);
                true
            }
            Err(e) => {
                error!(error = %e, "media acquisition failed");
                false
            }
        }
    }

    fn release_media(&mut self) {
        if let Some(stream) = self.local_stream.take() {
            stream.stop_tracks();
            debug!("local media released");
        }
    }

    /// Detach every listener and release everything so nothing dispatches
    /// into a destroyed session.
    fn teardown(&mut self) {
        for listener in self.adapter_listeners.drain(..) {
            self.adapter.events().off(listener);
        }
        self.adapter.end();
        self.release_media();
    }
}
