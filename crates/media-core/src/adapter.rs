//! The media engine adapter.
//!
//! Owns at most one live peer connection, attaches local media to it, and
//! runs the negotiation algorithm that turns "produce a description" into a
//! committed, gathering-complete local description. The signaling side never
//! touches the peer connection; it sees only the events this adapter emits
//! and the descriptions it returns.

use crate::engine::{
    MediaEngine, MediaStream, PeerConnection, PeerConnectionEvent, RtcConfiguration,
};
use crate::error::{MediaError, MediaResult};
use crate::modifier::{apply_modifiers, SdpModifier};
use crate::sdp::{IceConnectionState, IceGatheringState, SdpKind, SessionDescription, SignalingState};
use crossline_infra_common::EventDispatcher;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Upper bound on the wait for ICE gathering to complete.
pub const DEFAULT_GATHERING_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys for adapter event listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterEventKind {
    /// The peer connection's signaling state changed (mirror feed).
    SignalingState,
    /// ICE reached `connected`; the call is media-live.
    Connected,
    /// The first remote media stream arrived.
    RemoteStream,
}

/// Events emitted by the adapter.
#[derive(Debug, Clone)]
pub enum AdapterEvent {
    SignalingState(SignalingState),
    Connected,
    RemoteStream(MediaStream),
}

struct ForwardTask {
    handle: JoinHandle<()>,
}

impl Drop for ForwardTask {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Foreground owner of the peer connection.
pub struct MediaEngineAdapter {
    engine: Arc<dyn MediaEngine>,
    config: Mutex<RtcConfiguration>,
    connection: Mutex<Option<Arc<dyn PeerConnection>>>,
    forward_task: Mutex<Option<ForwardTask>>,
    dispatcher: EventDispatcher<AdapterEventKind, AdapterEvent>,
    gathering_timeout: Duration,
}

impl MediaEngineAdapter {
    pub fn new(engine: Arc<dyn MediaEngine>, config: RtcConfiguration) -> Self {
        Self {
            engine,
            config: Mutex::new(config),
            connection: Mutex::new(None),
            forward_task: Mutex::new(None),
            dispatcher: EventDispatcher::new(),
            gathering_timeout: DEFAULT_GATHERING_TIMEOUT,
        }
    }

    pub fn with_gathering_timeout(mut self, timeout: Duration) -> Self {
        self.gathering_timeout = timeout;
        self
    }

    /// Listener registry for [`AdapterEvent`]s.
    pub fn events(&self) -> &EventDispatcher<AdapterEventKind, AdapterEvent> {
        &self.dispatcher
    }

    /// Current live connection, if one exists and is not closed.
    fn live_connection(&self) -> Option<Arc<dyn PeerConnection>> {
        let guard = self.connection.lock();
        guard
            .as_ref()
            .filter(|pc| pc.signaling_state() != SignalingState::Closed)
            .cloned()
    }

    /// Ensure a live peer connection exists.
    ///
    /// Merges `options` (when given) with the stored configuration, filling
    /// in the default STUN entry when no ICE servers are supplied. A live
    /// connection is left untouched, so repeated calls with identical input
    /// are idempotent; a closed or absent connection is (re)created and its
    /// event stream wired into the adapter's dispatcher.
    pub async fn configure(&self, options: Option<RtcConfiguration>) -> MediaResult<()> {
        if let Some(options) = options {
            *self.config.lock() = options;
        }
        if self.live_connection().is_some() {
            return Ok(());
        }

        let config = self.config.lock().clone().or_default_ice_servers();
        debug!(ice_servers = config.ice_servers.len(), "creating peer connection");
        let connection = self.engine.create_peer_connection(config).await?;
        let events = connection.subscribe();

        *self.connection.lock() = Some(connection.clone());
        let task = spawn_event_forwarding(connection, events, self.dispatcher.clone());
        *self.forward_task.lock() = Some(task);
        Ok(())
    }

    /// Attach the tracks of `stream` as the connection's outbound media.
    ///
    /// Existing senders are removed first, so calling this again for a
    /// renegotiation replaces rather than accumulates.
    pub async fn attach_local_media(&self, stream: &MediaStream) -> MediaResult<()> {
        let connection = self.live_connection().ok_or(MediaError::ConnectionClosed)?;
        for sender in connection.senders() {
            connection.remove_sender(sender).await?;
        }
        for track in stream.tracks() {
            connection.add_track(track.clone()).await?;
        }
        debug!(tracks = stream.tracks().len(), "attached local media");
        Ok(())
    }

    /// Produce the local description for the current negotiation step.
    ///
    /// Chooses offer or answer from the connection's own signaling state -
    /// the authoritative value, not the mirrored copy the signaling side
    /// holds. When the state is already `have-local-offer` the existing
    /// local description is returned through `modifiers` without generating
    /// a new one, so repeated calls in a glare window are idempotent.
    pub async fn create_offer_or_answer(
        &self,
        modifiers: &[SdpModifier],
        ice_restart: bool,
    ) -> MediaResult<SessionDescription> {
        let connection = self.live_connection().ok_or(MediaError::ConnectionClosed)?;

        if connection.signaling_state() == SignalingState::HaveLocalOffer {
            let local = connection
                .local_description()
                .ok_or(MediaError::MissingLocalDescription)?;
            return Ok(apply_modifiers(local, modifiers)?);
        }

        let produced = if connection.signaling_state() == SignalingState::HaveRemoteOffer {
            connection.create_answer().await
        } else {
            connection.create_offer(ice_restart).await
        }
        .map_err(|e| {
            error!(error = %e, "description generation failed");
            e
        })?;

        let modified = apply_modifiers(produced, modifiers)?;
        debug!(kind = %modified.kind, "setting local description");
        connection.set_local_description(modified).await?;

        self.wait_for_ice_gathering(&connection).await?;

        // Gathering may have augmented the description with candidates;
        // re-read it and run the pipeline once more before handing it out.
        let local = connection
            .local_description()
            .ok_or(MediaError::MissingLocalDescription)?;
        Ok(apply_modifiers(local, modifiers)?)
    }

    /// Wait for ICE gathering to reach `complete`.
    ///
    /// Subscribes before sampling the state, so a completion landing between
    /// the two cannot be lost. Resolves immediately when gathering is
    /// already complete; otherwise fails the negotiation after the
    /// configured upper bound instead of waiting forever.
    async fn wait_for_ice_gathering(&self, connection: &Arc<dyn PeerConnection>) -> MediaResult<()> {
        let mut events = connection.subscribe();
        if connection.ice_gathering_state() == IceGatheringState::Complete {
            return Ok(());
        }

        let deadline = tokio::time::Instant::now() + self.gathering_timeout;
        loop {
            let event = tokio::time::timeout_at(deadline, events.recv()).await;
            match event {
                Ok(Ok(PeerConnectionEvent::IceGatheringStateChanged(
                    IceGatheringState::Complete,
                ))) => return Ok(()),
                Ok(Ok(_)) => continue,
                Ok(Err(broadcast::error::RecvError::Lagged(skipped))) => {
                    // The queue overflowed; the completion may be among the
                    // dropped events, so re-sample the state.
                    warn!(skipped, "gathering-wait lagged behind event stream");
                    if connection.ice_gathering_state() == IceGatheringState::Complete {
                        return Ok(());
                    }
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => {
                    return Err(MediaError::ConnectionClosed);
                }
                Err(_) => {
                    return Err(MediaError::GatheringTimeout {
                        waited: self.gathering_timeout,
                    });
                }
            }
        }
    }

    /// Apply a description received from the remote party.
    ///
    /// The offer/answer tag is re-derived from the authoritative signaling
    /// state: whatever the background context believed when it forwarded the
    /// description, a remote description arriving while we hold a local
    /// offer is an answer, otherwise an offer.
    pub async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> MediaResult<()> {
        let connection = self.live_connection().ok_or(MediaError::ConnectionClosed)?;
        let kind = if connection.signaling_state() == SignalingState::HaveLocalOffer {
            SdpKind::Answer
        } else {
            SdpKind::Offer
        };
        if kind != description.kind {
            debug!(
                tagged = %description.kind,
                derived = %kind,
                "remote description retagged from authoritative state"
            );
        }
        connection
            .set_remote_description(SessionDescription {
                kind,
                sdp: description.sdp,
            })
            .await
    }

    /// Restart ICE: reconstruct the connection when it is closed or absent,
    /// otherwise request fresh credentials on the live one. Renegotiation
    /// must follow separately.
    pub async fn restart_ice(&self) -> MediaResult<()> {
        match self.live_connection() {
            Some(connection) => {
                info!("requesting ICE restart on live connection");
                connection.restart_ice();
                Ok(())
            }
            None => {
                info!("connection closed; reconstructing for ICE restart");
                self.configure(None).await
            }
        }
    }

    /// Close the peer connection, keeping the reference (a later
    /// [`configure`](Self::configure) notices the closed state and
    /// reconstructs).
    pub fn close(&self) {
        if let Some(connection) = self.connection.lock().as_ref() {
            connection.close();
        }
    }

    /// Close and drop the peer connection and stop event forwarding.
    /// Safe to call repeatedly; a second call finds nothing to release.
    pub fn end(&self) {
        if let Some(connection) = self.connection.lock().take() {
            connection.close();
        }
        self.forward_task.lock().take();
    }
}

/// Forward engine events into the adapter's dispatcher.
///
/// The first remote stream of the connection's lifetime is delivered exactly
/// once; an ICE failure triggers the automatic restart path without
/// involving the consumer.
fn spawn_event_forwarding(
    connection: Arc<dyn PeerConnection>,
    mut events: broadcast::Receiver<PeerConnectionEvent>,
    dispatcher: EventDispatcher<AdapterEventKind, AdapterEvent>,
) -> ForwardTask {
    let handle = tokio::spawn(async move {
        let mut remote_stream_seen = false;
        loop {
            match events.recv().await {
                Ok(PeerConnectionEvent::SignalingStateChanged(state)) => {
                    dispatcher.emit(
                        AdapterEventKind::SignalingState,
                        &AdapterEvent::SignalingState(state),
                    );
                }
                Ok(PeerConnectionEvent::IceConnectionStateChanged(state)) => {
                    debug!(state = ?state, "ICE connection state changed");
                    match state {
                        IceConnectionState::Connected => {
                            dispatcher.emit(AdapterEventKind::Connected, &AdapterEvent::Connected);
                        }
                        IceConnectionState::Failed => {
                            warn!("ICE failed; restarting automatically");
                            connection.restart_ice();
                        }
                        _ => {}
                    }
                }
                Ok(PeerConnectionEvent::RemoteTrack(stream)) => {
                    if !remote_stream_seen {
                        remote_stream_seen = true;
                        dispatcher.emit(
                            AdapterEventKind::RemoteStream,
                            &AdapterEvent::RemoteStream(stream),
                        );
                    }
                }
                Ok(PeerConnectionEvent::IceGatheringStateChanged(_)) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "adapter lagged behind engine events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
    ForwardTask { handle }
}
