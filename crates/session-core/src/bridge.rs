//! The session description bridge.
//!
//! The signaling library calls [`DescriptionHandler::get_description`] and
//! expects a local description back, but producing one is only possible in
//! the media context. The bridge turns that call into a channel round trip:
//! it asks the media side to negotiate, then suspends on a completion future
//! that is resolved only by the matching `LocalDescription` reply. There is
//! a single outstanding request at a time; starting a new one abandons the
//! previous, and a reply that arrives after its request was abandoned (or
//! after the owning session was torn down) is discarded.
//!
//! The wait is bounded: if the media side never answers, the negotiation
//! fails with a timeout instead of spinning on fixed sleeps.

use crate::error::{SessionError, SessionResult};
use crate::protocol::ChannelMessage;
use crate::signaling::{DescriptionBody, DescriptionHandler, SDP_CONTENT_TYPE};
use crate::types::CallDirection;
use async_trait::async_trait;
use crossline_infra_common::{EventDispatcher, MessageSender};
use crossline_media_core::{
    apply_modifiers, SdpKind, SdpModifier, SessionDescription, SignalingState,
};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Default upper bound on a negotiation round trip.
pub const DEFAULT_NEGOTIATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Keys for bridge event listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BridgeEventKind {
    /// The signaling library released the handler.
    Closed,
}

/// Events emitted by the bridge.
#[derive(Debug, Clone)]
pub enum BridgeEvent {
    Closed,
}

/// Bridges the signaling library's description-handler contract to the
/// media context.
pub struct SessionDescriptionBridge {
    direction: CallDirection,
    to_media: MessageSender<ChannelMessage>,
    pending: DashMap<u64, oneshot::Sender<SessionDescription>>,
    next_request: AtomicU64,
    mirrored_state: Mutex<SignalingState>,
    timeout: Duration,
    closed: AtomicBool,
    dispatcher: EventDispatcher<BridgeEventKind, BridgeEvent>,
}

impl SessionDescriptionBridge {
    pub fn new(direction: CallDirection, to_media: MessageSender<ChannelMessage>) -> Self {
        Self {
            direction,
            to_media,
            pending: DashMap::new(),
            next_request: AtomicU64::new(0),
            mirrored_state: Mutex::new(SignalingState::Stable),
            timeout: DEFAULT_NEGOTIATION_TIMEOUT,
            closed: AtomicBool::new(false),
            dispatcher: EventDispatcher::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Listener registry for [`BridgeEvent`]s.
    pub fn events(&self) -> &EventDispatcher<BridgeEventKind, BridgeEvent> {
        &self.dispatcher
    }

    /// Record the signaling state mirrored from the media context.
    ///
    /// The mirror may lag the true value; it is used only to tag remote
    /// descriptions for bookkeeping. The media side re-derives the tag from
    /// authoritative state before applying.
    pub fn set_mirrored_state(&self, state: SignalingState) {
        *self.mirrored_state.lock() = state;
    }

    /// Resolve the outstanding negotiation request with the description the
    /// media context produced. A reply with no outstanding request - the
    /// request timed out, or the session is gone - is silently discarded.
    pub fn resolve_local_description(&self, description: SessionDescription) {
        let request = match self.pending.iter().next() {
            Some(entry) => *entry.key(),
            None => {
                debug!("discarding negotiation reply with no outstanding request");
                return;
            }
        };
        if let Some((_, sender)) = self.pending.remove(&request) {
            if sender.send(description).is_err() {
                debug!(request, "negotiation request abandoned before reply");
            }
        }
    }

    fn mirrored_has_local_offer(&self) -> bool {
        *self.mirrored_state.lock() == SignalingState::HaveLocalOffer
    }
}

#[async_trait]
impl DescriptionHandler for SessionDescriptionBridge {
    async fn get_description(&self, modifiers: Vec<SdpModifier>) -> SessionResult<DescriptionBody> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Negotiation {
                reason: "description handler is closed".to_string(),
            });
        }

        // Make sure the media side has a peer connection and, for calls we
        // originate, local media before it is asked to negotiate.
        self.to_media.send(ChannelMessage::InitPeerConnection);
        if self.direction == CallDirection::Outgoing {
            self.to_media.send(ChannelMessage::GetMediaStream);
        }

        // One outstanding request: starting a new round trip abandons any
        // previous waiter.
        self.pending.clear();
        let request = self.next_request.fetch_add(1, Ordering::SeqCst);
        let (sender, receiver) = oneshot::channel();
        self.pending.insert(request, sender);

        self.to_media
            .send(ChannelMessage::CreateOfferOrAnswer { modifiers });

        let description = match tokio::time::timeout(self.timeout, receiver).await {
            Ok(Ok(description)) => description,
            Ok(Err(_)) => {
                return Err(SessionError::Negotiation {
                    reason: "negotiation abandoned".to_string(),
                });
            }
            Err(_) => {
                self.pending.remove(&request);
                warn!(request, timeout = ?self.timeout, "negotiation reply never arrived");
                return Err(SessionError::NegotiationTimeout {
                    timeout: self.timeout,
                });
            }
        };

        if description.sdp.trim().is_empty() {
            return Err(SessionError::Negotiation {
                reason: "negotiated description carries no SDP".to_string(),
            });
        }
        Ok(DescriptionBody {
            body: description.sdp,
            content_type: SDP_CONTENT_TYPE.to_string(),
        })
    }

    async fn set_description(
        &self,
        sdp: String,
        modifiers: Vec<SdpModifier>,
    ) -> SessionResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(SessionError::Negotiation {
                reason: "description handler is closed".to_string(),
            });
        }

        // Inbound flows reach this point before any negotiation request has
        // asked the media side for capture media.
        if self.direction == CallDirection::Incoming {
            self.to_media.send(ChannelMessage::GetMediaStream);
        }

        let kind = if self.mirrored_has_local_offer() {
            SdpKind::Answer
        } else {
            SdpKind::Offer
        };
        let description = apply_modifiers(SessionDescription { kind, sdp }, &modifiers)?;
        self.to_media
            .send(ChannelMessage::SetDescription { description });
        Ok(())
    }

    fn has_description(&self, content_type: &str) -> bool {
        content_type == SDP_CONTENT_TYPE
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            // Drop any waiter so an in-flight get_description fails fast.
            self.pending.clear();
            self.dispatcher.emit(BridgeEventKind::Closed, &BridgeEvent::Closed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossline_infra_common::channel;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn bridge_pair(
        direction: CallDirection,
        timeout: Duration,
    ) -> (
        Arc<SessionDescriptionBridge>,
        crossline_infra_common::Endpoint<ChannelMessage>,
    ) {
        let (media_side, signaling_side) = channel::pair::<ChannelMessage>();
        // The bridge only sends; its sender clone keeps the direction open
        // after the signaling-side endpoint is dropped.
        let sender = signaling_side.sender();
        drop(signaling_side);
        let bridge = Arc::new(SessionDescriptionBridge::new(direction, sender).with_timeout(timeout));
        (bridge, media_side)
    }

    #[tokio::test]
    async fn get_description_round_trip() {
        let (bridge, mut media) = bridge_pair(CallDirection::Outgoing, Duration::from_secs(1));

        let negotiation = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_description(vec![]).await })
        };

        // The media side sees: ensure connection, acquire media, negotiate.
        assert!(matches!(media.recv().await, Some(ChannelMessage::InitPeerConnection)));
        assert!(matches!(media.recv().await, Some(ChannelMessage::GetMediaStream)));
        assert!(matches!(
            media.recv().await,
            Some(ChannelMessage::CreateOfferOrAnswer { .. })
        ));

        bridge.resolve_local_description(SessionDescription::offer("v=0\r\nm=audio\r\n"));
        let body = negotiation.await.unwrap().unwrap();
        assert_eq!(body.content_type, SDP_CONTENT_TYPE);
        assert_eq!(body.body, "v=0\r\nm=audio\r\n");
    }

    #[tokio::test]
    async fn inbound_get_description_skips_media_acquisition() {
        let (bridge, mut media) = bridge_pair(CallDirection::Incoming, Duration::from_secs(1));

        let negotiation = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_description(vec![]).await })
        };

        assert!(matches!(media.recv().await, Some(ChannelMessage::InitPeerConnection)));
        // Straight to negotiation; media was acquired by the inbound
        // set_description path.
        assert!(matches!(
            media.recv().await,
            Some(ChannelMessage::CreateOfferOrAnswer { .. })
        ));

        bridge.resolve_local_description(SessionDescription::answer("v=0\r\n"));
        negotiation.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn missing_reply_times_out() {
        let (bridge, _media) = bridge_pair(CallDirection::Outgoing, Duration::from_millis(30));
        let err = bridge.get_description(vec![]).await.unwrap_err();
        assert!(matches!(err, SessionError::NegotiationTimeout { .. }));
    }

    #[tokio::test]
    async fn late_reply_is_discarded() {
        let (bridge, _media) = bridge_pair(CallDirection::Outgoing, Duration::from_millis(30));
        let _ = bridge.get_description(vec![]).await;
        // The request has timed out; the late reply has nowhere to go and
        // must not panic or leak.
        bridge.resolve_local_description(SessionDescription::offer("v=0\r\n"));
    }

    #[tokio::test]
    async fn empty_sdp_is_a_negotiation_error() {
        let (bridge, _media) = bridge_pair(CallDirection::Outgoing, Duration::from_millis(100));
        let negotiation = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.get_description(vec![]).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        bridge.resolve_local_description(SessionDescription::offer("   "));
        let err = negotiation.await.unwrap().unwrap_err();
        assert!(matches!(err, SessionError::Negotiation { .. }));
    }

    #[tokio::test]
    async fn set_description_tags_answer_from_mirror_and_forwards() {
        let (bridge, mut media) = bridge_pair(CallDirection::Outgoing, Duration::from_secs(1));
        bridge.set_mirrored_state(SignalingState::HaveLocalOffer);
        bridge
            .set_description("v=0\r\nm=audio 4000 RTP/AVP 0\r\n".to_string(), vec![])
            .await
            .unwrap();
        match media.recv().await {
            Some(ChannelMessage::SetDescription { description }) => {
                assert_eq!(description.kind, SdpKind::Answer);
            }
            other => panic!("unexpected message: {:?}", other.map(|m| m.kind())),
        }
    }

    #[tokio::test]
    async fn inbound_set_description_acquires_media_first() {
        let (bridge, mut media) = bridge_pair(CallDirection::Incoming, Duration::from_secs(1));
        bridge
            .set_description("v=0\r\n".to_string(), vec![])
            .await
            .unwrap();
        assert!(matches!(media.recv().await, Some(ChannelMessage::GetMediaStream)));
        assert!(matches!(
            media.recv().await,
            Some(ChannelMessage::SetDescription { .. })
        ));
    }

    #[tokio::test]
    async fn modifier_rejection_aborts_set_description() {
        let (bridge, _media) = bridge_pair(CallDirection::Outgoing, Duration::from_secs(1));
        let err = bridge
            .set_description(
                "v=0\r\n".to_string(),
                vec![SdpModifier::Reject {
                    reason: "policy".to_string(),
                }],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Modifier(_)));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_notifies_once() {
        let (bridge, _media) = bridge_pair(CallDirection::Outgoing, Duration::from_secs(1));
        let closures = Arc::new(AtomicUsize::new(0));
        let counter = closures.clone();
        bridge.events().on(BridgeEventKind::Closed, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        bridge.close();
        bridge.close();
        assert_eq!(closures.load(Ordering::SeqCst), 1);
        assert!(bridge.get_description(vec![]).await.is_err());
    }

    #[test]
    fn only_sdp_content_type_is_understood() {
        let (media_side, _signaling_side) = channel::pair::<ChannelMessage>();
        let bridge =
            SessionDescriptionBridge::new(CallDirection::Outgoing, media_side.sender());
        assert!(bridge.has_description("application/sdp"));
        assert!(!bridge.has_description("application/json"));
    }
}
