//! The cross-context message vocabulary.
//!
//! Everything that crosses the boundary between the media (foreground) and
//! signaling (background) contexts is one of these messages. The channel
//! guarantees FIFO per direction and nothing across directions: in
//! particular a [`ChannelMessage::PeerConnectionSignalingState`] mirror may
//! be arbitrarily stale relative to a [`ChannelMessage::LocalDescription`]
//! reply, which is why offer/answer decisions are made on the media side
//! from authoritative state.

use crate::types::RegistrationData;
use crossline_media_core::{MediaConstraints, SdpModifier, SessionDescription, SignalingState};
use serde::{Deserialize, Serialize};

/// One message on the cross-context channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChannelMessage {
    // ---- media context -> signaling context ----
    /// Begin registration with the supplied record.
    Register { registration: RegistrationData },
    /// Place an outbound call to `number`.
    Call {
        number: String,
        media: MediaConstraints,
    },
    /// Accept the pending inbound invitation.
    Accept { media: MediaConstraints },
    /// Reject the pending inbound invitation.
    Reject,
    /// Result of a negotiation request.
    LocalDescription { description: SessionDescription },
    /// Mirror of the peer connection's signaling state.
    PeerConnectionSignalingState { state: SignalingState },

    // ---- signaling context -> media context ----
    /// Ensure a peer connection exists.
    InitPeerConnection,
    /// Acquire and attach local media.
    GetMediaStream,
    /// Run negotiation and reply with `LocalDescription`.
    CreateOfferOrAnswer { modifiers: Vec<SdpModifier> },
    /// Apply a description received from the remote party.
    SetDescription { description: SessionDescription },
    /// Registration confirmed or lost.
    RegistrationState { registered: bool },
    /// An inbound invitation awaits an accept/reject decision.
    GotInvitation { from: String },
    /// A referral was received.
    GotRefer,
    /// The call is over; release per-call resources.
    Ended,

    // ---- lifecycle commands, either direction ----
    /// Re-invite after an ICE restart or reconstruction.
    Reconnect,
    /// Tear down the current call, keeping the registration.
    Disconnect,
    /// Tear down the call, the registration, and the signaling client.
    EndSession,
}

impl ChannelMessage {
    /// The wire tag of this message, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ChannelMessage::Register { .. } => "register",
            ChannelMessage::Call { .. } => "call",
            ChannelMessage::Accept { .. } => "accept",
            ChannelMessage::Reject => "reject",
            ChannelMessage::LocalDescription { .. } => "localDescription",
            ChannelMessage::PeerConnectionSignalingState { .. } => "peerConnectionSignalingState",
            ChannelMessage::InitPeerConnection => "initPeerConnection",
            ChannelMessage::GetMediaStream => "getMediaStream",
            ChannelMessage::CreateOfferOrAnswer { .. } => "createOfferOrAnswer",
            ChannelMessage::SetDescription { .. } => "setDescription",
            ChannelMessage::RegistrationState { .. } => "registrationState",
            ChannelMessage::GotInvitation { .. } => "gotInvitation",
            ChannelMessage::GotRefer => "gotRefer",
            ChannelMessage::Ended => "ended",
            ChannelMessage::Reconnect => "reconnect",
            ChannelMessage::Disconnect => "disconnect",
            ChannelMessage::EndSession => "endSession",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_are_tagged_with_wire_names() {
        let message = ChannelMessage::CreateOfferOrAnswer { modifiers: vec![] };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"createOfferOrAnswer\""));

        let message = ChannelMessage::RegistrationState { registered: true };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains("\"type\":\"registrationState\""));
        assert!(json.contains("\"registered\":true"));
    }

    #[test]
    fn descriptions_survive_the_wire_format() {
        let message = ChannelMessage::SetDescription {
            description: crossline_media_core::SessionDescription::answer("v=0\r\n"),
        };
        let json = serde_json::to_string(&message).unwrap();
        let back: ChannelMessage = serde_json::from_str(&json).unwrap();
        match back {
            ChannelMessage::SetDescription { description } => {
                assert_eq!(description.sdp, "v=0\r\n");
            }
            other => panic!("unexpected message: {:?}", other.kind()),
        }
    }
}
