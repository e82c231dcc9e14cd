//! Value types for SDP negotiation.
//!
//! These types cross the context boundary inside channel messages, so they
//! all carry serde derives and serialize to the wire spellings the media
//! engine uses (`offer`/`answer`, `have-local-offer`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which side of the offer/answer exchange a description belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpKind {
    Offer,
    Answer,
}

impl fmt::Display for SdpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SdpKind::Offer => write!(f, "offer"),
            SdpKind::Answer => write!(f, "answer"),
        }
    }
}

/// A session description as produced by the media engine or received from
/// the remote party.
///
/// Produced only by the media engine adapter and consumed only by the
/// session-description bridge; the declared modifier pipeline is the sole
/// legal transformation between the two.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: SdpKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Local negotiation phase of the peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    HaveLocalPranswer,
    HaveRemotePranswer,
    Closed,
}

impl fmt::Display for SignalingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SignalingState::Stable => "stable",
            SignalingState::HaveLocalOffer => "have-local-offer",
            SignalingState::HaveRemoteOffer => "have-remote-offer",
            SignalingState::HaveLocalPranswer => "have-local-pranswer",
            SignalingState::HaveRemotePranswer => "have-remote-pranswer",
            SignalingState::Closed => "closed",
        };
        write!(f, "{}", s)
    }
}

/// ICE candidate-gathering phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceGatheringState {
    New,
    Gathering,
    Complete,
}

/// ICE connectivity-check phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IceConnectionState {
    New,
    Checking,
    Connected,
    Completed,
    Failed,
    Disconnected,
    Closed,
}

/// A media kind carried by a track or an SDP media section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaKind::Audio => write!(f, "audio"),
            MediaKind::Video => write!(f, "video"),
        }
    }
}

/// Which media kinds to acquire for a call. Selected once per call and
/// immutable for the call's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Audio only, the softphone default.
    pub fn audio_only() -> Self {
        Self {
            audio: true,
            video: false,
        }
    }
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self::audio_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signaling_state_wire_spelling() {
        let json = serde_json::to_string(&SignalingState::HaveLocalOffer).unwrap();
        assert_eq!(json, "\"have-local-offer\"");
    }

    #[test]
    fn description_kind_wire_spelling() {
        let desc = SessionDescription::answer("v=0\r\n");
        let json = serde_json::to_string(&desc).unwrap();
        assert!(json.contains("\"kind\":\"answer\""));
    }
}
