//! The declared SDP modifier pipeline.
//!
//! Descriptions are never mutated ad hoc: every transformation is one of the
//! declared [`SdpModifier`] variants, applied left to right by
//! [`apply_modifiers`]. The variants are plain data so a pipeline can cross
//! the context boundary inside a channel message. Any step may reject the
//! description, which aborts the whole negotiation.

use crate::sdp::{MediaKind, SessionDescription};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A modifier rejected the description it was given.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModifierError {
    #[error("SDP modifier rejected description: {reason}")]
    Rejected { reason: String },
}

/// One declared SDP transform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "modifier", rename_all = "camelCase")]
pub enum SdpModifier {
    /// Remove every media section of the given kind.
    StripMediaKind { kind: MediaKind },
    /// Reorder the payload list of matching media sections so the named
    /// codec is negotiated first. Leaves the description unchanged when the
    /// codec is absent.
    PreferCodec { name: String },
    /// Unconditionally reject the description. Exists to exercise the
    /// pipeline's abort path.
    Reject { reason: String },
}

impl SdpModifier {
    fn apply(&self, description: SessionDescription) -> Result<SessionDescription, ModifierError> {
        match self {
            SdpModifier::StripMediaKind { kind } => Ok(strip_media_kind(description, *kind)),
            SdpModifier::PreferCodec { name } => Ok(prefer_codec(description, name)),
            SdpModifier::Reject { reason } => Err(ModifierError::Rejected {
                reason: reason.clone(),
            }),
        }
    }
}

/// Run `description` through `modifiers` left to right.
///
/// An empty pipeline returns the description unchanged. The first rejection
/// aborts the chain and surfaces as a negotiation failure to the caller.
pub fn apply_modifiers(
    description: SessionDescription,
    modifiers: &[SdpModifier],
) -> Result<SessionDescription, ModifierError> {
    modifiers
        .iter()
        .try_fold(description, |desc, modifier| modifier.apply(desc))
}

const LINE_SEP: &str = "\r\n";

fn split_lines(sdp: &str) -> Vec<String> {
    sdp.lines().map(|l| l.trim_end_matches('\r').to_string()).collect()
}

fn join_lines(lines: Vec<String>) -> String {
    let mut joined = lines.join(LINE_SEP);
    if !joined.is_empty() {
        joined.push_str(LINE_SEP);
    }
    joined
}

fn strip_media_kind(description: SessionDescription, kind: MediaKind) -> SessionDescription {
    let prefix = format!("m={} ", kind);
    let mut kept = Vec::new();
    let mut skipping = false;
    for line in split_lines(&description.sdp) {
        if line.starts_with("m=") {
            skipping = line.starts_with(&prefix);
        }
        if !skipping {
            kept.push(line);
        }
    }
    SessionDescription {
        kind: description.kind,
        sdp: join_lines(kept),
    }
}

fn prefer_codec(description: SessionDescription, name: &str) -> SessionDescription {
    let lines = split_lines(&description.sdp);

    // Payload types whose rtpmap names the preferred codec.
    let preferred: Vec<String> = lines
        .iter()
        .filter_map(|line| {
            let rest = line.strip_prefix("a=rtpmap:")?;
            let (payload, codec) = rest.split_once(' ')?;
            let codec_name = codec.split('/').next()?;
            codec_name
                .eq_ignore_ascii_case(name)
                .then(|| payload.to_string())
        })
        .collect();
    if preferred.is_empty() {
        return description;
    }

    let reordered = lines
        .into_iter()
        .map(|line| {
            if !line.starts_with("m=") {
                return line;
            }
            // m=<kind> <port> <proto> <pt> <pt> ...
            let mut parts: Vec<&str> = line.split(' ').collect();
            if parts.len() <= 3 {
                return line;
            }
            let payloads = parts.split_off(3);
            let (mut front, back): (Vec<&str>, Vec<&str>) = payloads
                .into_iter()
                .partition(|pt| preferred.iter().any(|p| p == pt));
            front.extend(back);
            parts.extend(front);
            parts.join(" ")
        })
        .collect();

    SessionDescription {
        kind: description.kind,
        sdp: join_lines(reordered),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sdp::SdpKind;

    fn audio_video_sdp() -> SessionDescription {
        SessionDescription::offer(
            "v=0\r\no=- 0 1 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n\
             m=audio 49152 UDP/TLS/RTP/SAVPF 0 8 111\r\n\
             a=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\na=rtpmap:111 opus/48000/2\r\n\
             m=video 49154 UDP/TLS/RTP/SAVPF 96\r\na=rtpmap:96 VP8/90000\r\n",
        )
    }

    #[test]
    fn empty_pipeline_is_identity() {
        let desc = audio_video_sdp();
        let out = apply_modifiers(desc.clone(), &[]).unwrap();
        assert_eq!(out, desc);
    }

    #[test]
    fn strip_video_removes_whole_section() {
        let out = apply_modifiers(
            audio_video_sdp(),
            &[SdpModifier::StripMediaKind {
                kind: MediaKind::Video,
            }],
        )
        .unwrap();
        assert!(!out.sdp.contains("m=video"));
        assert!(!out.sdp.contains("VP8"));
        assert!(out.sdp.contains("m=audio"));
        assert_eq!(out.kind, SdpKind::Offer);
    }

    #[test]
    fn prefer_codec_moves_payload_first() {
        let out = apply_modifiers(
            audio_video_sdp(),
            &[SdpModifier::PreferCodec {
                name: "opus".to_string(),
            }],
        )
        .unwrap();
        assert!(out.sdp.contains("m=audio 49152 UDP/TLS/RTP/SAVPF 111 0 8"));
        // Video section untouched by an audio codec preference.
        assert!(out.sdp.contains("m=video 49154 UDP/TLS/RTP/SAVPF 96"));
    }

    #[test]
    fn prefer_unknown_codec_is_identity() {
        let desc = audio_video_sdp();
        let out = apply_modifiers(
            desc.clone(),
            &[SdpModifier::PreferCodec {
                name: "G729".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(out, desc);
    }

    #[test]
    fn rejection_aborts_the_chain() {
        let err = apply_modifiers(
            audio_video_sdp(),
            &[
                SdpModifier::PreferCodec {
                    name: "opus".to_string(),
                },
                SdpModifier::Reject {
                    reason: "policy".to_string(),
                },
                SdpModifier::StripMediaKind {
                    kind: MediaKind::Video,
                },
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ModifierError::Rejected {
                reason: "policy".to_string()
            }
        );
    }

    #[test]
    fn modifiers_round_trip_through_serde() {
        let pipeline = vec![
            SdpModifier::StripMediaKind {
                kind: MediaKind::Video,
            },
            SdpModifier::PreferCodec {
                name: "opus".to_string(),
            },
        ];
        let json = serde_json::to_string(&pipeline).unwrap();
        let back: Vec<SdpModifier> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, pipeline);
    }
}
