//! Error types for media negotiation.

use crate::modifier::ModifierError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the media engine adapter and the engine seam.
#[derive(Debug, Error)]
pub enum MediaError {
    /// The underlying media engine rejected an operation
    #[error("Media engine error: {reason}")]
    Engine { reason: String },

    /// A declared SDP modifier rejected the description
    #[error(transparent)]
    Modifier(#[from] ModifierError),

    /// The peer connection produced no local description after gathering
    #[error("Missing local description")]
    MissingLocalDescription,

    /// ICE gathering did not complete within the allowed window
    #[error("ICE gathering did not complete within {waited:?}")]
    GatheringTimeout { waited: Duration },

    /// Operation requires a live peer connection and there is none
    #[error("Peer connection is closed or absent")]
    ConnectionClosed,

    /// Local media capture failed or was denied
    #[error("Media acquisition failed: {reason}")]
    MediaAcquisition { reason: String },
}

/// Result type for media operations.
pub type MediaResult<T> = std::result::Result<T, MediaError>;
