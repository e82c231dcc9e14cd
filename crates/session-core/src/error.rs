//! Error types for the signaling session layer.

use crossline_infra_common::Recoverable;
use crossline_media_core::ModifierError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the session manager and the description bridge.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A negotiation step failed; the in-flight exchange is abandoned
    #[error("Negotiation failed: {reason}")]
    Negotiation { reason: String },

    /// The expected negotiation reply never arrived
    #[error("Negotiation timed out after {timeout:?}")]
    NegotiationTimeout { timeout: Duration },

    /// The signaling library rejected an operation
    #[error("Signaling failure: {reason}")]
    Signaling { reason: String },

    /// A declared SDP modifier rejected the description
    #[error(transparent)]
    Modifier(#[from] ModifierError),
}

impl Recoverable for SessionError {
    fn is_recoverable(&self) -> bool {
        // Library-level failures are typically transient (transport hiccups,
        // registrar briefly unreachable); everything else is deterministic.
        matches!(self, SessionError::Signaling { .. })
    }
}

/// Result type for session operations.
pub type SessionResult<T> = std::result::Result<T, SessionError>;
