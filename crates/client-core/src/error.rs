//! Error types for the call orchestration facade.

use crossline_infra_common::Recoverable;
use thiserror::Error;

/// Errors surfaced to consumers of the facade.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Registration with the signaling endpoint failed
    #[error("Registration failed: {reason}")]
    RegistrationFailed { reason: String },

    /// Network-level failure talking to the signaling endpoint
    #[error("Network error: {reason}")]
    NetworkError { reason: String },

    /// A call could not be initiated
    #[error("Call setup failed: {reason}")]
    CallSetupFailed { reason: String },

    /// Offer/answer negotiation failed
    #[error("Media negotiation failed: {reason}")]
    MediaNegotiationFailed { reason: String },

    /// Local capture media could not be acquired
    #[error("Media acquisition failed: {reason}")]
    MediaAcquisitionFailed { reason: String },

    /// A configuration value is invalid
    #[error("Invalid configuration for {field}: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    /// Exactly one call may be active at a time
    #[error("A call is already in progress")]
    CallInProgress,

    /// Operation requires an active registration
    #[error("Not registered")]
    NotRegistered,

    /// Accept/reject called with no invitation waiting for a decision
    #[error("No pending invitation")]
    NoPendingInvitation,

    /// An operation exceeded its allowed time
    #[error("Operation timed out after {duration_ms}ms")]
    OperationTimeout { duration_ms: u64 },

    /// Internal invariant violation
    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ClientError {
    /// Whether retrying the failed operation can plausibly succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ClientError::NetworkError { .. } | ClientError::OperationTimeout { .. }
        )
    }

    /// Coarse category for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            ClientError::RegistrationFailed { .. } | ClientError::NotRegistered => "registration",
            ClientError::NetworkError { .. } | ClientError::OperationTimeout { .. } => "network",
            ClientError::CallSetupFailed { .. }
            | ClientError::CallInProgress
            | ClientError::NoPendingInvitation => "call",
            ClientError::MediaNegotiationFailed { .. }
            | ClientError::MediaAcquisitionFailed { .. } => "media",
            ClientError::InvalidConfiguration { .. } => "configuration",
            ClientError::InternalError { .. } => "internal",
        }
    }
}

impl Recoverable for ClientError {
    fn is_recoverable(&self) -> bool {
        ClientError::is_recoverable(self)
    }
}

/// Result type for facade operations.
pub type ClientResult<T> = std::result::Result<T, ClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverability_split() {
        assert!(ClientError::NetworkError {
            reason: "timeout".to_string()
        }
        .is_recoverable());
        assert!(!ClientError::CallInProgress.is_recoverable());
        assert!(!ClientError::InvalidConfiguration {
            field: "number".to_string(),
            reason: "empty".to_string()
        }
        .is_recoverable());
    }

    #[test]
    fn categories_cover_the_taxonomy() {
        assert_eq!(ClientError::CallInProgress.category(), "call");
        assert_eq!(
            ClientError::MediaNegotiationFailed {
                reason: "rejected".to_string()
            }
            .category(),
            "media"
        );
    }
}
