//! Facade-visible call state and event handler contract.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crossline_media_core::MediaStream;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The state the presentation layer observes.
///
/// Registration states flow into per-call states; `Disconnected` and `Ended`
/// are per-call terminal values, the registration itself survives them.
///
/// The registered value spells `registred` - the historical wire spelling is
/// what downstream consumers match on, so it is preserved verbatim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Unregistered,
    Registering,
    #[serde(rename = "registred")]
    Registered,
    Connecting,
    Connected,
    Disconnected,
    Ended,
}

impl fmt::Display for CallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CallState::Unregistered => "unregistered",
            CallState::Registering => "registering",
            CallState::Registered => "registred",
            CallState::Connecting => "connecting",
            CallState::Connected => "connected",
            CallState::Disconnected => "disconnected",
            CallState::Ended => "ended",
        };
        write!(f, "{}", s)
    }
}

/// Details of an inbound invitation awaiting an accept/reject decision.
#[derive(Debug, Clone)]
pub struct InvitationInfo {
    /// Identity of the inviting party
    pub from: String,
    /// When the invitation was surfaced
    pub received_at: DateTime<Utc>,
}

/// Receives facade notifications.
///
/// All methods default to no-ops except the state change, which every
/// consumer cares about. Handlers run on the orchestrator's tasks and must
/// not block.
#[async_trait]
pub trait CallEventHandler: Send + Sync {
    async fn on_call_state_changed(&self, state: CallState);

    async fn on_local_stream(&self, _stream: MediaStream) {}

    async fn on_remote_stream(&self, _stream: MediaStream) {}

    async fn on_invitation(&self, _info: InvitationInfo) {}

    async fn on_refer(&self) {}

    async fn on_ended(&self) {}
}
