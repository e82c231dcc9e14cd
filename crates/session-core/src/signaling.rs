//! The signaling library seam.
//!
//! The wire-level protocol client (user agent, registrar, dialogs) is an
//! external collaborator. These traits describe the surface the session
//! manager drives, and [`DescriptionHandler`] is the contract the library
//! expects back from us: it calls `get_description` when it needs a local
//! description to send and `set_description` when one arrives from the
//! remote party, and it neither knows nor cares that both are satisfied by
//! another execution context.

use crate::error::SessionResult;
use crate::types::{RegistrationData, SessionState};
use async_trait::async_trait;
use crossline_media_core::SdpModifier;
use std::sync::Arc;
use tokio::sync::watch;

/// Content type of SDP bodies.
pub const SDP_CONTENT_TYPE: &str = "application/sdp";

/// A description body ready for the signaling library to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptionBody {
    pub body: String,
    pub content_type: String,
}

/// The session-description contract required by the signaling library.
#[async_trait]
pub trait DescriptionHandler: Send + Sync {
    /// Produce the local description for the current negotiation step.
    async fn get_description(&self, modifiers: Vec<SdpModifier>) -> SessionResult<DescriptionBody>;

    /// Consume a description received from the remote party.
    async fn set_description(&self, sdp: String, modifiers: Vec<SdpModifier>)
        -> SessionResult<()>;

    /// Whether this handler understands bodies of `content_type`.
    fn has_description(&self, content_type: &str) -> bool;

    /// Release the handler. Idempotent.
    fn close(&self);
}

/// One signaling session (an outbound invite or an inbound invitation).
#[async_trait]
pub trait SignalingSession: Send + Sync {
    /// Identity of the remote party.
    fn remote_target(&self) -> String;

    fn state(&self) -> SessionState;

    /// Watch for state changes. The sender side must outlive the session;
    /// losing it before `Terminated` is a broken invariant.
    fn state_changes(&self) -> watch::Receiver<SessionState>;

    /// (Re)send the INVITE for this session.
    async fn invite(&self) -> SessionResult<()>;

    /// Accept an inbound invitation with the given description handler.
    async fn accept(&self, handler: Arc<dyn DescriptionHandler>) -> SessionResult<()>;

    /// Decline an inbound invitation.
    async fn reject(&self) -> SessionResult<()>;

    /// Cancel an outbound session that has not been established.
    async fn cancel(&self) -> SessionResult<()>;

    /// Terminate an established session.
    async fn bye(&self) -> SessionResult<()>;
}

/// Notifications the signaling library pushes at the session manager.
pub trait ClientDelegate: Send + Sync {
    /// An inbound invitation arrived. Not auto-accepted; the consumer
    /// decides.
    fn on_invitation(&self, session: Arc<dyn SignalingSession>);

    /// A referral arrived.
    fn on_refer(&self);

    /// Registration was confirmed (`true`) or lost (`false`).
    fn on_registration_state(&self, registered: bool);
}

/// The signaling library itself.
#[async_trait]
pub trait SignalingClient: Send + Sync {
    /// Start the user agent with the registration record and delegate.
    async fn start(
        &self,
        registration: RegistrationData,
        delegate: Arc<dyn ClientDelegate>,
    ) -> SessionResult<()>;

    /// Send a registration request. Confirmation arrives through
    /// [`ClientDelegate::on_registration_state`].
    async fn register(&self) -> SessionResult<()>;

    /// Drop the registration.
    async fn unregister(&self) -> SessionResult<()>;

    /// Create an outbound session toward `target` and send its INVITE,
    /// negotiating through `handler`.
    async fn invite(
        &self,
        target: &str,
        handler: Arc<dyn DescriptionHandler>,
    ) -> SessionResult<Arc<dyn SignalingSession>>;

    /// Stop the user agent.
    async fn stop(&self) -> SessionResult<()>;
}
