//! Call orchestration facade for crossline.
//!
//! A crossline client is two cooperating execution contexts:
//!
//! ```text
//! ┌──────────────────────────┐
//! │    Presentation layer    │
//! └────────────┬─────────────┘
//!              │ CallClient (this crate)
//! ┌────────────▼─────────────┐       ┌───────────────────────────┐
//! │  foreground media loop   │◄─────►│  background signaling task │
//! │  peer connection, local  │channel│  registration, sessions,  │
//! │  stream, negotiation     │       │  description bridge        │
//! └──────────────────────────┘       └───────────────────────────┘
//! ```
//!
//! The facade fans commands out (`register`, `call`, `accept`, `reject`,
//! `disconnect`, `reconnect`, `end`) and fans lifecycle events in through a
//! [`CallEventHandler`]. The media engine and the signaling library are
//! injected as trait objects; see `crossline-media-core` and
//! `crossline-session-core` for the seams and their test doubles.
//!
//! # Example
//!
//! ```rust,no_run
//! use crossline_client_core::{CallClient, CallEventHandler, CallState, ClientConfig};
//! use crossline_session_core::RegistrationData;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl CallEventHandler for Printer {
//!     async fn on_call_state_changed(&self, state: CallState) {
//!         println!("state: {state}");
//!     }
//! }
//!
//! # async fn example(
//! #     engine: Arc<dyn crossline_media_core::MediaEngine>,
//! #     signaling: Arc<dyn crossline_session_core::SignalingClient>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let client = CallClient::new(ClientConfig::new(), engine, signaling, Arc::new(Printer));
//! client
//!     .register(RegistrationData::new("pbx.example.com", "1004"))
//!     .await?;
//! client.call("42").await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;

pub use config::ClientConfig;
pub use error::{ClientError, ClientResult};
pub use events::{CallEventHandler, CallState, InvitationInfo};
pub use orchestrator::CallClient;

// The types consumers need to drive a client.
pub use crossline_media_core::{
    IceServer, MediaConstraints, MediaStream, RtcConfiguration, SdpModifier,
};
pub use crossline_session_core::RegistrationData;
