//! Common infrastructure for the crossline stack.
//!
//! This crate holds the pieces every other crossline layer leans on:
//!
//! - [`events`] - a synchronous, typed event dispatcher with durable and
//!   exclusive listener registration
//! - [`channel`] - the duplex, ordered, in-process message channel that
//!   connects the foreground (media) and background (signaling) contexts
//! - [`logging`] - `tracing` subscriber setup shared by binaries and tests
//! - [`retry`] - exponential backoff with jitter for recoverable failures
//!
//! Nothing in this crate knows about SIP, SDP, or media. It is deliberately
//! protocol-free so both execution contexts can depend on it without pulling
//! in the other side's world.

pub mod channel;
pub mod errors;
pub mod events;
pub mod logging;
pub mod retry;

pub use channel::{pair, Endpoint, MessageSender};
pub use errors::{Error, Result};
pub use events::{EventDispatcher, ListenerId, Registration};
pub use retry::{retry_with_backoff, Recoverable, RetryConfig};
