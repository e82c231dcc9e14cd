//! Core types for the signaling session layer.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for one logical call attempt.
pub type CallId = Uuid;

/// Whether the local party initiated the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallDirection {
    Outgoing,
    Incoming,
}

/// State of a signaling session, as reported by the signaling library.
///
/// The set is closed by construction; there is no "unknown" value to
/// tolerate at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Initial,
    Establishing,
    Established,
    Terminating,
    Terminated,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Initial => "Initial",
            SessionState::Establishing => "Establishing",
            SessionState::Established => "Established",
            SessionState::Terminating => "Terminating",
            SessionState::Terminated => "Terminated",
        };
        write!(f, "{}", s)
    }
}

/// The opaque registration record handed to the signaling library.
///
/// Loaded externally (environment, provisioning) and passed through
/// unchanged; this layer only formats target URIs from it.
///
/// # Examples
///
/// ```rust
/// use crossline_session_core::RegistrationData;
///
/// let registration = RegistrationData::new("proxy.example.com", "1004")
///     .with_credentials("alice", "secret")
///     .with_ws_url("wss://proxy.example.com:7443")
///     .with_log_level("warn");
///
/// assert_eq!(registration.target_uri("42"), "sip:42@proxy.example.com");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistrationData {
    /// Registrar/proxy host the extension registers against
    pub proxy_address: String,
    /// Local extension number
    pub extension: String,
    /// Authorization username
    pub username: String,
    /// Authorization password
    pub password: String,
    /// Verbosity requested from the signaling library ("debug", "warn", ...)
    pub log_level: String,
    /// Websocket URL of the signaling transport
    pub ws_url: String,
}

impl RegistrationData {
    pub fn new(proxy_address: impl Into<String>, extension: impl Into<String>) -> Self {
        Self {
            proxy_address: proxy_address.into(),
            extension: extension.into(),
            username: String::new(),
            password: String::new(),
            log_level: "error".to_string(),
            ws_url: String::new(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    pub fn with_ws_url(mut self, ws_url: impl Into<String>) -> Self {
        self.ws_url = ws_url.into();
        self
    }

    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    /// The local identity URI (`sip:<extension>@<proxy>`).
    pub fn local_uri(&self) -> String {
        format!("sip:{}@{}", self.extension, self.proxy_address)
    }

    /// The URI for dialing `number` through the configured proxy.
    pub fn target_uri(&self, number: &str) -> String {
        format!("sip:{}@{}", number, self.proxy_address)
    }
}

impl fmt::Debug for RegistrationData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationData")
            .field("proxy_address", &self.proxy_address)
            .field("extension", &self.extension)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("log_level", &self.log_level)
            .field("ws_url", &self.ws_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uris_are_formatted_from_proxy() {
        let registration = RegistrationData::new("pbx.local", "1004");
        assert_eq!(registration.local_uri(), "sip:1004@pbx.local");
        assert_eq!(registration.target_uri("42"), "sip:42@pbx.local");
    }

    #[test]
    fn debug_redacts_password() {
        let registration =
            RegistrationData::new("pbx.local", "1004").with_credentials("alice", "hunter2");
        let rendered = format!("{:?}", registration);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
