//! Client configuration.

use crossline_media_core::{MediaConstraints, RtcConfiguration};
use std::time::Duration;

/// Configuration for a [`CallClient`](crate::CallClient).
///
/// # Examples
///
/// ```rust
/// use crossline_client_core::ClientConfig;
/// use crossline_media_core::MediaConstraints;
/// use std::time::Duration;
///
/// let config = ClientConfig::new()
///     .with_media(MediaConstraints { audio: true, video: false })
///     .with_negotiation_timeout(Duration::from_secs(5));
///
/// assert!(config.media.audio);
/// assert_eq!(config.negotiation_timeout, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Media kinds acquired for each call
    pub media: MediaConstraints,
    /// Peer connection configuration (ICE servers); a default STUN entry is
    /// applied when left empty
    pub rtc: RtcConfiguration,
    /// Upper bound on one negotiation round trip
    pub negotiation_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            media: MediaConstraints::audio_only(),
            rtc: RtcConfiguration::default(),
            negotiation_timeout: Duration::from_secs(10),
        }
    }
}

impl ClientConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_media(mut self, media: MediaConstraints) -> Self {
        self.media = media;
        self
    }

    pub fn with_rtc(mut self, rtc: RtcConfiguration) -> Self {
        self.rtc = rtc;
        self
    }

    pub fn with_negotiation_timeout(mut self, timeout: Duration) -> Self {
        self.negotiation_timeout = timeout;
        self
    }
}
