//! `tracing` subscriber setup shared by crossline binaries and examples.
//!
//! Deployments hand the signaling layer a log verbosity as part of the
//! registration record; [`LoggingConfig::from_verbosity`] turns that string
//! into a subscriber configuration so both execution contexts log at the
//! level the deployment asked for. A `RUST_LOG` environment filter, when
//! set, refines the configured level per target.

use crate::errors::{Error, Result};
use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Maximum level that will be recorded
    pub level: Level,
    /// Emit JSON lines instead of the human-readable format
    pub json: bool,
    /// Include source file and line number in each event
    pub file_info: bool,
    /// Record span enter/exit events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json: false,
            file_info: false,
            log_spans: false,
        }
    }
}

impl LoggingConfig {
    /// Configuration at `level`, everything else defaulted.
    pub fn new(level: Level) -> Self {
        Self {
            level,
            ..Default::default()
        }
    }

    /// Configuration from the verbosity string a registration record
    /// carries (`"debug"`, `"warn"`, ...).
    pub fn from_verbosity(verbosity: &str) -> Result<Self> {
        Ok(Self::new(parse_log_level(verbosity)?))
    }

    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    pub fn with_spans(mut self) -> Self {
        self.log_spans = true;
        self
    }
}

/// Install the global subscriber described by `config`.
///
/// Fails when a subscriber is already installed (tests install their own),
/// rather than panicking the way an unconditional `init` would.
pub fn setup_logging(config: LoggingConfig) -> Result<()> {
    let filter = EnvFilter::from_default_env().add_directive(config.level.into());
    let span_events = if config.log_spans {
        FmtSpan::ACTIVE
    } else {
        FmtSpan::NONE
    };

    let builder = fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| Error::Config(format!("logging setup failed: {}", e)))
}

/// Parse a log level from a verbosity string.
pub fn parse_log_level(level: &str) -> Result<Level> {
    Level::from_str(level).map_err(|_| Error::Config(format!("Invalid log level: {}", level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_levels() {
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("WARN").unwrap(), Level::WARN);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_log_level("chatty").is_err());
    }

    #[test]
    fn verbosity_string_selects_the_level() {
        let config = LoggingConfig::from_verbosity("trace").unwrap();
        assert_eq!(config.level, Level::TRACE);
        assert!(LoggingConfig::from_verbosity("loud").is_err());
    }
}
