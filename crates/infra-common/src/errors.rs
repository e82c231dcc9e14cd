//! Error types for infrastructure components.

use thiserror::Error;

/// Errors produced by infrastructure components.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal invariant violation
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for infrastructure operations.
pub type Result<T> = std::result::Result<T, Error>;
