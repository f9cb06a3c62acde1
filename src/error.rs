//! Error types for visor-cache.

use thiserror::Error;

/// The main error type for visor-cache.
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (snapshot files, log directory, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Malformed or unresolvable URL
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Network connectivity errors (transport failures, not HTTP statuses)
    #[error("Network error: {0}")]
    Network(String),

    /// A fetch did not complete in time
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// One or more manifest entries could not be precached
    #[error("Install failed: {} asset(s) could not be fetched: {}", .failed.len(), .failed.join(", "))]
    Install { failed: Vec<String> },

    /// Lifecycle event received in a state that does not accept it
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Channel communication errors
    #[error("Channel error: {0}")]
    Channel(String),

    /// Generic application error
    #[error("{0}")]
    Application(String),
}

/// Alias for Result with our Error type.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new config error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new lifecycle error.
    pub fn lifecycle(msg: impl Into<String>) -> Self {
        Self::Lifecycle(msg.into())
    }

    /// Create a new channel error.
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a new application error.
    pub fn application(msg: impl Into<String>) -> Self {
        Self::Application(msg.into())
    }

    /// True for transport-level failures (no response was received at all).
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }

    /// Check if this error is recoverable (caller can retry).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Timeout(_) | Self::Install { .. } | Self::Channel(_)
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::Network(err.to_string())
    }
}
