//! Error types for the Apollo client.

use std::path::PathBuf;

use apollo_types::ConfigError;
use thiserror::Error;

/// Errors that can occur while synchronizing with the config service.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Client identity or endpoint could not be resolved. Fatal at startup.
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// HTTP request failed at the connection or read level.
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Server answered with a status the caller does not accept.
    #[error("Unexpected status {status} from {url}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Requested URL.
        url: String,
    },

    /// Server returned a body that could not be decoded.
    #[error("Invalid response: {0}")]
    Protocol(String),

    /// The instance directory holds no live instance.
    #[error("No config service instances available")]
    NoInstances,

    /// No fallback snapshot has ever been written for this identity.
    #[error("Fallback snapshot not found at {}", path.display())]
    FallbackNotFound {
        /// Expected snapshot location.
        path: PathBuf,
    },

    /// Fallback snapshot exists but could not be read or written.
    #[error("Fallback snapshot unavailable at {}: {source}", path.display())]
    FallbackUnavailable {
        /// Snapshot location.
        path: PathBuf,
        /// Underlying filesystem error.
        #[source]
        source: std::io::Error,
    },

    /// A request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ClientError {
    /// Returns true for connection-level failures worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

/// Result type alias for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
