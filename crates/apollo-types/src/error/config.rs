//! Configuration-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while resolving the client identity and endpoint.
///
/// All of these are fatal at startup: synchronization never begins.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// No application identifier was supplied
    #[error("app.id not defined")]
    MissingAppId,

    /// No environment name was supplied
    #[error("env not defined")]
    MissingEnv,

    /// Environment name does not match any known tag or alias
    #[error("Unknown environment: {value}")]
    UnknownEnv {
        /// The rejected environment name
        value: String,
    },

    /// No meta server base URL is known for the environment
    #[error("No meta server configured for environment {env}")]
    MissingMetaServer {
        /// Canonical environment tag
        env: String,
    },

    /// Bootstrap identity file could not be read
    #[error("Bootstrap file read error at {path}: {message}")]
    BootstrapRead {
        /// Filesystem path of the bootstrap document
        path: String,
        /// Description of the read failure
        message: String,
    },

    /// Bootstrap identity file is not valid JSON
    #[error("Bootstrap file parse error: {message}")]
    BootstrapParse {
        /// Description of the parse failure
        message: String,
    },
}

impl ConfigError {
    /// Create a parse error from a serde_json error.
    pub fn from_json_error(e: &serde_json::Error) -> Self {
        Self::BootstrapParse { message: e.to_string() }
    }

    /// Create a read error from an IO error.
    pub fn from_io_error(path: impl Into<String>, e: &std::io::Error) -> Self {
        Self::BootstrapRead { path: path.into(), message: e.to_string() }
    }
}
