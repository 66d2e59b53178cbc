//! Bootstrap identity document.
//!
//! A small JSON file that seeds the application id and environment:
//!
//! ```json
//! { "app.id": "SampleApp", "env": "DEV" }
//! ```

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BootstrapIdentity {
    #[serde(rename = "app.id", default)]
    pub app_id: String,
    #[serde(default)]
    pub env: String,
}

impl BootstrapIdentity {
    /// Parse the document. Field presence is validated later, when the
    /// endpoint is resolved.
    pub fn from_json(content: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(content).map_err(|e| ConfigError::from_json_error(&e))
    }
}
