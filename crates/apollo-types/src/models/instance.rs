//! Discovered config-service replicas.

use serde::{Deserialize, Serialize};

/// Status value marking an instance as live.
pub const STATUS_UP: &str = "UP";

/// One network-addressable replica of the config service.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServiceInstance {
    pub id: String,
    pub host: String,
    pub status: String,
    /// Registered base URL (`homePageUrl` in the registry document).
    pub home_page_url: String,
}

impl ServiceInstance {
    pub fn is_up(&self) -> bool {
        self.status == STATUS_UP
    }

    /// Base URL without a trailing slash.
    pub fn base_url(&self) -> &str {
        self.home_page_url.trim_end_matches('/')
    }
}
