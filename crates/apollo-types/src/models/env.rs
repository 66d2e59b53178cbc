//! Deployment environments and the meta-server table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// Canonical deployment environment of the config service.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Env {
    /// Local development
    Dev,
    /// Feature acceptance testing
    Fat,
    /// User acceptance testing
    Uat,
    /// Production
    Pro,
}

impl Env {
    /// All canonical environments.
    pub const ALL: [Env; 4] = [Env::Dev, Env::Fat, Env::Uat, Env::Pro];

    /// Canonical upper-case tag.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Dev => "DEV",
            Self::Fat => "FAT",
            Self::Uat => "UAT",
            Self::Pro => "PRO",
        }
    }

    /// Normalize an environment name or alias.
    ///
    /// Canonical tags (`DEV`, `FAT`, `UAT`, `PRO`, plus `LOCAL`) are accepted
    /// verbatim. Anything else goes through the lower-case alias table, where
    /// `dev` and `development` map to `FAT`.
    pub fn from_alias(name: &str) -> Option<Self> {
        match name {
            "DEV" | "LOCAL" => return Some(Self::Dev),
            "FAT" => return Some(Self::Fat),
            "UAT" => return Some(Self::Uat),
            "PRO" => return Some(Self::Pro),
            _ => {},
        }

        match name.to_lowercase().as_str() {
            "local" => Some(Self::Dev),
            "dev" | "development" | "fat" => Some(Self::Fat),
            "test" | "uat" => Some(Self::Uat),
            "pro" | "prod" | "production" => Some(Self::Pro),
            _ => None,
        }
    }

    /// Name of the environment variable that overrides this environment's
    /// meta server (e.g. `DEV_META`).
    pub fn meta_env_var(self) -> String {
        format!("{}_META", self.as_str())
    }
}

impl fmt::Display for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Env {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ConfigError::MissingEnv);
        }
        Self::from_alias(s).ok_or_else(|| ConfigError::UnknownEnv { value: s.to_string() })
    }
}

/// Environment → config-service base URL table.
///
/// Starts from compiled-in defaults; callers override individual entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaServers {
    servers: HashMap<Env, String>,
}

impl MetaServers {
    /// Empty table (no defaults).
    pub fn empty() -> Self {
        Self { servers: HashMap::new() }
    }

    /// Override (or add) the base URL for one environment.
    pub fn with_server(mut self, env: Env, url: impl Into<String>) -> Self {
        self.insert(env, url);
        self
    }

    /// Override (or add) the base URL for one environment.
    pub fn insert(&mut self, env: Env, url: impl Into<String>) {
        self.servers.insert(env, url.into().trim_end_matches('/').to_string());
    }

    /// Base URL for an environment, if known.
    pub fn get(&self, env: Env) -> Option<&str> {
        self.servers.get(&env).map(String::as_str).filter(|s| !s.is_empty())
    }
}

impl Default for MetaServers {
    fn default() -> Self {
        Self::empty()
            .with_server(Env::Dev, "http://localhost:8080")
            .with_server(Env::Fat, "http://apollo-fat:8080")
            .with_server(Env::Uat, "http://apollo-uat:8080")
            .with_server(Env::Pro, "http://apollo-pro:8080")
    }
}
