//! Client options, resolved endpoint, and engine timing settings.

use std::path::{Path, PathBuf};
use std::time::Duration;

use apollo_types::{BootstrapIdentity, ConfigError, Env, MetaServers, DEFAULT_CLUSTER, DEFAULT_NAMESPACE};
use url::Url;

use crate::cache::DispatchMode;
use crate::error::ClientResult;
use crate::local_ip;

/// Environment variable that relocates the fallback snapshot root.
pub const CACHE_DIR_ENV: &str = "APOLLO_CACHE_DIR";

/// Directory under the user's home holding fallback snapshots.
pub const CACHE_DIR_NAME: &str = ".apollo";

/// Bounded retry for registry requests: fixed delay, connection failures only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { max_attempts: 5, delay: Duration::from_secs(1) }
    }
}

/// Timing and behaviour knobs of the sync engine.
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Period of the registry-refresh loop.
    pub registry_refresh_interval: Duration,
    /// Sleep after a failed long-poll iteration.
    pub error_backoff: Duration,
    /// Age of the last full update after which a 304 triggers a re-fetch of
    /// every cached namespace.
    pub keepalive_threshold: Duration,
    /// Client-side timeout of the long-poll request; must exceed the server's
    /// hold window (60 s).
    pub poll_timeout: Duration,
    /// Timeout of config and registry requests.
    pub fetch_timeout: Duration,
    pub registry_retry: RetryPolicy,
    pub dispatch: DispatchMode,
    /// Build config-fetch URLs from a round-robin selected instance instead
    /// of the resolved meta server.
    pub route_via_instances: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            registry_refresh_interval: Duration::from_secs(30),
            error_backoff: Duration::from_secs(30),
            keepalive_threshold: Duration::from_secs(12 * 60 * 60),
            poll_timeout: Duration::from_secs(90),
            fetch_timeout: Duration::from_secs(30),
            registry_retry: RetryPolicy::default(),
            dispatch: DispatchMode::default(),
            route_via_instances: false,
        }
    }
}

/// Caller-facing options, resolved into an [`EndpointConfig`] at startup.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub app_id: String,
    /// Environment name or alias (see [`Env::from_alias`]).
    pub env: String,
    pub cluster: String,
    pub namespace: String,
    /// Overrides applied on top of the compiled-in meta servers.
    pub meta_servers: MetaServers,
    pub local_ip: Option<String>,
    pub cache_dir: Option<PathBuf>,
    pub settings: SyncSettings,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            env: String::new(),
            cluster: DEFAULT_CLUSTER.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            meta_servers: MetaServers::empty(),
            local_ip: None,
            cache_dir: None,
            settings: SyncSettings::default(),
        }
    }
}

impl ClientOptions {
    pub fn new(app_id: impl Into<String>, env: impl Into<String>) -> Self {
        Self { app_id: app_id.into(), env: env.into(), ..Default::default() }
    }

    /// Seed app id and environment from a `{"app.id", "env"}` JSON document.
    pub fn from_bootstrap_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::from_io_error(path.display().to_string(), &e))?;
        let identity = BootstrapIdentity::from_json(&content)?;
        Ok(Self::new(identity.app_id, identity.env))
    }

    pub fn with_cluster(mut self, cluster: impl Into<String>) -> Self {
        self.cluster = cluster.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_meta_server(mut self, env: Env, url: impl Into<String>) -> Self {
        self.meta_servers.insert(env, url);
        self
    }

    pub fn with_local_ip(mut self, ip: impl Into<String>) -> Self {
        self.local_ip = Some(ip.into());
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(dir.into());
        self
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Validate identity and resolve the server base URL.
    ///
    /// Meta server priority: explicit override, then `{ENV}_META`, then the
    /// compiled-in table.
    pub fn resolve(&self) -> Result<EndpointConfig, ConfigError> {
        if self.app_id.trim().is_empty() {
            return Err(ConfigError::MissingAppId);
        }
        let env: Env = self.env.trim().parse()?;

        let server = self
            .meta_servers
            .get(env)
            .map(str::to_string)
            .or_else(|| {
                std::env::var(env.meta_env_var())
                    .ok()
                    .map(|v| v.trim().trim_end_matches('/').to_string())
                    .filter(|v| !v.is_empty())
            })
            .or_else(|| MetaServers::default().get(env).map(str::to_string))
            .ok_or_else(|| ConfigError::MissingMetaServer { env: env.to_string() })?;

        let cluster = non_empty_or(&self.cluster, DEFAULT_CLUSTER);
        let namespace = non_empty_or(&self.namespace, DEFAULT_NAMESPACE);
        let local_ip = self.local_ip.clone().unwrap_or_else(local_ip::detect);

        Ok(EndpointConfig {
            env,
            app_id: self.app_id.trim().to_string(),
            cluster,
            namespace,
            server,
            local_ip,
        })
    }

    /// Root directory for fallback snapshots.
    ///
    /// Priority:
    /// 1. explicit `cache_dir`
    /// 2. `APOLLO_CACHE_DIR` environment variable
    /// 3. `~/.apollo`
    pub fn fallback_root(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.cache_dir {
            return Some(dir.clone());
        }
        if let Ok(dir) = std::env::var(CACHE_DIR_ENV) {
            if !dir.is_empty() {
                return Some(PathBuf::from(dir));
            }
        }
        dirs::home_dir().map(|home| home.join(CACHE_DIR_NAME))
    }
}

fn non_empty_or(value: &str, default: &str) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        default.to_string()
    } else {
        trimmed.to_string()
    }
}

/// Resolved, immutable endpoint of one synchronization session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub env: Env,
    pub app_id: String,
    pub cluster: String,
    /// Default namespace, fetched at bootstrap.
    pub namespace: String,
    /// Resolved server base URL, no trailing slash.
    pub server: String,
    pub local_ip: String,
}

impl EndpointConfig {
    /// `{server}/eureka/apps/APOLLO-CONFIGSERVICE`
    pub fn registry_url(&self) -> String {
        format!("{}/eureka/apps/APOLLO-CONFIGSERVICE", self.server)
    }

    /// `{base}/configs/{appId}/{cluster}/{namespace}?ip={localIP}`
    pub fn config_url(&self, base: &str, namespace: &str) -> ClientResult<Url> {
        let mut url = Url::parse(base.trim_end_matches('/'))?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["configs", self.app_id.as_str(), self.cluster.as_str(), namespace]);
        url.query_pairs_mut().append_pair("ip", &self.local_ip);
        Ok(url)
    }

    /// `{server}/notifications/v2?appId=..&cluster=..&notifications=<json>`
    pub fn notify_url(&self, notifications: &str) -> ClientResult<Url> {
        let mut url = Url::parse(&self.server)?;
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["notifications", "v2"]);
        url.query_pairs_mut()
            .append_pair("appId", &self.app_id)
            .append_pair("cluster", &self.cluster)
            .append_pair("notifications", notifications);
        Ok(url)
    }
}
