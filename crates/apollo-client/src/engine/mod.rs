//! Synchronization engine.
//!
//! [`SyncEngine`] wires the directory, tracker, cache and fallback store
//! together. It runs a one-shot bootstrap, then two background loops:
//!
//! - **long poll**: blocks on the notify endpoint, re-fetches namespaces that
//!   advanced, and re-fetches everything after a long quiet period;
//! - **registry refresh**: keeps the instance directory current.
//!
//! Both loops log and continue on every error or panic, and stop when the
//! shutdown channel fires.

mod client;
mod state;

#[cfg(test)]
mod tests;

pub use client::ConfigClient;
pub use state::{EngineState, PollOutcome};

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use apollo_types::{ConfigPayload, Notification};
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::RwLock;
use reqwest::{Client, StatusCode};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use url::Url;

use crate::cache::{ChangeEvent, NamespaceCache};
use crate::config::{ClientOptions, EndpointConfig, SyncSettings, CACHE_DIR_NAME};
use crate::directory::InstanceDirectory;
use crate::error::{ClientError, ClientResult};
use crate::fallback::{FallbackKey, FallbackStore};
use crate::notification::NotificationTracker;

/// Owns all synchronization state of one client session.
pub struct SyncEngine {
    endpoint: EndpointConfig,
    settings: SyncSettings,
    /// Config fetches, bounded by `fetch_timeout`.
    http: Client,
    /// Long-poll requests, bounded by `poll_timeout`.
    poll_http: Client,
    directory: InstanceDirectory,
    notifications: NotificationTracker,
    cache: NamespaceCache,
    fallback: FallbackStore,
    /// Time of the last successful fetch or keep-alive sweep.
    pub(crate) last_update: RwLock<DateTime<Utc>>,
    state: RwLock<EngineState>,
    shutdown_tx: watch::Sender<bool>,
    /// Makes the next `poll_once` panic.
    #[cfg(test)]
    panic_next_poll: std::sync::atomic::AtomicBool,
}

impl SyncEngine {
    /// Resolve the endpoint and build all components. No I/O happens here
    /// apart from local IP detection.
    pub fn new(options: ClientOptions) -> ClientResult<Arc<Self>> {
        let endpoint = options.resolve()?;
        let settings = options.settings.clone();

        let http = Client::builder().timeout(settings.fetch_timeout).build()?;
        let poll_http = Client::builder().timeout(settings.poll_timeout).build()?;

        let fallback_root = options.fallback_root().unwrap_or_else(|| {
            let root = std::env::temp_dir().join(CACHE_DIR_NAME);
            tracing::warn!(
                "No home directory found, fallback snapshots go to {}",
                root.display()
            );
            root
        });

        let (shutdown_tx, _) = watch::channel(false);

        tracing::info!(
            app_id = %endpoint.app_id,
            env = %endpoint.env,
            cluster = %endpoint.cluster,
            server = %endpoint.server,
            "Apollo client configured"
        );

        Ok(Arc::new(Self {
            directory: InstanceDirectory::new(http.clone(), settings.registry_retry),
            notifications: NotificationTracker::new(),
            cache: NamespaceCache::new(settings.dispatch),
            fallback: FallbackStore::new(fallback_root),
            last_update: RwLock::new(Utc::now()),
            state: RwLock::new(EngineState::Uninitialized),
            endpoint,
            settings,
            http,
            poll_http,
            shutdown_tx,
            #[cfg(test)]
            panic_next_poll: std::sync::atomic::AtomicBool::new(false),
        }))
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }

    pub fn cache(&self) -> &NamespaceCache {
        &self.cache
    }

    pub fn directory(&self) -> &InstanceDirectory {
        &self.directory
    }

    pub fn notifications(&self) -> &NotificationTracker {
        &self.notifications
    }

    pub fn state(&self) -> EngineState {
        *self.state.read()
    }

    fn set_state(&self, next: EngineState) {
        let mut state = self.state.write();
        let current = *state;
        if current != next {
            tracing::debug!(from = %current, to = %next, "Engine state changed");
            *state = next;
        }
    }

    /// Moves between `Running` and `Degraded` only; never revives a stopped engine.
    fn set_health(&self, healthy: bool) {
        let mut state = self.state.write();
        let current = *state;
        let next = match (current, healthy) {
            (EngineState::Degraded, true) => EngineState::Running,
            (EngineState::Running, false) => EngineState::Degraded,
            _ => return,
        };
        tracing::debug!(from = %current, to = %next, "Engine state changed");
        *state = next;
    }

    fn touch(&self) {
        *self.last_update.write() = Utc::now();
    }

    fn keepalive_due(&self) -> bool {
        let elapsed = (Utc::now() - *self.last_update.read()).to_std().unwrap_or(Duration::ZERO);
        elapsed > self.settings.keepalive_threshold
    }

    fn fallback_key(&self, namespace: &str) -> FallbackKey {
        FallbackKey::new(&self.endpoint.app_id, &self.endpoint.cluster, namespace)
    }

    /// Base URL for config fetches: a discovered instance when routing via
    /// instances is on and it has a usable address, else the resolved server.
    fn fetch_base(&self) -> String {
        if self.settings.route_via_instances {
            match self.directory.select_instance() {
                Ok(instance) if Url::parse(instance.base_url()).is_ok() => {
                    return instance.base_url().to_string();
                },
                Ok(instance) => tracing::debug!(
                    instance = %instance.id,
                    "Instance has no usable home page URL, using resolved server"
                ),
                Err(e) => tracing::debug!("{}, using resolved server", e),
            }
        }
        self.endpoint.server.clone()
    }

    /// Run the one-shot startup sequence.
    ///
    /// Succeeds once the default namespace is cached from the server or from
    /// the fallback store. Otherwise the engine ends in [`EngineState::Failed`].
    pub async fn bootstrap(&self) -> ClientResult<()> {
        self.set_state(EngineState::Bootstrapping);
        let namespace = self.endpoint.namespace.clone();
        self.notifications.register(&namespace);

        match self.directory.refresh(&self.endpoint).await {
            Ok(count) => tracing::info!("Discovered {} config service instance(s)", count),
            Err(e) => {
                tracing::warn!("Registry refresh failed during bootstrap: {}", e);
                if let Err(fe) = self.load_from_fallback(&namespace).await {
                    tracing::debug!("No fallback preloaded: {}", fe);
                }
            },
        }

        match self.fetch_namespace(&namespace).await {
            Ok(_) if self.cache.contains(&namespace) => {},
            Ok(_) => {
                // Server had nothing to apply; a local copy is still better than none.
                if let Err(e) = self.load_from_fallback(&namespace).await {
                    tracing::debug!("Empty initial fetch and no fallback: {}", e);
                    self.cache.update(&namespace, Default::default());
                }
            },
            Err(e) if self.cache.contains(&namespace) => {
                tracing::warn!(namespace = %namespace, "Initial fetch failed, serving fallback: {}", e);
            },
            Err(e) => {
                tracing::warn!(namespace = %namespace, "Initial fetch failed: {}", e);
                if let Err(fe) = self.load_from_fallback(&namespace).await {
                    tracing::error!(
                        namespace = %namespace,
                        "Bootstrap failed: no remote configuration and no fallback ({})",
                        fe
                    );
                    self.set_state(EngineState::Failed);
                    return Err(fe);
                }
            },
        }

        self.set_state(EngineState::Running);
        tracing::info!(namespace = %namespace, "Apollo client bootstrapped");
        Ok(())
    }

    /// Fetch one namespace, apply it to the cache, and persist the raw payload.
    ///
    /// Returns `true` if a payload was applied. A 304 or an empty body
    /// applies nothing and is not an error.
    pub async fn fetch_namespace(&self, namespace: &str) -> ClientResult<bool> {
        let url = self.endpoint.config_url(&self.fetch_base(), namespace)?;
        let resp = self.http.get(url.clone()).send().await?;
        let status = resp.status();

        if status == StatusCode::NOT_MODIFIED {
            self.touch();
            return Ok(false);
        }
        if !status.is_success() {
            return Err(ClientError::Status { status: status.as_u16(), url: url.to_string() });
        }

        let body = resp.bytes().await?;
        if body.is_empty() {
            self.touch();
            tracing::debug!(namespace = %namespace, "Empty config body, nothing to apply");
            return Ok(false);
        }

        let event = self.apply_payload(namespace, &body)?;
        self.touch();
        tracing::info!(
            namespace = %namespace,
            changed = event.changed_keys().len(),
            "Namespace configuration updated"
        );

        if let Err(e) = self.fallback.save(&self.fallback_key(namespace), &body).await {
            tracing::warn!(namespace = %namespace, "Failed to persist fallback snapshot: {}", e);
        }
        Ok(true)
    }

    /// Populate a namespace from its fallback record.
    pub async fn load_from_fallback(&self, namespace: &str) -> ClientResult<()> {
        let key = self.fallback_key(namespace);
        let bytes = self.fallback.load(&key).await?;
        self.apply_payload(namespace, &bytes)?;
        tracing::warn!(
            namespace = %namespace,
            path = %self.fallback.path_for(&key).display(),
            "Loaded namespace from fallback snapshot"
        );
        Ok(())
    }

    fn apply_payload(&self, namespace: &str, bytes: &[u8]) -> ClientResult<Arc<ChangeEvent>> {
        let payload = ConfigPayload::from_slice(bytes).map_err(|e| {
            tracing::debug!(namespace = %namespace, "Undecodable payload: {}", String::from_utf8_lossy(bytes));
            ClientError::Protocol(format!("config payload for {}: {}", namespace, e))
        })?;
        Ok(self.cache.update(namespace, payload.configurations))
    }

    /// Make a namespace available on demand.
    ///
    /// Tries the server, then the fallback store. Returns whether the
    /// namespace is cached afterwards. The namespace is tracked for change
    /// notifications either way.
    pub async fn ensure_namespace(&self, namespace: &str) -> bool {
        if self.cache.contains(namespace) {
            return true;
        }
        self.notifications.register(namespace);

        if let Err(e) = self.fetch_namespace(namespace).await {
            tracing::warn!(namespace = %namespace, "On-demand fetch failed: {}", e);
        }
        if !self.cache.contains(namespace) {
            if let Err(e) = self.load_from_fallback(namespace).await {
                tracing::debug!(namespace = %namespace, "No fallback for on-demand namespace: {}", e);
            }
        }
        self.cache.contains(namespace)
    }

    /// One long-poll request and its follow-up fetches.
    pub async fn poll_once(&self) -> ClientResult<PollOutcome> {
        #[cfg(test)]
        if self.panic_next_poll.swap(false, std::sync::atomic::Ordering::SeqCst) {
            panic!("injected poll failure");
        }

        let url = self.endpoint.notify_url(&self.notifications.encode())?;
        let resp = self.poll_http.get(url.clone()).send().await?;

        match resp.status() {
            StatusCode::OK => {
                let body = resp.bytes().await?;
                let notifications: Vec<Notification> = serde_json::from_slice(&body)
                    .map_err(|e| ClientError::Protocol(format!("notifications: {}", e)))?;

                let mut changed = Vec::with_capacity(notifications.len());
                for Notification { namespace_name, notification_id } in notifications {
                    self.notifications.update(&namespace_name, notification_id);
                    if let Err(e) = self.fetch_namespace(&namespace_name).await {
                        tracing::warn!(namespace = %namespace_name, "Re-fetch after notification failed: {}", e);
                    }
                    changed.push(namespace_name);
                }
                Ok(PollOutcome::Changed(changed))
            },
            StatusCode::NOT_MODIFIED if self.keepalive_due() => {
                tracing::info!("No updates within keep-alive window, re-fetching all namespaces");
                self.refresh_all().await;
                self.touch();
                Ok(PollOutcome::KeepAlive)
            },
            StatusCode::NOT_MODIFIED => Ok(PollOutcome::Unchanged),
            status => Err(ClientError::Status { status: status.as_u16(), url: url.to_string() }),
        }
    }

    async fn refresh_all(&self) {
        for namespace in self.cache.namespaces() {
            if let Err(e) = self.fetch_namespace(&namespace).await {
                tracing::warn!(namespace = %namespace, "Keep-alive re-fetch failed: {}", e);
            }
        }
    }

    /// Long-poll loop. Runs until shutdown.
    pub async fn run_long_poll(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        tracing::info!("Long-poll loop started");

        while !*shutdown_rx.borrow() {
            let iteration = AssertUnwindSafe(self.poll_once()).catch_unwind();
            let result = tokio::select! {
                result = iteration => result,
                _ = shutdown_rx.changed() => break,
            };

            let failed = match result {
                Ok(Ok(outcome)) => {
                    tracing::debug!(?outcome, "Long poll completed");
                    false
                },
                Ok(Err(e)) => {
                    tracing::warn!("Long poll failed: {}", e);
                    true
                },
                Err(panic) => {
                    tracing::error!("Long poll iteration panicked: {}", panic_message(&*panic));
                    true
                },
            };

            self.set_health(!failed);
            if failed {
                tokio::select! {
                    () = tokio::time::sleep(self.settings.error_backoff) => {},
                    _ = shutdown_rx.changed() => break,
                }
            }
        }

        tracing::info!("Long-poll loop stopped");
    }

    /// Registry-refresh loop. Sleeps first, then refreshes, until shutdown.
    pub async fn run_registry_refresh(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(self.settings.registry_refresh_interval) => {},
                _ = shutdown_rx.changed() => break,
            }

            let refresh = AssertUnwindSafe(self.directory.refresh(&self.endpoint)).catch_unwind();
            let result = tokio::select! {
                result = refresh => result,
                _ = shutdown_rx.changed() => break,
            };

            match result {
                Ok(Ok(count)) => tracing::debug!(live = count, "Registry refreshed"),
                Ok(Err(e)) => tracing::warn!("Registry refresh failed: {}", e),
                Err(panic) => {
                    tracing::error!("Registry refresh panicked: {}", panic_message(&*panic));
                },
            }
        }

        tracing::info!("Registry-refresh loop stopped");
    }

    /// Spawn both background loops on the current runtime.
    pub fn spawn_loops(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(self).run_long_poll(self.shutdown_tx.subscribe())),
            tokio::spawn(Arc::clone(self).run_registry_refresh(self.shutdown_tx.subscribe())),
        ]
    }

    /// Tell both loops to stop. Idempotent.
    pub fn signal_shutdown(&self) {
        if !self.shutdown_tx.send_replace(true) {
            tracing::info!("Apollo client shutting down");
        }
        if self.state() != EngineState::Failed {
            self.set_state(EngineState::Stopped);
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
