//! Caller-facing handle over a running engine.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{EngineState, SyncEngine};
use crate::accessor::NamespaceConfig;
use crate::cache::{ChangeEvent, NamespaceCache};
use crate::config::{ClientOptions, EndpointConfig};
use crate::directory::InstanceDirectory;
use crate::error::ClientResult;

/// Handle to a bootstrapped client.
///
/// Created by [`ConfigClient::start`]; stopped by [`ConfigClient::shutdown`]
/// or by dropping the handle.
pub struct ConfigClient {
    engine: Arc<SyncEngine>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl ConfigClient {
    /// Bootstrap the engine and start its background loops.
    ///
    /// Fails on invalid identity, or when the default namespace is available
    /// neither from the server nor from the fallback store.
    pub async fn start(options: ClientOptions) -> ClientResult<Self> {
        let engine = SyncEngine::new(options)?;
        engine.bootstrap().await?;
        let tasks = engine.spawn_loops();
        Ok(Self { engine, tasks: Mutex::new(tasks) })
    }

    /// Stop both loops and wait for them to exit.
    pub async fn shutdown(&self) {
        self.engine.signal_shutdown();
        let tasks = std::mem::take(&mut *self.tasks.lock());
        for task in tasks {
            if let Err(e) = task.await {
                tracing::warn!("Background task ended abnormally: {}", e);
            }
        }
    }

    pub fn state(&self) -> EngineState {
        self.engine.state()
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        self.engine.endpoint()
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub fn cache(&self) -> &NamespaceCache {
        self.engine.cache()
    }

    pub fn directory(&self) -> &InstanceDirectory {
        self.engine.directory()
    }

    /// Register a handler for change events of every namespace.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(Arc<ChangeEvent>) + Send + Sync + 'static,
    {
        self.engine.cache().subscribe(handler);
    }

    /// Value from the default namespace.
    pub fn get(&self, key: &str) -> Option<String> {
        self.engine.cache().get(&self.engine.endpoint().namespace, key)
    }

    /// Accessors over the default namespace.
    pub fn default_namespace(&self) -> NamespaceConfig<'_> {
        NamespaceConfig::new(self.engine.cache(), &self.engine.endpoint().namespace)
    }

    /// Accessors over any namespace, fetching it first if it was never seen.
    ///
    /// A namespace that is unavailable remotely and locally still yields a
    /// view; its reads return the caller's defaults.
    pub async fn namespace(&self, name: &str) -> NamespaceConfig<'_> {
        if !self.engine.ensure_namespace(name).await {
            tracing::warn!(namespace = %name, "Namespace unavailable, serving defaults");
        }
        NamespaceConfig::new(self.engine.cache(), name)
    }
}

impl Drop for ConfigClient {
    fn drop(&mut self) {
        self.engine.signal_shutdown();
    }
}
