//! Namespace snapshot cache with change notification.
//!
//! Every namespace owns one snapshot slot guarded by its own lock. Updates
//! replace the whole map (`Arc` swap under the slot lock), so readers always
//! see a complete set. The cache-level map is only touched to locate or
//! create a slot and is never held while a slot lock is taken.
//!
//! Subscribers receive a [`ChangeEvent`] for every update. In
//! [`DispatchMode::Unordered`] each (subscriber, event) pair runs as its own
//! task, with no ordering guarantee. [`DispatchMode::Ordered`] funnels events
//! through one queue per namespace, drained by a single worker, which keeps
//! update order.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::runtime::Handle;
use tokio::sync::mpsc;

/// Key/value content of one namespace.
pub type ConfigMap = HashMap<String, String>;

/// Callback invoked with every change event.
pub type ChangeHandler = Arc<dyn Fn(Arc<ChangeEvent>) + Send + Sync>;

/// How change events reach subscribers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DispatchMode {
    /// One task per subscriber per event; fire-and-forget, unordered.
    #[default]
    Unordered,
    /// One queue per namespace drained by one worker; update order preserved.
    Ordered,
}

/// Old and new content of a namespace after one update.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub namespace: String,
    /// `None` when the namespace was first seen by this update.
    pub old_values: Option<Arc<ConfigMap>>,
    pub new_values: Arc<ConfigMap>,
}

impl ChangeEvent {
    /// Keys present in the new snapshot that were absent before or now carry
    /// a different value. Removed keys are not included.
    pub fn changed_keys(&self) -> BTreeSet<String> {
        self.new_values
            .keys()
            .filter(|key| self.is_changed(key))
            .cloned()
            .collect()
    }

    pub fn is_changed(&self, key: &str) -> bool {
        let Some(new) = self.new_values.get(key) else {
            return false;
        };
        match self.old_values.as_ref().and_then(|old| old.get(key)) {
            Some(old) => old != new,
            None => true,
        }
    }

    /// Keys present before this update and absent after it.
    pub fn removed_keys(&self) -> BTreeSet<String> {
        match &self.old_values {
            Some(old) => old
                .keys()
                .filter(|key| !self.new_values.contains_key(*key))
                .cloned()
                .collect(),
            None => BTreeSet::new(),
        }
    }
}

struct Snapshot {
    values: RwLock<Arc<ConfigMap>>,
}

/// Thread-safe namespace → snapshot map.
pub struct NamespaceCache {
    namespaces: DashMap<String, Arc<Snapshot>>,
    /// Append-only for the lifetime of the cache.
    subscribers: Arc<RwLock<Vec<ChangeHandler>>>,
    mode: DispatchMode,
    /// Per-namespace delivery queues (ordered mode only).
    queues: DashMap<String, mpsc::UnboundedSender<Arc<ChangeEvent>>>,
}

impl Default for NamespaceCache {
    fn default() -> Self {
        Self::new(DispatchMode::default())
    }
}

impl NamespaceCache {
    pub fn new(mode: DispatchMode) -> Self {
        Self {
            namespaces: DashMap::new(),
            subscribers: Arc::new(RwLock::new(Vec::new())),
            mode,
            queues: DashMap::new(),
        }
    }

    fn slot(&self, namespace: &str) -> Option<Arc<Snapshot>> {
        self.namespaces.get(namespace).map(|entry| Arc::clone(entry.value()))
    }

    /// Current snapshot of a namespace.
    pub fn snapshot(&self, namespace: &str) -> Option<Arc<ConfigMap>> {
        let slot = self.slot(namespace)?;
        let values = Arc::clone(&slot.values.read());
        Some(values)
    }

    pub fn contains(&self, namespace: &str) -> bool {
        self.namespaces.contains_key(namespace)
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<String> {
        let slot = self.slot(namespace)?;
        let values = slot.values.read();
        values.get(key).cloned()
    }

    pub fn list_keys(&self, namespace: &str) -> HashSet<String> {
        self.list_keys_with_prefix(namespace, "")
    }

    pub fn list_keys_with_prefix(&self, namespace: &str, prefix: &str) -> HashSet<String> {
        let Some(slot) = self.slot(namespace) else {
            return HashSet::new();
        };
        let values = slot.values.read();
        values.keys().filter(|k| k.starts_with(prefix)).cloned().collect()
    }

    /// Names of every cached namespace.
    pub fn namespaces(&self) -> Vec<String> {
        self.namespaces.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Register a change handler. Handlers cannot be removed.
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(Arc<ChangeEvent>) + Send + Sync + 'static,
    {
        self.subscribers.write().push(Arc::new(handler));
    }

    /// Replace a namespace's snapshot and notify subscribers.
    pub fn update(&self, namespace: &str, values: ConfigMap) -> Arc<ChangeEvent> {
        let new_values = Arc::new(values);

        // Locate or create the slot; the map shard lock ends with this block.
        let existing = match self.namespaces.entry(namespace.to_string()) {
            Entry::Occupied(entry) => Some(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                entry.insert(Arc::new(Snapshot { values: RwLock::new(Arc::clone(&new_values)) }));
                None
            },
        };

        let old_values = existing.map(|slot| {
            let mut current = slot.values.write();
            std::mem::replace(&mut *current, Arc::clone(&new_values))
        });

        let event = Arc::new(ChangeEvent {
            namespace: namespace.to_string(),
            old_values,
            new_values,
        });

        tracing::debug!(
            namespace = %namespace,
            changed = event.changed_keys().len(),
            "Namespace snapshot replaced"
        );

        self.dispatch(Arc::clone(&event));
        event
    }

    fn dispatch(&self, event: Arc<ChangeEvent>) {
        let handlers: Vec<ChangeHandler> = self.subscribers.read().clone();
        if handlers.is_empty() {
            return;
        }

        let Ok(runtime) = Handle::try_current() else {
            for handler in &handlers {
                deliver(handler, &event);
            }
            return;
        };

        match self.mode {
            DispatchMode::Unordered => {
                for handler in handlers {
                    let event = Arc::clone(&event);
                    runtime.spawn(async move { deliver(&handler, &event) });
                }
            },
            DispatchMode::Ordered => self.enqueue(&runtime, event),
        }
    }

    fn enqueue(&self, runtime: &Handle, event: Arc<ChangeEvent>) {
        let namespace = event.namespace.clone();
        let tx = self
            .queues
            .entry(namespace.clone())
            .or_insert_with(|| self.spawn_worker(runtime, &namespace))
            .value()
            .clone();

        if let Err(mpsc::error::SendError(event)) = tx.send(event) {
            // Worker died with its runtime; start a fresh one.
            let tx = self.spawn_worker(runtime, &namespace);
            if tx.send(event).is_err() {
                tracing::warn!(namespace = %namespace, "Change event dropped: no delivery worker");
            }
            self.queues.insert(namespace, tx);
        }
    }

    fn spawn_worker(
        &self,
        runtime: &Handle,
        namespace: &str,
    ) -> mpsc::UnboundedSender<Arc<ChangeEvent>> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Arc<ChangeEvent>>();
        let subscribers = Arc::clone(&self.subscribers);
        let namespace = namespace.to_string();

        runtime.spawn(async move {
            while let Some(event) = rx.recv().await {
                let handlers: Vec<ChangeHandler> = subscribers.read().clone();
                for handler in &handlers {
                    deliver(handler, &event);
                }
            }
            tracing::trace!(namespace = %namespace, "Change delivery worker stopped");
        });

        tx
    }
}

fn deliver(handler: &ChangeHandler, event: &Arc<ChangeEvent>) {
    if catch_unwind(AssertUnwindSafe(|| handler(Arc::clone(event)))).is_err() {
        tracing::error!(namespace = %event.namespace, "Change handler panicked");
    }
}
