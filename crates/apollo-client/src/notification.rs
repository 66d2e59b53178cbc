//! Per-namespace change-sequence tracking for the long-poll request.

use std::collections::HashMap;

use apollo_types::{Notification, NEVER_SYNCED};
use parking_lot::RwLock;

/// Last-seen notification id of every subscribed namespace.
#[derive(Debug, Default)]
pub struct NotificationTracker {
    sequences: RwLock<HashMap<String, i64>>,
}

impl NotificationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a namespace as never synced. No-op if already tracked.
    pub fn register(&self, namespace: &str) {
        self.sequences.write().entry(namespace.to_string()).or_insert(NEVER_SYNCED);
    }

    /// Tracked sequence, or [`NEVER_SYNCED`] for unknown namespaces.
    pub fn sequence_for(&self, namespace: &str) -> i64 {
        self.sequences.read().get(namespace).copied().unwrap_or(NEVER_SYNCED)
    }

    /// Overwrite the sequence unconditionally; the server is authoritative.
    pub fn update(&self, namespace: &str, sequence: i64) {
        self.sequences.write().insert(namespace.to_string(), sequence);
    }

    pub fn namespaces(&self) -> Vec<String> {
        self.sequences.read().keys().cloned().collect()
    }

    /// Snapshot as the list-of-pairs structure of the notify endpoint.
    pub fn notifications(&self) -> Vec<Notification> {
        self.sequences
            .read()
            .iter()
            .map(|(namespace, id)| Notification::new(namespace.clone(), *id))
            .collect()
    }

    /// JSON array of `{namespaceName, notificationId}`; entry order is unspecified.
    pub fn encode(&self) -> String {
        serde_json::to_string(&self.notifications()).unwrap_or_else(|e| {
            tracing::error!("Failed to encode notifications: {}", e);
            "[]".to_string()
        })
    }
}
