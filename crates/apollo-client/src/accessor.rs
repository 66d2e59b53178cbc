//! Typed reads over one cached namespace.

use std::collections::HashSet;

use serde::de::DeserializeOwned;

use crate::cache::NamespaceCache;

/// Read-only view of a namespace. Every read goes to the live snapshot.
pub struct NamespaceConfig<'a> {
    cache: &'a NamespaceCache,
    namespace: String,
}

impl<'a> NamespaceConfig<'a> {
    pub fn new(cache: &'a NamespaceCache, namespace: impl Into<String>) -> Self {
        Self { cache, namespace: namespace.into() }
    }

    pub fn name(&self) -> &str {
        &self.namespace
    }

    /// Whether the namespace has a snapshot at all.
    pub fn is_loaded(&self) -> bool {
        self.cache.contains(&self.namespace)
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.cache.get(&self.namespace, key)
    }

    pub fn get_string_or(&self, key: &str, default: &str) -> String {
        self.get_string(key).unwrap_or_else(|| default.to_string())
    }

    /// Parsed integer; `default` when absent or not a number.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get_string(key).and_then(|v| v.parse().ok()).unwrap_or(default)
    }

    /// `true` only for the exact value `"true"`; `default` when absent.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get_string(key).map_or(default, |v| v == "true")
    }

    /// Comma-separated value, split without trimming.
    pub fn get_list(&self, key: &str) -> Option<Vec<String>> {
        self.get_string(key).map(|v| v.split(',').map(str::to_string).collect())
    }

    /// Value decoded as JSON. `None` when absent; an error when present but invalid.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<serde_json::Result<T>> {
        self.get_string(key).map(|v| serde_json::from_str(&v))
    }

    pub fn keys(&self) -> HashSet<String> {
        self.cache.list_keys(&self.namespace)
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> HashSet<String> {
        self.cache.list_keys_with_prefix(&self.namespace, prefix)
    }
}
