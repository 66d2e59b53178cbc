//! Config-service instance discovery with round-robin selection.
//!
//! The registry is a Eureka-style XML document listing every registered
//! replica of `APOLLO-CONFIGSERVICE`. Only instances reporting `UP` are kept.
//! Each successful refresh replaces the whole list; a failed refresh leaves
//! the previous list in place so selection keeps working.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use apollo_types::ServiceInstance;
use parking_lot::RwLock;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use crate::config::{EndpointConfig, RetryPolicy};
use crate::error::{ClientError, ClientResult};
use crate::http;

#[derive(Debug, Deserialize)]
struct RegistryApplication {
    #[serde(rename = "instance", default)]
    instances: Vec<RegistryInstance>,
}

#[derive(Debug, Deserialize)]
struct RegistryInstance {
    #[serde(rename = "instanceId", default)]
    instance_id: String,
    #[serde(rename = "hostName", default)]
    host_name: String,
    #[serde(default)]
    status: String,
    #[serde(rename = "homePageUrl", default)]
    home_page_url: String,
}

impl From<RegistryInstance> for ServiceInstance {
    fn from(raw: RegistryInstance) -> Self {
        Self {
            id: raw.instance_id,
            host: raw.host_name,
            status: raw.status.trim().to_string(),
            home_page_url: raw.home_page_url.trim().to_string(),
        }
    }
}

/// Parse a registry document and keep the live instances, in document order.
///
/// An `UP` instance without a parseable home page URL cannot serve fetches
/// and is dropped.
pub fn parse_registry(xml: &str) -> ClientResult<Vec<ServiceInstance>> {
    let app: RegistryApplication = quick_xml::de::from_str(xml)
        .map_err(|e| ClientError::Protocol(format!("registry XML: {}", e)))?;

    Ok(app
        .instances
        .into_iter()
        .map(ServiceInstance::from)
        .filter(ServiceInstance::is_up)
        .filter(|instance| match Url::parse(instance.base_url()) {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(
                    instance = %instance.id,
                    home_page_url = %instance.home_page_url,
                    "Skipping instance with unusable home page URL: {}",
                    e
                );
                false
            },
        })
        .collect())
}

/// Live config-service instances, refreshed from the registry.
pub struct InstanceDirectory {
    client: Client,
    retry: RetryPolicy,
    /// Replaced wholesale on refresh; readers clone the `Arc`.
    instances: RwLock<Arc<Vec<ServiceInstance>>>,
    /// Round-robin counter
    rr_counter: AtomicUsize,
}

impl InstanceDirectory {
    pub fn new(client: Client, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            instances: RwLock::new(Arc::new(Vec::new())),
            rr_counter: AtomicUsize::new(0),
        }
    }

    /// Fetch the registry document and replace the instance list.
    ///
    /// Returns the number of live instances now held. On any failure the
    /// current list is left untouched.
    pub async fn refresh(&self, endpoint: &EndpointConfig) -> ClientResult<usize> {
        let url = endpoint.registry_url();
        let body = http::get_with_retry(&self.client, &url, self.retry).await?;
        let text = std::str::from_utf8(&body)
            .map_err(|e| ClientError::Protocol(format!("registry body is not UTF-8: {}", e)))?;

        let live = parse_registry(text).map_err(|e| {
            tracing::debug!("Unparseable registry document from {}: {}", url, text);
            e
        })?;

        let count = live.len();
        self.replace(live);
        tracing::debug!(live = count, "Instance directory refreshed");
        Ok(count)
    }

    /// Install a new instance list.
    pub fn replace(&self, instances: Vec<ServiceInstance>) {
        *self.instances.write() = Arc::new(instances);
    }

    /// Next instance in round-robin order.
    pub fn select_instance(&self) -> ClientResult<ServiceInstance> {
        let instances = self.instances.read();
        if instances.is_empty() {
            return Err(ClientError::NoInstances);
        }

        let idx = self.rr_counter.fetch_add(1, Ordering::Relaxed) % instances.len();
        let selected = instances[idx].clone();
        tracing::trace!(instance = %selected.id, index = idx, total = instances.len(), "Selected config service instance");
        Ok(selected)
    }

    /// Consistent view of the current list.
    pub fn instances(&self) -> Arc<Vec<ServiceInstance>> {
        Arc::clone(&self.instances.read())
    }

    pub fn len(&self) -> usize {
        self.instances.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.read().is_empty()
    }
}
