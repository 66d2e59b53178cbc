//! # Apollo Client
//!
//! Client side of the Apollo configuration service: fetches namespaces,
//! keeps them fresh through long polling, and survives outages by serving
//! the last payload persisted on disk.
//!
//! - **`directory`** - Config-service discovery and round-robin selection
//! - **`notification`** - Per-namespace change sequences sent with each poll
//! - **`cache`** - Namespace snapshots and change-event dispatch
//! - **`fallback`** - On-disk copies of the last fetched payloads
//! - **`engine`** - Bootstrap, long-poll and registry-refresh loops, client handle
//! - **`accessor`** - Typed reads over a namespace
//!
//! ## Usage
//!
//! ```no_run
//! use apollo_client::{ClientOptions, ConfigClient};
//!
//! # async fn run() -> apollo_client::ClientResult<()> {
//! let client = ConfigClient::start(ClientOptions::new("SampleApp", "dev")).await?;
//! client.subscribe(|event| {
//!     println!("{} changed: {:?}", event.namespace, event.changed_keys());
//! });
//!
//! let timeout = client.default_namespace().get_int("timeout", 30);
//! let currency = client.namespace("billing").await.get_string_or("currency", "USD");
//! # let _ = (timeout, currency);
//! client.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod accessor;
pub mod cache;
pub mod config;
pub mod directory;
pub mod engine;
pub mod error;
pub mod fallback;
mod http;
pub mod local_ip;
pub mod notification;

pub use accessor::NamespaceConfig;
pub use cache::{ChangeEvent, ChangeHandler, ConfigMap, DispatchMode, NamespaceCache};
pub use config::{ClientOptions, EndpointConfig, RetryPolicy, SyncSettings};
pub use directory::InstanceDirectory;
pub use engine::{ConfigClient, EngineState, PollOutcome, SyncEngine};
pub use error::{ClientError, ClientResult};
pub use fallback::{FallbackKey, FallbackStore};
pub use notification::NotificationTracker;

pub use apollo_types::{ConfigError, Env, MetaServers};
