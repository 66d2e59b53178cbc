//! Domain models shared between the client engine and its callers.

pub mod bootstrap;
pub mod env;
pub mod instance;
pub mod payload;

pub use bootstrap::BootstrapIdentity;
pub use env::{Env, MetaServers};
pub use instance::ServiceInstance;
pub use payload::{ConfigPayload, Notification, NEVER_SYNCED};

/// Cluster used when the caller does not name one.
pub const DEFAULT_CLUSTER: &str = "default";

/// Namespace fetched at bootstrap when the caller does not name one.
pub const DEFAULT_NAMESPACE: &str = "application";
