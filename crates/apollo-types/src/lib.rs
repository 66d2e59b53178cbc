//! # Apollo Types
//!
//! Wire models, environments, and error definitions for the Apollo config client.
//!
//! - **`error`** - Typed configuration errors raised before any network activity
//! - **`models`** - Environments, meta-server table, config/notification payloads,
//!   service instances, and the bootstrap identity document
//!
//! ## Architecture Role
//!
//! `apollo-types` sits at the bottom of the dependency graph:
//!
//! ```text
//!        apollo-types (this crate)
//!               │
//!               ▼
//!        apollo-client (sync engine)
//!               │
//!               ▼
//!          apollo-cli
//! ```
//!
//! Nothing here performs I/O; all types are plain serde data.

pub mod error;
pub mod models;

pub use error::{ConfigError, Result};

pub use models::{
    BootstrapIdentity, ConfigPayload, Env, MetaServers, Notification, ServiceInstance,
    DEFAULT_CLUSTER, DEFAULT_NAMESPACE, NEVER_SYNCED,
};
