//! Typed error definitions for the Apollo client.
//!
//! Only configuration problems live here: they are detected while resolving
//! the client identity, before any request is issued. Transport and protocol
//! failures belong to `apollo-client`, which owns the HTTP stack.

mod config;

pub use config::ConfigError;

/// Standard Result type using ConfigError.
pub type Result<T> = std::result::Result<T, ConfigError>;
