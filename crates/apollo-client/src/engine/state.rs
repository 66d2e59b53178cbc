//! Lifecycle states of the sync engine.

use std::fmt;

/// Where the engine is in its lifecycle.
///
/// `Uninitialized -> Bootstrapping -> Running <-> Degraded`, ending in
/// `Stopped` after shutdown, or `Failed` if bootstrap found neither a remote
/// nor a local copy of the default namespace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum EngineState {
    #[default]
    Uninitialized,
    Bootstrapping,
    Running,
    /// Last long-poll iteration failed; the loop is backing off.
    Degraded,
    Stopped,
    Failed,
}

impl EngineState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Bootstrapping => "bootstrapping",
            Self::Running => "running",
            Self::Degraded => "degraded",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one long-poll iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// 200: these namespaces advanced and were re-fetched.
    Changed(Vec<String>),
    /// 304 within the keep-alive window.
    Unchanged,
    /// 304 after the keep-alive threshold; every cached namespace re-fetched.
    KeepAlive,
}
