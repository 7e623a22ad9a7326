//! Anti-entropy runtime configuration.

use crate::error::SyncError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default for [`AntiEntropyConfig::max_missing_versions`].
pub const DEFAULT_MAX_MISSING_VERSIONS: u64 = 100_000;

/// Per-session tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AntiEntropyConfig {
    /// Capacity of the inbound and outbound message queues
    pub channel_capacity: usize,
    /// How long a local stop waits for `StopConnection` to be flushed
    pub shutdown_timeout_ms: u64,
    /// Upper bound on operations carried by one `SendVersions`
    pub max_versions_per_message: usize,
    /// Largest history gap a peer's clock may announce; a larger one ends
    /// the session
    pub max_missing_versions: u64,
}

impl Default for AntiEntropyConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
            shutdown_timeout_ms: 1_000,
            max_versions_per_message: 256,
            max_missing_versions: DEFAULT_MAX_MISSING_VERSIONS,
        }
    }
}

impl AntiEntropyConfig {
    /// Reject values that would stall or disable a session.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.channel_capacity == 0 {
            return Err(SyncError::config("channel_capacity must be positive"));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(SyncError::config("shutdown_timeout_ms must be positive"));
        }
        if self.max_versions_per_message == 0 {
            return Err(SyncError::config("max_versions_per_message must be positive"));
        }
        if self.max_missing_versions == 0 {
            return Err(SyncError::config("max_missing_versions must be positive"));
        }
        Ok(())
    }

    /// Shutdown timeout as a [`Duration`].
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
