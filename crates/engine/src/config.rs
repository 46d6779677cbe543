//! Engine configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Inbox session configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InboxConfig {
    /// Rows fetched by each snapshot load
    pub snapshot_limit: usize,
    /// First delay before re-opening a dropped change stream (ms)
    pub reconnect_backoff_initial_ms: u64,
    /// Upper bound for the reconnect delay (ms)
    pub reconnect_backoff_max_ms: u64,
    /// Buffered alerts per observer before slow observers start missing them
    pub alert_capacity: usize,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            snapshot_limit: 50,
            reconnect_backoff_initial_ms: 250,
            reconnect_backoff_max_ms: 10_000,
            alert_capacity: 64,
        }
    }
}

impl InboxConfig {
    /// Delay before reconnect attempt number `attempt` (0-based), doubling up to the cap
    pub fn reconnect_backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.min(32)).unwrap_or(u64::MAX);
        let ms = self
            .reconnect_backoff_initial_ms
            .saturating_mul(factor)
            .min(self.reconnect_backoff_max_ms);
        Duration::from_millis(ms)
    }
}
