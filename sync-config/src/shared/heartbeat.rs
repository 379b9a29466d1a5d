use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Liveness configuration for a replication attempt.
///
/// Covers both the periodic control plane heartbeat and the idle timeouts applied
/// to the two connectors.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Milliseconds between control plane heartbeats.
    pub interval_ms: u64,
    /// Maximum time, in seconds, the attempt may run without a successful heartbeat
    /// before it is failed and aborted.
    pub max_gap_secs: u64,
    /// Maximum time, in seconds, the source may go without emitting anything.
    pub source_idle_timeout_secs: u64,
    /// Maximum time, in seconds, the destination may go without accepting anything.
    pub destination_idle_timeout_secs: u64,
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn max_gap(&self) -> Duration {
        Duration::from_secs(self.max_gap_secs)
    }

    pub fn source_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.source_idle_timeout_secs)
    }

    pub fn destination_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.destination_idle_timeout_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_ms: 30_000,
            max_gap_secs: 300,
            source_idle_timeout_secs: 900,
            destination_idle_timeout_secs: 7_200,
        }
    }
}
