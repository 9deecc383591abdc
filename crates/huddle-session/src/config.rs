//! Per-connection relay configuration.
//!
//! Replaces the process-wide upgrade configuration of older designs: every
//! orchestrator gets an explicit config value, so two endpoints in one
//! process can run different policies.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which origins may open a connection.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OriginPolicy {
    /// Accept any origin (including none).
    AllowAll,
    /// Accept only the listed origins. Requests without an `Origin` header
    /// (non-browser clients) are still accepted.
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Whether a request with the given `Origin` header may connect.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match self {
            Self::AllowAll => true,
            Self::AllowList(list) => match origin {
                Some(origin) => list.iter().any(|o| o == origin),
                None => true,
            },
        }
    }
}

/// Configuration for one connection's orchestrator.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Capacity, in events, of the bus channels (produce sink and subscribe
    /// source). Applied when the shared bus is constructed, not per
    /// connection.
    pub read_buffer_size: usize,
    /// Capacity, in events, of the outbound wire buffer.
    pub write_buffer_size: usize,
    /// Origin admission policy for the upgrade handshake.
    pub origin_policy: OriginPolicy,
    /// Seconds between idle-monitor checks.
    pub idle_check_interval_secs: u64,
}

impl RelayConfig {
    /// Idle-monitor tick as a [`Duration`].
    pub fn idle_check_interval(&self) -> Duration {
        Duration::from_secs(self.idle_check_interval_secs)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            read_buffer_size: 16,
            write_buffer_size: 100,
            origin_policy: OriginPolicy::AllowAll,
            idle_check_interval_secs: 5,
        }
    }
}
