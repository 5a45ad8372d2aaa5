use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Fixed delays between sequential steps. These pace load on the RPC and
/// DEX quote endpoints and keep one in-flight nonce per sender.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub create_delay_ms: u64,
    pub transfer_delay_ms: u64,
    pub swap_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            create_delay_ms: 100,
            transfer_delay_ms: 500,
            swap_delay_ms: 2000,
        }
    }
}

impl PacingConfig {
    /// No delays at all. Used by tests and dry runs.
    pub fn immediate() -> Self {
        Self {
            create_delay_ms: 0,
            transfer_delay_ms: 0,
            swap_delay_ms: 0,
        }
    }

    pub fn create_delay(&self) -> Duration {
        Duration::from_millis(self.create_delay_ms)
    }

    pub fn transfer_delay(&self) -> Duration {
        Duration::from_millis(self.transfer_delay_ms)
    }

    pub fn swap_delay(&self) -> Duration {
        Duration::from_millis(self.swap_delay_ms)
    }
}

/// Stall watchdog timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub check_interval_ms: u64,
    pub stall_threshold_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 10_000,
            stall_threshold_ms: 60_000,
        }
    }
}

impl WatchdogConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms.max(1))
    }

    pub fn stall_threshold(&self) -> Duration {
        Duration::from_millis(self.stall_threshold_ms)
    }
}
