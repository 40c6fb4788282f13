//! Bridge settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Minimum time between two host-side immediate flushes.
pub const MIN_TIME_BETWEEN_FLUSHES_MS: u64 = 5;

/// Number of recent callback-carrying calls kept for diagnostics.
pub const DEBUG_INFO_LIMIT: usize = 32;

/// Bridge settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Auto-flush only fires once this long has passed since the last flush.
    pub min_flush_interval_ms: u64,
    /// Keep host module/method names and recent call sites for diagnostics.
    pub debug_metadata: bool,
    pub debug_info_capacity: usize,
    /// Let callee panics unwind to the host instead of reporting them.
    pub pause_on_throw: bool,
    /// Install the logging spy at construction.
    pub spy: bool,
}

impl BridgeConfig {
    pub fn min_flush_interval(&self) -> Duration {
        Duration::from_millis(self.min_flush_interval_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            min_flush_interval_ms: MIN_TIME_BETWEEN_FLUSHES_MS,
            debug_metadata: cfg!(debug_assertions),
            debug_info_capacity: DEBUG_INFO_LIMIT,
            pause_on_throw: false,
            spy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: BridgeConfig =
            serde_json::from_str(r#"{ "min_flush_interval_ms": 16, "spy": true }"#).unwrap();
        assert_eq!(config.min_flush_interval(), Duration::from_millis(16));
        assert!(config.spy);
        assert_eq!(config.debug_info_capacity, DEBUG_INFO_LIMIT);
        assert!(!config.pause_on_throw);
    }
}
