//! Runtime tunables for the feed playback stack.
//!
//! Everything here has a sensible default; a JSON file can override any
//! subset thanks to `#[serde(default)]`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedPlayConfig {
    // Pool
    pub pool_capacity: usize, // Engine slots (default 3: current + both neighbors)

    // Feed paging
    pub page_size: usize,         // Items per page (default 10)
    pub load_more_trigger: usize, // Request next page this many items before the end (default 3)

    // Surface attach retry
    pub surface_retry_attempts: u32, // Attempts before giving up silently (default 3)
    pub surface_retry_delay_ms: u64, // Delay between attempts (default 50ms)

    // Timing
    pub progress_poll_interval_ms: u64, // Engine poll cadence (default 200ms)
    pub min_valid_watch_ms: u64,        // Watch intervals shorter than this are dropped (default 500ms)
}

impl Default for FeedPlayConfig {
    fn default() -> Self {
        Self {
            pool_capacity: 3,
            page_size: 10,
            load_more_trigger: 3,
            surface_retry_attempts: 3,
            surface_retry_delay_ms: 50,
            progress_poll_interval_ms: 200,
            min_valid_watch_ms: 500,
        }
    }
}

impl FeedPlayConfig {
    /// Parse from a JSON string; absent fields keep their defaults.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let cfg = FeedPlayConfig::from_json(r#"{"pool_capacity": 5}"#).unwrap();
        assert_eq!(cfg.pool_capacity, 5);
        assert_eq!(cfg.page_size, 10);
        assert_eq!(cfg.surface_retry_delay_ms, 50);
    }

    #[test]
    fn test_roundtrip() {
        let cfg = FeedPlayConfig::default();
        let text = serde_json::to_string(&cfg).unwrap();
        assert_eq!(FeedPlayConfig::from_json(&text).unwrap(), cfg);
    }
}
