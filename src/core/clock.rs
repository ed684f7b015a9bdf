//! Time source abstraction for the playback core.
//!
//! All watch-time and buffering metrics are millisecond deltas taken from a
//! `Clock`. Production code uses [`SystemClock`]; tests and the demo runner
//! use [`ManualClock`] so timing-dependent behavior (watch-time thresholds,
//! drag exclusion, surface retry delays) is deterministic.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared clock handle passed to every timed component.
pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Millisecond time source.
pub trait Clock: std::fmt::Debug {
    /// Current time in milliseconds. Only deltas are meaningful.
    fn now_ms(&self) -> u64;
}

/// Wall-clock time (milliseconds since the Unix epoch).
#[derive(Debug, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn shared() -> SharedClock {
        Arc::new(SystemClock)
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    ms: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(Self {
            ms: AtomicU64::new(start_ms),
        })
    }

    /// Move time forward by `delta_ms`.
    pub fn advance(&self, delta_ms: u64) {
        self.ms.fetch_add(delta_ms, Ordering::Relaxed);
    }

    /// Jump to an absolute timestamp.
    pub fn set(&self, ms: u64) {
        self.ms.store(ms, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.ms.load(Ordering::Relaxed)
    }
}
