//! FEEDPLAY - Short-video feed playback library
//!
//! Re-exports all modules for use by binary targets.

// Core playback (pool, coordinator, observers, timing)
pub mod core;

// App modules
pub mod analytics;
pub mod cli;
pub mod config;
pub mod feed;

// Re-export commonly used types from core
pub use core::coordinator::PlaybackCoordinator;
pub use core::pool::{PlayerPool, PoolError};
pub use core::{PlaybackEngine, SharedClock};

// Re-export app types
pub use analytics::{Analytics, MetricsEvent, MetricsSink};
pub use config::FeedPlayConfig;
pub use feed::{FeedItem, FeedPager, FeedSource, MockFeedSource};
