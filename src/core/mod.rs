//! Core playback modules - pool, coordinator, observers, timing
//!
//! These modules form the playback engine, independent of any UI.

pub mod clock;
pub mod coordinator;
pub mod engine;
pub mod perf;
pub mod pool;
pub mod sim;
pub mod surface;
pub mod viewport;

// Re-exports for convenience
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use coordinator::PlaybackCoordinator;
pub use engine::{EngineEvent, EngineState, MediaSource, PlayPauseReason, PlaybackEngine};
pub use perf::PerformanceObserver;
pub use pool::{PlayerPool, PoolError, DEFAULT_POOL_CAPACITY};
pub use sim::{SimControl, SimEngine};
pub use surface::{SimSurfaces, SurfaceHandle, SurfaceProvider};
pub use viewport::ViewportTracker;
