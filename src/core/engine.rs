//! Playback engine contract.
//!
//! **Why**: the pool manages a fixed set of expensive, stateful playback
//! engines. The core never decodes or renders; it treats an engine as a
//! capability (load one media source, report state transitions, expose
//! transport controls) so the same pool logic works over any backend.
//!
//! **Used by**: PlayerPool (slot ownership), PlaybackCoordinator (transport),
//! PerformanceObserver (consumes polled events).
//!
//! # Event delivery
//!
//! Engines buffer state transitions internally and hand them out through
//! [`PlaybackEngine::poll_events`] on the serialized coordinator loop - the
//! core's state is never mutated from another thread. Every event is tagged
//! with the engine's load generation at the time it was produced. `load()`
//! bumps the generation, so events from a superseded load are identified and
//! dropped by the pool instead of being attributed to the new binding.

use crate::core::surface::SurfaceHandle;

/// One media resource as the engine sees it: stable id plus a location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    pub video_id: String,
    pub uri: String,
}

impl MediaSource {
    pub fn new(video_id: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            video_id: video_id.into(),
            uri: uri.into(),
        }
    }
}

/// Engine playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No media queued, or stopped.
    Idle,
    /// Media queued, not enough data buffered to play.
    Buffering,
    /// Enough data buffered; playing if play-when-ready is set.
    Ready,
    /// Playback reached the end of the media.
    Ended,
    /// Engine reported a load/decode failure. Not fatal to the slot.
    Error,
}

/// Why a play/pause transition happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayPauseReason {
    /// Direct user action (tap, toggle).
    UserRequest,
    /// Pool policy, e.g. pause-others when a new position starts.
    CoordinatorPolicy,
    /// App went to background / foreground.
    AppLifecycle,
}

impl PlayPauseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            PlayPauseReason::UserRequest => "user_request",
            PlayPauseReason::CoordinatorPolicy => "coordinator_policy",
            PlayPauseReason::AppLifecycle => "app_lifecycle",
        }
    }
}

/// Cause of a playback position discontinuity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscontinuityCause {
    /// User dragged the progress bar.
    UserSeek,
    /// Engine-internal transition (loop restart, media item change).
    AutoTransition,
}

/// State transition reported by an engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    StateChanged(EngineState),
    PlayWhenReadyChanged {
        playing: bool,
        reason: PlayPauseReason,
    },
    PlaybackError {
        code: i32,
        message: String,
    },
    Discontinuity {
        cause: DiscontinuityCause,
        from_ms: u64,
        to_ms: u64,
    },
}

/// Engine event plus the load generation it belongs to.
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEngineEvent {
    pub generation: u64,
    pub event: EngineEvent,
}

/// A single opaque playback unit.
///
/// Implementations own decode/network resources; the pool owns the
/// implementation. None of these calls may block - loading is asynchronous
/// and observed through polled events.
pub trait PlaybackEngine {
    /// Stop current playback, clear any queued media, queue `media` and start
    /// preparing it. If `play_when_ready` is set, playback starts as soon as
    /// the engine reaches [`EngineState::Ready`]. Bumps the load generation.
    fn load(&mut self, media: MediaSource, play_when_ready: bool);

    /// Transport play/pause without touching the queued media.
    fn set_play_when_ready(&mut self, playing: bool, reason: PlayPauseReason);

    fn play_when_ready(&self) -> bool;

    fn state(&self) -> EngineState;

    /// Seek within the current media.
    fn seek(&mut self, to_ms: u64);

    /// Stop playback and return to [`EngineState::Idle`]. Queued media is
    /// discarded.
    fn stop(&mut self);

    /// Attach the rendering surface frames are drawn to. Re-attaching after
    /// a layout change must not reset transport state.
    fn attach_surface(&mut self, surface: SurfaceHandle);

    fn detach_surface(&mut self);

    /// Release all engine resources. The engine is unusable afterwards.
    fn release(&mut self);

    /// Drain buffered state-transition events, oldest first.
    fn poll_events(&mut self) -> Vec<TaggedEngineEvent>;

    /// Current load generation (bumped by each `load()`).
    fn generation(&self) -> u64;
}
