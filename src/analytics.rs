//! Metrics sink for playback and watch-behavior events.
//!
//! Fire-and-forget: every event is `(name, params, timestamp)` and submission
//! must never block the coordinator loop. The [`Analytics`] handle is cheap to
//! clone and can be disabled at runtime or constructed as a no-op `dummy()`
//! for components that don't need reporting (the pool's event-sender idiom).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender, unbounded};
use log::debug;
use serde_json::{Map, Value, json};

use crate::core::clock::SharedClock;

/// Event names, shared between emitters and sinks.
pub mod event {
    // Playback performance
    pub const VIDEO_BUFFERING_START: &str = "video_buffering_start";
    pub const VIDEO_BUFFERING_END: &str = "video_buffering_end";
    pub const VIDEO_READY: &str = "video_ready";
    pub const VIDEO_PLAY_START: &str = "video_play_start";
    pub const VIDEO_PLAY_ERROR: &str = "video_play_error";
    pub const VIDEO_FIRST_FRAME: &str = "video_first_frame";
    pub const VIDEO_PERFORMANCE_SUMMARY: &str = "video_performance_summary";

    // Watch behavior
    pub const VIDEO_VIEW_START: &str = "video_view_start";
    pub const VIDEO_WATCH_COMPLETE: &str = "video_watch_complete";
    pub const VIDEO_PAUSE: &str = "video_pause";
    pub const VIDEO_SEEK: &str = "video_seek";

    // Feed paging
    pub const PAGE_LOAD_MORE: &str = "page_load_more";
}

/// Parameter keys, shared between emitters and sinks.
pub mod key {
    pub const VIDEO_ID: &str = "video_id";
    pub const POSITION: &str = "position";
    pub const DURATION: &str = "duration";
    pub const TIMESTAMP: &str = "timestamp";
    pub const ERROR_CODE: &str = "error_code";
    pub const ERROR_MESSAGE: &str = "error_message";
    pub const BUFFERING_COUNT: &str = "buffering_count";
    pub const SEEK_FROM: &str = "seek_from";
    pub const SEEK_TO: &str = "seek_to";
    pub const PAGE_NUMBER: &str = "page_number";
    pub const VIDEO_URL: &str = "video_url";
    pub const AUTHOR_NAME: &str = "author_name";
}

/// One reported metrics event.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsEvent {
    pub name: &'static str,
    pub params: Map<String, Value>,
    pub timestamp_ms: u64,
}

/// Receives metrics events. Must not block.
pub trait MetricsSink {
    fn submit(&self, event: MetricsEvent);
}

/// Cloneable reporting handle.
///
/// `track()` stamps the event with the shared clock and hands it to the sink.
/// A disabled or dummy handle drops events silently.
#[derive(Clone)]
pub struct Analytics {
    sink: Option<Arc<dyn MetricsSink + Send + Sync>>,
    enabled: Arc<AtomicBool>,
    clock: SharedClock,
}

impl Analytics {
    pub fn new(sink: Arc<dyn MetricsSink + Send + Sync>, clock: SharedClock) -> Self {
        Self {
            sink: Some(sink),
            enabled: Arc::new(AtomicBool::new(true)),
            clock,
        }
    }

    /// No-op handle (for components created before reporting is wired up).
    pub fn dummy(clock: SharedClock) -> Self {
        Self {
            sink: None,
            enabled: Arc::new(AtomicBool::new(false)),
            clock,
        }
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Report an event with parameters.
    pub fn track(&self, name: &'static str, params: Map<String, Value>) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        if let Some(ref sink) = self.sink {
            sink.submit(MetricsEvent {
                name,
                params,
                timestamp_ms: self.clock.now_ms(),
            });
        }
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }
}

impl std::fmt::Debug for Analytics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analytics")
            .field("has_sink", &self.sink.is_some())
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish()
    }
}

/// Base params every playback event carries: content identity.
pub fn base_params(video_id: &str, position: usize) -> Map<String, Value> {
    let mut params = Map::new();
    if !video_id.is_empty() {
        params.insert(key::VIDEO_ID.into(), json!(video_id));
    }
    params.insert(key::POSITION.into(), json!(position));
    params
}

/// Sink that writes every event to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl MetricsSink for LogSink {
    fn submit(&self, event: MetricsEvent) {
        debug!(
            "[analytics] {} @{}ms {}",
            event.name,
            event.timestamp_ms,
            Value::Object(event.params.clone())
        );
    }
}

/// Sink backed by an unbounded channel; the send never blocks.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: Sender<MetricsEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<MetricsEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl MetricsSink for ChannelSink {
    fn submit(&self, event: MetricsEvent) {
        // Receiver may be gone during shutdown; dropping the event is fine.
        let _ = self.tx.send(event);
    }
}

/// Sink that buffers events in memory, for unit tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<VecDeque<MetricsEvent>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn drain(&self) -> Vec<MetricsEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|e| e.name)
            .collect()
    }
}

impl MetricsSink for MemorySink {
    fn submit(&self, event: MetricsEvent) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(event);
    }
}
