//! Watch-time tracking per feed position.
//!
//! Converts viewport scroll/settle events into view intervals: an interval
//! opens when a position is selected, pauses while the user is dragging
//! (drag time never counts as watch time), and closes on the next selection
//! or on session end. A closed view is reported as `watch_complete` only if
//! the accumulated time reaches the minimum validity threshold; shorter
//! dwells are dropped silently.

use log::debug;
use serde_json::json;

use crate::analytics::{Analytics, event, key};
use crate::core::clock::SharedClock;
use crate::feed::FeedItem;

/// Default minimum dwell for a view to count, in milliseconds.
pub const MIN_VALID_WATCH_MS: u64 = 500;

#[derive(Debug)]
struct ViewSession {
    position: usize,
    video_id: String,
    author_name: String,
    /// Timestamp of the currently open interval, `None` while dragging.
    open_since: Option<u64>,
    accumulated_ms: u64,
}

/// Accumulates per-position watch time from viewport events.
#[derive(Debug)]
pub struct ViewportTracker {
    clock: SharedClock,
    analytics: Analytics,
    min_valid_watch_ms: u64,
    current: Option<ViewSession>,
}

impl ViewportTracker {
    pub fn new(clock: SharedClock, analytics: Analytics, min_valid_watch_ms: u64) -> Self {
        Self {
            clock,
            analytics,
            min_valid_watch_ms,
            current: None,
        }
    }

    /// Position currently being tracked, if any.
    pub fn current_position(&self) -> Option<usize> {
        self.current.as_ref().map(|s| s.position)
    }

    /// A new position settled into the viewport: close out the previous view
    /// (reporting it if long enough) and open a view for the new one.
    pub fn on_position_selected(&mut self, position: usize, item: &FeedItem) {
        self.close_current(true);

        let now = self.clock.now_ms();
        let mut params = serde_json::Map::new();
        params.insert(key::VIDEO_ID.into(), json!(item.id));
        params.insert(key::POSITION.into(), json!(position));
        params.insert(key::VIDEO_URL.into(), json!(item.media_uri));
        params.insert(key::AUTHOR_NAME.into(), json!(item.author_name));
        params.insert(key::TIMESTAMP.into(), json!(now));
        self.analytics.track(event::VIDEO_VIEW_START, params);

        debug!("view start: position={} video={}", position, item.id);
        self.current = Some(ViewSession {
            position,
            video_id: item.id.clone(),
            author_name: item.author_name.clone(),
            open_since: Some(now),
            accumulated_ms: 0,
        });
    }

    /// User started dragging: bank the open interval without completing the
    /// view. Time until settle is excluded.
    pub fn on_drag_begin(&mut self) {
        let now = self.clock.now_ms();
        if let Some(session) = self.current.as_mut() {
            if let Some(open_since) = session.open_since.take() {
                let elapsed = now.saturating_sub(open_since);
                session.accumulated_ms += elapsed;
                debug!(
                    "watch paused: position={} banked={}ms",
                    session.position, elapsed
                );
            }
        }
    }

    /// Viewport settled: reopen the interval for the still-current position.
    pub fn on_scroll_settled(&mut self) {
        let now = self.clock.now_ms();
        if let Some(session) = self.current.as_mut() {
            if session.open_since.is_none() {
                session.open_since = Some(now);
                debug!("watch resumed: position={}", session.position);
            }
        }
    }

    /// Session over (screen destroyed): force-close and report the final view.
    pub fn end_session(&mut self) {
        self.close_current(true);
    }

    /// Drop all state without reporting.
    pub fn reset(&mut self) {
        self.current = None;
    }

    fn close_current(&mut self, report: bool) {
        let Some(mut session) = self.current.take() else {
            return;
        };

        let now = self.clock.now_ms();
        if let Some(open_since) = session.open_since.take() {
            session.accumulated_ms += now.saturating_sub(open_since);
        }

        if !report {
            return;
        }

        if session.accumulated_ms < self.min_valid_watch_ms {
            debug!(
                "view too short, dropped: position={} duration={}ms",
                session.position, session.accumulated_ms
            );
            return;
        }

        let mut params = serde_json::Map::new();
        params.insert(key::VIDEO_ID.into(), json!(session.video_id));
        params.insert(key::POSITION.into(), json!(session.position));
        params.insert(key::DURATION.into(), json!(session.accumulated_ms));
        params.insert(key::AUTHOR_NAME.into(), json!(session.author_name));
        self.analytics.track(event::VIDEO_WATCH_COMPLETE, params);
        debug!(
            "watch complete: position={} video={} duration={}ms",
            session.position, session.video_id, session.accumulated_ms
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::MemorySink;
    use crate::core::clock::ManualClock;
    use std::sync::Arc;

    fn item(id: &str) -> FeedItem {
        FeedItem {
            id: id.into(),
            author_name: "@Mareep".into(),
            description: "clip".into(),
            like_count: 0,
            comment_count: 0,
            favorite_count: 0,
            media_uri: format!("mem://{id}"),
        }
    }

    fn tracker(clock: &Arc<ManualClock>) -> (ViewportTracker, Arc<MemorySink>) {
        let sink = MemorySink::new();
        let analytics = Analytics::new(sink.clone(), clock.clone());
        (
            ViewportTracker::new(clock.clone(), analytics, MIN_VALID_WATCH_MS),
            sink,
        )
    }

    /// Test: dwell under the threshold emits nothing
    /// Validates: 300ms view is dropped, 600ms view completes with duration
    #[test]
    fn test_watch_time_thresholding() {
        let clock = ManualClock::new(0);
        let (mut tracker, sink) = tracker(&clock);

        tracker.on_position_selected(0, &item("1"));
        clock.advance(300);
        tracker.on_position_selected(1, &item("2"));

        let names = sink.names();
        assert!(!names.contains(&event::VIDEO_WATCH_COMPLETE));
        sink.drain();

        clock.advance(600);
        tracker.on_position_selected(2, &item("3"));

        let events = sink.drain();
        let complete = events
            .iter()
            .find(|e| e.name == event::VIDEO_WATCH_COMPLETE)
            .unwrap();
        assert_eq!(complete.params[key::DURATION], json!(600));
        assert_eq!(complete.params[key::VIDEO_ID], json!("2"));
    }

    /// Test: drag time is excluded from watch time
    /// Validates: view 0-1200ms with a 400-900ms drag accumulates 700ms
    #[test]
    fn test_drag_exclusion() {
        let clock = ManualClock::new(0);
        let (mut tracker, sink) = tracker(&clock);

        tracker.on_position_selected(0, &item("1"));
        clock.set(400);
        tracker.on_drag_begin();
        clock.set(900);
        tracker.on_scroll_settled();
        clock.set(1200);
        tracker.end_session();

        let events = sink.drain();
        let complete = events
            .iter()
            .find(|e| e.name == event::VIDEO_WATCH_COMPLETE)
            .unwrap();
        assert_eq!(complete.params[key::DURATION], json!(700));
    }

    /// Test: drag without a new selection does not complete the view
    #[test]
    fn test_drag_is_pause_not_end() {
        let clock = ManualClock::new(0);
        let (mut tracker, sink) = tracker(&clock);

        tracker.on_position_selected(0, &item("1"));
        clock.advance(800);
        tracker.on_drag_begin();

        assert!(!sink.names().contains(&event::VIDEO_WATCH_COMPLETE));
        assert_eq!(tracker.current_position(), Some(0));
    }

    /// Test: session end force-closes the open view
    #[test]
    fn test_session_end_reports_final_view() {
        let clock = ManualClock::new(0);
        let (mut tracker, sink) = tracker(&clock);

        tracker.on_position_selected(3, &item("4"));
        clock.advance(2500);
        tracker.end_session();

        let events = sink.drain();
        let complete = events
            .iter()
            .find(|e| e.name == event::VIDEO_WATCH_COMPLETE)
            .unwrap();
        assert_eq!(complete.params[key::POSITION], json!(3));
        assert_eq!(complete.params[key::DURATION], json!(2500));
    }

    /// Test: double settle does not reopen or double-count
    #[test]
    fn test_redundant_settle_ignored() {
        let clock = ManualClock::new(0);
        let (mut tracker, sink) = tracker(&clock);

        tracker.on_position_selected(0, &item("1"));
        clock.advance(300);
        tracker.on_scroll_settled(); // interval already open
        clock.advance(300);
        tracker.end_session();

        let events = sink.drain();
        let complete = events
            .iter()
            .find(|e| e.name == event::VIDEO_WATCH_COMPLETE)
            .unwrap();
        assert_eq!(complete.params[key::DURATION], json!(600));
    }
}
