//! Per-playback-attempt performance instrumentation.
//!
//! **Why**: first-frame latency and rebuffering are the two numbers that tell
//! whether preloading is doing its job. One observer is created per playback
//! attempt and attached to the slot serving it; it converts engine state
//! transitions into timed metrics tagged with the content identity.
//!
//! **Used by**: PlayerPool (attach/detach on bind), PlaybackCoordinator
//! (creation on position select).
//!
//! Lifecycle: created when a position is prepared for playback, detached when
//! the slot is rebound or the pool is torn down. Errors are not fatal - the
//! observer stays attached so a retried or skipped position keeps reporting.

use log::{debug, info};
use serde_json::json;

use crate::analytics::{Analytics, base_params, event, key};
use crate::core::clock::SharedClock;
use crate::core::engine::{DiscontinuityCause, EngineEvent, EngineState};

/// Aggregate counters reported in the final summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PerfSummary {
    pub first_frame_ms: Option<u64>,
    pub buffering_count: u32,
    pub total_buffering_ms: u64,
    pub total_elapsed_ms: u64,
}

/// Observer for one playback attempt at one feed position.
#[derive(Debug)]
pub struct PerformanceObserver {
    video_id: String,
    position: usize,
    clock: SharedClock,
    analytics: Analytics,

    view_start_ms: u64,
    buffering_started_at: Option<u64>,
    buffering_count: u32,
    total_buffering_ms: u64,
    first_frame_ms: Option<u64>,
    play_started_at: Option<u64>,
    summary_emitted: bool,
}

impl PerformanceObserver {
    /// Create an observer; the view-start timestamp is taken immediately.
    pub fn new(
        video_id: impl Into<String>,
        position: usize,
        clock: SharedClock,
        analytics: Analytics,
    ) -> Self {
        let view_start_ms = clock.now_ms();
        Self {
            video_id: video_id.into(),
            position,
            clock,
            analytics,
            view_start_ms,
            buffering_started_at: None,
            buffering_count: 0,
            total_buffering_ms: 0,
            first_frame_ms: None,
            play_started_at: None,
            summary_emitted: false,
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn position(&self) -> usize {
        self.position
    }

    /// First-frame latency, once recorded.
    pub fn first_frame_ms(&self) -> Option<u64> {
        self.first_frame_ms
    }

    pub fn summary(&self) -> PerfSummary {
        PerfSummary {
            first_frame_ms: self.first_frame_ms,
            buffering_count: self.buffering_count,
            total_buffering_ms: self.total_buffering_ms,
            total_elapsed_ms: self.clock.now_ms().saturating_sub(self.view_start_ms),
        }
    }

    /// Consume one engine event from this observer's binding.
    pub fn on_event(&mut self, event: &EngineEvent) {
        match event {
            EngineEvent::StateChanged(state) => self.on_state_changed(*state),
            EngineEvent::PlayWhenReadyChanged { playing, reason } => {
                self.on_play_when_ready(*playing, reason.as_str())
            }
            EngineEvent::PlaybackError { code, message } => self.on_error(*code, message),
            EngineEvent::Discontinuity {
                cause: DiscontinuityCause::UserSeek,
                from_ms,
                to_ms,
            } => self.on_seek(*from_ms, *to_ms),
            EngineEvent::Discontinuity { .. } => {}
        }
    }

    /// Emit the aggregate summary. Called on detach and on playback end;
    /// at most one summary is reported per attempt.
    pub fn finish(&mut self) {
        if self.summary_emitted {
            return;
        }
        self.summary_emitted = true;

        let summary = self.summary();
        let mut params = base_params(&self.video_id, self.position);
        params.insert(
            key::BUFFERING_COUNT.into(),
            json!(summary.buffering_count),
        );
        params.insert(
            "total_buffering_time".into(),
            json!(summary.total_buffering_ms),
        );
        params.insert(
            "first_frame_time".into(),
            json!(summary.first_frame_ms.unwrap_or(0)),
        );
        params.insert("total_play_time".into(), json!(summary.total_elapsed_ms));
        self.analytics.track(event::VIDEO_PERFORMANCE_SUMMARY, params);
        debug!(
            "perf summary: video={} position={} {:?}",
            self.video_id, self.position, summary
        );
    }

    fn on_state_changed(&mut self, state: EngineState) {
        let now = self.clock.now_ms();
        match state {
            EngineState::Idle => {
                debug!("engine idle: video={}", self.video_id);
            }
            EngineState::Buffering => {
                self.buffering_started_at = Some(now);
                self.buffering_count += 1;

                let mut params = base_params(&self.video_id, self.position);
                params.insert(key::TIMESTAMP.into(), json!(now));
                self.analytics.track(event::VIDEO_BUFFERING_START, params);
            }
            EngineState::Ready => {
                if let Some(started) = self.buffering_started_at.take() {
                    let duration = now.saturating_sub(started);
                    self.total_buffering_ms += duration;

                    let mut params = base_params(&self.video_id, self.position);
                    params.insert(key::DURATION.into(), json!(duration));
                    params.insert(key::BUFFERING_COUNT.into(), json!(self.buffering_count));
                    self.analytics.track(event::VIDEO_BUFFERING_END, params);
                }

                if self.first_frame_ms.is_none() {
                    let latency = now.saturating_sub(self.view_start_ms);
                    self.first_frame_ms = Some(latency);

                    let mut params = base_params(&self.video_id, self.position);
                    params.insert("first_frame_time".into(), json!(latency));
                    self.analytics.track(event::VIDEO_FIRST_FRAME, params);
                    info!(
                        "first frame: {}ms video={} position={}",
                        latency, self.video_id, self.position
                    );
                }

                self.analytics
                    .track(event::VIDEO_READY, base_params(&self.video_id, self.position));
            }
            EngineState::Ended => {
                debug!("playback ended: video={}", self.video_id);
                self.finish();
            }
            EngineState::Error => {
                // Reported through the PlaybackError event, which carries
                // the code and message.
            }
        }
    }

    fn on_play_when_ready(&mut self, playing: bool, reason: &str) {
        let now = self.clock.now_ms();
        if playing {
            self.play_started_at = Some(now);

            let mut params = base_params(&self.video_id, self.position);
            params.insert(key::TIMESTAMP.into(), json!(now));
            params.insert("play_reason".into(), json!(reason));
            self.analytics.track(event::VIDEO_PLAY_START, params);
        } else if let Some(started) = self.play_started_at.take() {
            let duration = now.saturating_sub(started);

            let mut params = base_params(&self.video_id, self.position);
            params.insert(key::DURATION.into(), json!(duration));
            params.insert("pause_reason".into(), json!(reason));
            self.analytics.track(event::VIDEO_PAUSE, params);
        }
    }

    fn on_error(&mut self, code: i32, message: &str) {
        let mut params = base_params(&self.video_id, self.position);
        params.insert(key::ERROR_CODE.into(), json!(code));
        params.insert(key::ERROR_MESSAGE.into(), json!(message));
        self.analytics.track(event::VIDEO_PLAY_ERROR, params);
    }

    fn on_seek(&mut self, from_ms: u64, to_ms: u64) {
        let mut params = base_params(&self.video_id, self.position);
        params.insert(key::SEEK_FROM.into(), json!(from_ms));
        params.insert(key::SEEK_TO.into(), json!(to_ms));
        self.analytics.track(event::VIDEO_SEEK, params);
    }
}
