//! Simulated playback engine for the demo runner and tests.
//!
//! Deterministic stand-in for a real decoder: `load()` enters Buffering and
//! reaches Ready after a fixed number of [`SimControl::tick`] calls, playback
//! position advances only while playing, and errors/stale events can be
//! injected on demand. Load calls are counted per URI so tests can assert the
//! zero-reload promotion path.
//!
//! The engine itself is handed to the pool boxed; the cloneable [`SimControl`]
//! keeps a shared view for driving the simulation and inspecting counters.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use log::debug;

use crate::core::engine::{
    DiscontinuityCause, EngineEvent, EngineState, MediaSource, PlayPauseReason, PlaybackEngine,
    TaggedEngineEvent,
};
use crate::core::surface::SurfaceHandle;

/// Milliseconds of media time one `tick()` represents while playing.
const TICK_MEDIA_MS: u64 = 200;

#[derive(Debug)]
struct SimCore {
    state: EngineState,
    play_when_ready: bool,
    media: Option<MediaSource>,
    generation: u64,
    pending: Vec<TaggedEngineEvent>,
    prepare_latency_ticks: u32,
    prepare_remaining: u32,
    position_ms: u64,
    surface: Option<SurfaceHandle>,
    released: bool,
    fail_next_load: Option<(i32, String)>,
    load_counts: HashMap<String, u32>,
}

impl SimCore {
    fn push(&mut self, event: EngineEvent) {
        self.pending.push(TaggedEngineEvent {
            generation: self.generation,
            event,
        });
    }

    fn set_state(&mut self, state: EngineState) {
        if self.state != state {
            self.state = state;
            self.push(EngineEvent::StateChanged(state));
        }
    }
}

/// Simulated engine. Implements [`PlaybackEngine`] over shared state.
#[derive(Debug)]
pub struct SimEngine {
    core: Rc<RefCell<SimCore>>,
}

/// Cloneable driver/inspection handle for a [`SimEngine`].
#[derive(Debug, Clone)]
pub struct SimControl {
    core: Rc<RefCell<SimCore>>,
}

impl SimEngine {
    /// Engine that reaches Ready `prepare_latency_ticks` ticks after `load()`.
    pub fn new(prepare_latency_ticks: u32) -> Self {
        Self {
            core: Rc::new(RefCell::new(SimCore {
                state: EngineState::Idle,
                play_when_ready: false,
                media: None,
                generation: 0,
                pending: Vec::new(),
                prepare_latency_ticks,
                prepare_remaining: 0,
                position_ms: 0,
                surface: None,
                released: false,
                fail_next_load: None,
                load_counts: HashMap::new(),
            })),
        }
    }

    /// Driver handle sharing this engine's state.
    pub fn control(&self) -> SimControl {
        SimControl {
            core: Rc::clone(&self.core),
        }
    }
}

impl SimControl {
    /// Advance the simulation one step: finish pending prepare work, advance
    /// media time while playing, roll over to Ended at the media boundary.
    pub fn tick(&self) {
        let mut core = self.core.borrow_mut();
        if core.released {
            return;
        }
        if core.state == EngineState::Buffering {
            core.prepare_remaining = core.prepare_remaining.saturating_sub(1);
            if core.prepare_remaining == 0 {
                if let Some((code, message)) = core.fail_next_load.take() {
                    core.set_state(EngineState::Error);
                    core.push(EngineEvent::PlaybackError { code, message });
                } else {
                    core.set_state(EngineState::Ready);
                }
            }
        } else if core.state == EngineState::Ready && core.play_when_ready {
            core.position_ms += TICK_MEDIA_MS;
        }
    }

    /// Arrange for the in-flight (or next) load to fail when prepare finishes.
    pub fn fail_load(&self, code: i32, message: impl Into<String>) {
        self.core.borrow_mut().fail_next_load = Some((code, message.into()));
    }

    /// Force the end-of-media transition.
    pub fn finish_media(&self) {
        self.core.borrow_mut().set_state(EngineState::Ended);
    }

    /// Inject an event tagged with an arbitrary generation, as a late decode
    /// callback from a superseded load would be.
    pub fn inject_stale_event(&self, generation: u64, event: EngineEvent) {
        self.core
            .borrow_mut()
            .pending
            .push(TaggedEngineEvent { generation, event });
    }

    /// How many times `load()` was called for `uri` since creation.
    pub fn load_count(&self, uri: &str) -> u32 {
        self.core
            .borrow()
            .load_counts
            .get(uri)
            .copied()
            .unwrap_or(0)
    }

    pub fn state(&self) -> EngineState {
        self.core.borrow().state
    }

    pub fn is_playing(&self) -> bool {
        let core = self.core.borrow();
        core.play_when_ready && core.state == EngineState::Ready
    }

    pub fn position_ms(&self) -> u64 {
        self.core.borrow().position_ms
    }

    pub fn surface(&self) -> Option<SurfaceHandle> {
        self.core.borrow().surface
    }

    pub fn is_released(&self) -> bool {
        self.core.borrow().released
    }

    pub fn media_uri(&self) -> Option<String> {
        self.core.borrow().media.as_ref().map(|m| m.uri.clone())
    }
}

impl PlaybackEngine for SimEngine {
    fn load(&mut self, media: MediaSource, play_when_ready: bool) {
        let mut core = self.core.borrow_mut();
        debug_assert!(!core.released, "load on released engine");

        *core.load_counts.entry(media.uri.clone()).or_insert(0) += 1;
        core.generation += 1;
        core.media = Some(media);
        core.position_ms = 0;
        core.prepare_remaining = core.prepare_latency_ticks.max(1);
        core.play_when_ready = play_when_ready;
        // A fresh load always starts buffering, even from Buffering state.
        core.state = EngineState::Buffering;
        core.push(EngineEvent::StateChanged(EngineState::Buffering));
        if play_when_ready {
            core.push(EngineEvent::PlayWhenReadyChanged {
                playing: true,
                reason: PlayPauseReason::UserRequest,
            });
        }
    }

    fn set_play_when_ready(&mut self, playing: bool, reason: PlayPauseReason) {
        let mut core = self.core.borrow_mut();
        if core.play_when_ready != playing {
            core.play_when_ready = playing;
            core.push(EngineEvent::PlayWhenReadyChanged { playing, reason });
        }
    }

    fn play_when_ready(&self) -> bool {
        self.core.borrow().play_when_ready
    }

    fn state(&self) -> EngineState {
        self.core.borrow().state
    }

    fn seek(&mut self, to_ms: u64) {
        let mut core = self.core.borrow_mut();
        let from_ms = core.position_ms;
        core.position_ms = to_ms;
        core.push(EngineEvent::Discontinuity {
            cause: DiscontinuityCause::UserSeek,
            from_ms,
            to_ms,
        });
    }

    fn stop(&mut self) {
        let mut core = self.core.borrow_mut();
        core.media = None;
        core.position_ms = 0;
        core.set_state(EngineState::Idle);
    }

    fn attach_surface(&mut self, surface: SurfaceHandle) {
        self.core.borrow_mut().surface = Some(surface);
    }

    fn detach_surface(&mut self) {
        self.core.borrow_mut().surface = None;
    }

    fn release(&mut self) {
        let mut core = self.core.borrow_mut();
        debug!("SimEngine released (generation {})", core.generation);
        core.released = true;
        core.media = None;
        core.surface = None;
        core.pending.clear();
        core.state = EngineState::Idle;
    }

    fn poll_events(&mut self) -> Vec<TaggedEngineEvent> {
        std::mem::take(&mut self.core.borrow_mut().pending)
    }

    fn generation(&self) -> u64 {
        self.core.borrow().generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_buffers_then_becomes_ready() {
        let mut engine = SimEngine::new(2);
        let control = engine.control();

        engine.load(MediaSource::new("1", "mem://a"), true);
        assert_eq!(engine.state(), EngineState::Buffering);

        control.tick();
        assert_eq!(engine.state(), EngineState::Buffering);
        control.tick();
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(control.is_playing());
    }

    #[test]
    fn reload_bumps_generation_and_counts() {
        let mut engine = SimEngine::new(1);
        let control = engine.control();

        engine.load(MediaSource::new("1", "mem://a"), false);
        engine.load(MediaSource::new("2", "mem://b"), false);
        engine.load(MediaSource::new("1", "mem://a"), false);

        assert_eq!(engine.generation(), 3);
        assert_eq!(control.load_count("mem://a"), 2);
        assert_eq!(control.load_count("mem://b"), 1);
    }

    #[test]
    fn failed_load_reports_error_and_keeps_engine_usable() {
        let mut engine = SimEngine::new(1);
        let control = engine.control();

        engine.load(MediaSource::new("1", "mem://bad"), true);
        control.fail_load(404, "not found");
        control.tick();

        assert_eq!(engine.state(), EngineState::Error);
        let events = engine.poll_events();
        assert!(events.iter().any(|e| matches!(
            e.event,
            EngineEvent::PlaybackError { code: 404, .. }
        )));

        // A new load recovers the engine.
        engine.load(MediaSource::new("2", "mem://good"), true);
        control.tick();
        assert_eq!(engine.state(), EngineState::Ready);
    }

    #[test]
    fn events_carry_load_generation() {
        let mut engine = SimEngine::new(1);
        let control = engine.control();

        engine.load(MediaSource::new("1", "mem://a"), false);
        control.tick();
        engine.load(MediaSource::new("2", "mem://b"), false);

        let events = engine.poll_events();
        let first_gen: Vec<u64> = events
            .iter()
            .filter(|e| e.generation == 1)
            .map(|e| e.generation)
            .collect();
        let second_gen: Vec<u64> = events
            .iter()
            .filter(|e| e.generation == 2)
            .map(|e| e.generation)
            .collect();
        assert!(!first_gen.is_empty());
        assert!(!second_gen.is_empty());
    }
}
