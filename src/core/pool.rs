//! Fixed-size pool of playback engines shared across feed positions.
//!
//! **Why**: engines are expensive (decoder, network, surface state), the feed
//! is unbounded. The pool decides which engine serves which position, keeps
//! preloaded neighbors warm, and reclaims the least useful slot when full -
//! without playing the wrong content after reassignment.
//!
//! **Used by**: PlaybackCoordinator (all transport and binding goes through
//! here), demo runner.
//!
//! # Eviction policy
//!
//! Among all slots except the one serving `current_position`, each bound slot
//! scores `|bound_position - target| * 100`, minus 50 if it is a preload that
//! has not been watched yet. The highest score is evicted: the farthest slot
//! loses, and a preloaded neighbor at equal distance is protected. The
//! formula and tie-break (first slot wins among equals) are fixed - tests
//! depend on them.
//!
//! # Stale events
//!
//! Every binding records the engine's load generation. `pump()` drops polled
//! events whose generation differs, so a late callback from a superseded load
//! is never attributed to the new binding.

use log::{debug, info, warn};
use thiserror::Error;

use crate::core::engine::{EngineEvent, EngineState, MediaSource, PlayPauseReason, PlaybackEngine};
use crate::core::perf::PerformanceObserver;
use crate::core::surface::SurfaceHandle;

/// Default number of engine slots.
pub const DEFAULT_POOL_CAPACITY: usize = 3;

/// Preload protection subtracted from the eviction score.
const PRELOAD_SCORE_PENALTY: i64 = 50;
/// Distance weight in the eviction score.
const DISTANCE_SCORE_WEIGHT: i64 = 100;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    /// Any operation after `release_all()` is a lifecycle bug.
    #[error("player pool used after release_all()")]
    Released,
    #[error("slot index {0} out of range")]
    BadSlot(usize),
    #[error("position {0} is not bound to any slot")]
    NotBound(usize),
}

/// One engine plus its current binding.
pub struct PoolSlot {
    engine: Box<dyn PlaybackEngine>,
    bound_position: Option<usize>,
    is_preloading: bool,
    observer: Option<PerformanceObserver>,
    binding_generation: u64,
}

impl PoolSlot {
    fn new(engine: Box<dyn PlaybackEngine>) -> Self {
        Self {
            engine,
            bound_position: None,
            is_preloading: false,
            observer: None,
            binding_generation: 0,
        }
    }

    /// Detach and finish the attached observer, if any. Always runs before a
    /// new observer is attached or new media is loaded.
    fn detach_observer(&mut self) {
        if let Some(mut observer) = self.observer.take() {
            debug!(
                "detaching observer: video={} position={}",
                observer.video_id(),
                observer.position()
            );
            observer.finish();
        }
    }
}

impl std::fmt::Debug for PoolSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSlot")
            .field("bound_position", &self.bound_position)
            .field("is_preloading", &self.is_preloading)
            .field("has_observer", &self.observer.is_some())
            .field("state", &self.engine.state())
            .finish()
    }
}

/// Fixed-size engine pool with distance-scored eviction.
///
/// Capacity is a constructor parameter: capacity 1 is the single-engine
/// configuration (preloading degrades to a no-op there), the feed default
/// is [`DEFAULT_POOL_CAPACITY`].
pub struct PlayerPool {
    slots: Vec<PoolSlot>,
    current_position: Option<usize>,
    released: bool,
}

impl PlayerPool {
    /// Create the pool; all engines are built up front and live until
    /// `release_all()`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize, mut engine_factory: impl FnMut() -> Box<dyn PlaybackEngine>) -> Self {
        assert!(capacity > 0, "pool capacity must be > 0");
        let slots = (0..capacity)
            .map(|_| PoolSlot::new(engine_factory()))
            .collect();
        info!("PlayerPool initialized: capacity={}", capacity);
        Self {
            slots,
            current_position: None,
            released: false,
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn current_position(&self) -> Option<usize> {
        self.current_position
    }

    /// Snapshot of each slot's binding, in slot order. Test/debug aid.
    pub fn bound_positions(&self) -> Vec<Option<usize>> {
        self.slots.iter().map(|s| s.bound_position).collect()
    }

    /// Index of the slot bound to `position`, if any.
    pub fn slot_for_position(&self, position: usize) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.bound_position == Some(position))
    }

    fn ensure_live(&self) -> Result<(), PoolError> {
        if self.released {
            Err(PoolError::Released)
        } else {
            Ok(())
        }
    }

    fn slot_mut(&mut self, slot: usize) -> Result<&mut PoolSlot, PoolError> {
        self.slots.get_mut(slot).ok_or(PoolError::BadSlot(slot))
    }

    /// Find the slot that will serve `position`: the one already bound to it,
    /// else a free one, else the eviction winner. Never fails on a live pool.
    pub fn allocate_or_reuse(&mut self, position: usize) -> Result<usize, PoolError> {
        self.ensure_live()?;

        if let Some(idx) = self.slot_for_position(position) {
            debug!("reusing bound slot {} for position {}", idx, position);
            return Ok(idx);
        }

        if let Some(idx) = self.slots.iter().position(|s| s.bound_position.is_none()) {
            debug!("using free slot {} for position {}", idx, position);
            return Ok(idx);
        }

        let idx = self.eviction_target(position);
        let evicted_from = self.slots[idx].bound_position;
        debug!(
            "recycling slot {}: position {:?} -> {}",
            idx, evicted_from, position
        );
        // Old listener must never see events from the new binding.
        self.slots[idx].detach_observer();
        Ok(idx)
    }

    /// Highest-scored slot excluding the one serving `current_position`.
    fn eviction_target(&self, target_position: usize) -> usize {
        let mut best: Option<(usize, i64)> = None;
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot.bound_position.is_some() && slot.bound_position == self.current_position {
                continue;
            }
            let Some(bound) = slot.bound_position else {
                continue;
            };
            let mut score = (bound as i64 - target_position as i64).abs() * DISTANCE_SCORE_WEIGHT;
            if slot.is_preloading {
                score -= PRELOAD_SCORE_PENALTY;
            }
            match best {
                Some((_, best_score)) if score <= best_score => {}
                _ => best = Some((idx, score)),
            }
        }
        // Pool of size 1 whose only slot is current: no alternative exists.
        best.map(|(idx, _)| idx).unwrap_or(0)
    }

    /// Bind `media` into `slot` for `position`.
    ///
    /// Stops whatever the slot was doing, detaches its observer, loads the
    /// new media and, unless preloading, starts playback, pauses every other
    /// slot and makes `position` current. `observer` becomes the slot's
    /// attached observer for this playback attempt.
    pub fn bind(
        &mut self,
        slot: usize,
        position: usize,
        media: MediaSource,
        preloading: bool,
        observer: Option<PerformanceObserver>,
    ) -> Result<(), PoolError> {
        self.ensure_live()?;
        debug_assert!(
            self.slot_for_position(position).is_none_or(|i| i == slot),
            "position {position} already bound to a different slot"
        );

        {
            let entry = self.slot_mut(slot)?;
            entry.detach_observer();
            // load() stops current playback and clears queued media first.
            entry.engine.load(media, !preloading);
            entry.binding_generation = entry.engine.generation();
            entry.bound_position = Some(position);
            entry.is_preloading = preloading;
            entry.observer = observer;
        }

        if !preloading {
            self.pause_all_except(slot)?;
            self.current_position = Some(position);
            debug!("playback bound: slot={} position={}", slot, position);
        } else {
            debug!("preload bound: slot={} position={}", slot, position);
        }
        Ok(())
    }

    /// Whether `position` can be promoted: a slot is bound to it and its
    /// content has been loaded (state is not Idle).
    pub fn is_promotable(&self, position: usize) -> bool {
        !self.released
            && self
                .slot_for_position(position)
                .is_some_and(|idx| self.slots[idx].engine.state() != EngineState::Idle)
    }

    /// Start playback on the slot already bound to `position` without
    /// reloading. Callers check [`is_promotable`](Self::is_promotable) first
    /// and fall back to [`bind`](Self::bind) otherwise.
    pub fn promote_to_active(
        &mut self,
        position: usize,
        observer: Option<PerformanceObserver>,
    ) -> Result<(), PoolError> {
        self.ensure_live()?;

        let Some(idx) = self.slot_for_position(position) else {
            return Err(PoolError::NotBound(position));
        };

        self.pause_all_except(idx)?;

        let slot = &mut self.slots[idx];
        slot.detach_observer();
        // Events queued before the observer existed belong to no listener.
        let _ = slot.engine.poll_events();
        slot.observer = observer;

        // The engine will not re-report a state it is already in; replay it
        // so the fresh observer sees Ready (or the pending Buffering).
        let state = slot.engine.state();
        if let Some(obs) = slot.observer.as_mut() {
            obs.on_event(&EngineEvent::StateChanged(state));
        }

        slot.engine
            .set_play_when_ready(true, PlayPauseReason::UserRequest);
        slot.is_preloading = false;
        self.current_position = Some(position);
        info!("promoted preloaded slot {} to active: position={}", idx, position);
        Ok(())
    }

    /// Detach and finish the observer of the slot bound to `position`,
    /// delivering any events still queued for the current binding first.
    /// No-op if the position is unbound or has no observer.
    ///
    /// Called when the active position changes, so the outgoing attempt's
    /// summary is emitted at hand-off rather than whenever the slot happens
    /// to be recycled.
    pub fn detach_observer_at(&mut self, position: usize) -> Result<(), PoolError> {
        self.ensure_live()?;
        let Some(idx) = self.slot_for_position(position) else {
            return Ok(());
        };
        let slot = &mut self.slots[idx];
        for tagged in slot.engine.poll_events() {
            if tagged.generation != slot.binding_generation {
                continue;
            }
            if let Some(observer) = slot.observer.as_mut() {
                observer.on_event(&tagged.event);
            }
        }
        slot.detach_observer();
        Ok(())
    }

    /// Pause every slot except `keep`, transport-level only; no resources are
    /// released.
    pub fn pause_all_except(&mut self, keep: usize) -> Result<(), PoolError> {
        self.ensure_live()?;
        for (idx, slot) in self.slots.iter_mut().enumerate() {
            if idx != keep && slot.engine.play_when_ready() {
                slot.engine
                    .set_play_when_ready(false, PlayPauseReason::CoordinatorPolicy);
                debug!("paused slot {}: position={:?}", idx, slot.bound_position);
            }
        }
        Ok(())
    }

    /// Pause everything (app went to background).
    pub fn pause_all(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        for slot in &mut self.slots {
            slot.engine
                .set_play_when_ready(false, PlayPauseReason::AppLifecycle);
        }
        debug!("paused all slots");
        Ok(())
    }

    /// Resume the slot serving the current position.
    pub fn resume_current(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        if let Some(idx) = self.current_position.and_then(|p| self.slot_for_position(p)) {
            self.slots[idx]
                .engine
                .set_play_when_ready(true, PlayPauseReason::AppLifecycle);
            debug!("resumed current: position={:?}", self.current_position);
        }
        Ok(())
    }

    /// Toggle play/pause on the current slot.
    pub fn toggle_current(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        if let Some(idx) = self.current_position.and_then(|p| self.slot_for_position(p)) {
            let playing = self.slots[idx].engine.play_when_ready();
            self.slots[idx]
                .engine
                .set_play_when_ready(!playing, PlayPauseReason::UserRequest);
            debug!("toggled current: playing={}", !playing);
        }
        Ok(())
    }

    /// Seek within the current slot's media.
    pub fn seek_current(&mut self, to_ms: u64) -> Result<(), PoolError> {
        self.ensure_live()?;
        if let Some(idx) = self.current_position.and_then(|p| self.slot_for_position(p)) {
            self.slots[idx].engine.seek(to_ms);
        }
        Ok(())
    }

    /// Attach a rendering surface to the slot serving `position`.
    pub fn attach_surface(&mut self, position: usize, surface: SurfaceHandle) -> Result<(), PoolError> {
        self.ensure_live()?;
        if let Some(idx) = self.slot_for_position(position) {
            self.slots[idx].engine.attach_surface(surface);
            debug!("surface attached: position={} {:?}", position, surface);
        } else {
            warn!("no slot bound to position {} for surface attach", position);
        }
        Ok(())
    }

    /// Drop all cached surface references (layout change). Bindings and
    /// transport state are untouched.
    pub fn detach_all_surfaces(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        for slot in &mut self.slots {
            slot.engine.detach_surface();
        }
        Ok(())
    }

    /// Drain engine events into each slot's attached observer, dropping
    /// events from superseded load generations.
    pub fn pump(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        for slot in &mut self.slots {
            let events = slot.engine.poll_events();
            for tagged in events {
                if tagged.generation != slot.binding_generation {
                    debug!(
                        "dropping stale event (gen {} != {}): {:?}",
                        tagged.generation, slot.binding_generation, tagged.event
                    );
                    continue;
                }
                if let Some(observer) = slot.observer.as_mut() {
                    observer.on_event(&tagged.event);
                }
            }
        }
        Ok(())
    }

    /// Stop and release every engine. Called exactly once at teardown; any
    /// pool operation afterwards returns [`PoolError::Released`].
    pub fn release_all(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        for slot in &mut self.slots {
            slot.detach_observer();
            slot.engine.release();
        }
        self.slots.clear();
        self.current_position = None;
        self.released = true;
        info!("released all pool engines");
        Ok(())
    }

    /// Human-readable pool state for logs.
    pub fn status(&self) -> String {
        use std::fmt::Write;
        let mut out = String::new();
        let _ = writeln!(out, "PlayerPool: current_position={:?}", self.current_position);
        for (idx, slot) in self.slots.iter().enumerate() {
            let _ = writeln!(
                out,
                "  slot {}: position={:?} preloading={} playing={} state={:?}",
                idx,
                slot.bound_position,
                slot.is_preloading,
                slot.engine.play_when_ready(),
                slot.engine.state()
            );
        }
        out
    }
}

impl std::fmt::Debug for PlayerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerPool")
            .field("capacity", &self.slots.len())
            .field("current_position", &self.current_position)
            .field("released", &self.released)
            .finish()
    }
}
