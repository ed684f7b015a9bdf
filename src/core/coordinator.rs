//! Orchestration layer between the feed UI and the engine pool.
//!
//! **Why**: scroll gestures, paging, surface lifecycle and metrics all have
//! to agree on which position is active. The coordinator funnels every one
//! of those signals through a single serialized owner so the pool never sees
//! conflicting commands.
//!
//! **Used by**: demo runner and the embedding application's event loop.
//! Call [`PlaybackCoordinator::tick`] at the poll cadence; everything else
//! is driven by UI callbacks.

use log::{debug, info, warn};

use crate::analytics::Analytics;
use crate::config::FeedPlayConfig;
use crate::core::clock::SharedClock;
use crate::core::engine::MediaSource;
use crate::core::perf::PerformanceObserver;
use crate::core::pool::{PlayerPool, PoolError};
use crate::core::surface::SurfaceProvider;
use crate::core::viewport::ViewportTracker;
use crate::feed::FeedPager;

/// A surface that was not ready at selection time; retried on `tick()`.
#[derive(Debug)]
struct PendingAttach {
    position: usize,
    attempts_left: u32,
    next_attempt_at_ms: u64,
}

pub struct PlaybackCoordinator {
    pool: PlayerPool,
    pager: FeedPager,
    surfaces: Box<dyn SurfaceProvider>,
    analytics: Analytics,
    clock: SharedClock,
    viewport: ViewportTracker,
    config: FeedPlayConfig,
    pending_attach: Option<PendingAttach>,
    torn_down: bool,
}

impl PlaybackCoordinator {
    pub fn new(
        pool: PlayerPool,
        pager: FeedPager,
        surfaces: Box<dyn SurfaceProvider>,
        analytics: Analytics,
        clock: SharedClock,
        config: FeedPlayConfig,
    ) -> Self {
        let viewport = ViewportTracker::new(clock.clone(), analytics.clone(), config.min_valid_watch_ms);
        Self {
            pool,
            pager,
            surfaces,
            analytics,
            clock,
            viewport,
            config,
            pending_attach: None,
            torn_down: false,
        }
    }

    fn ensure_live(&self) -> Result<(), PoolError> {
        if self.torn_down {
            Err(PoolError::Released)
        } else {
            Ok(())
        }
    }

    /// Load the first feed page and start playback at position 0.
    pub fn start(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pager.load_initial();
        if self.pager.is_empty() {
            warn!("feed is empty, nothing to play");
            return Ok(());
        }
        self.select_position(0)
    }

    /// The user settled on `position`: play it, preload its successor, page
    /// the feed if near the end.
    ///
    /// A position with no loaded feed item is logged and ignored; the scroll
    /// container can briefly report positions past the loaded range.
    pub fn select_position(&mut self, position: usize) -> Result<(), PoolError> {
        self.ensure_live()?;
        let Some(item) = self.pager.item(position).cloned() else {
            warn!("select_position {} out of range ({} items)", position, self.pager.len());
            return Ok(());
        };
        info!("selected position {}: video={}", position, item.id);

        // Close out the outgoing attempt first: its summary must be emitted
        // at hand-off, not when the slot is eventually recycled.
        if let Some(prev) = self.pool.current_position() {
            if prev != position {
                self.pool.detach_observer_at(prev)?;
            }
        }

        self.viewport.on_position_selected(position, &item);

        let observer = PerformanceObserver::new(
            item.id.clone(),
            position,
            self.clock.clone(),
            self.analytics.clone(),
        );

        if self.pool.is_promotable(position) {
            // Already loaded by a preload (or a recent visit): play in place.
            self.pool.promote_to_active(position, Some(observer))?;
        } else {
            let slot = self.pool.allocate_or_reuse(position)?;
            let media = MediaSource::new(item.id.clone(), item.media_uri.clone());
            self.pool.bind(slot, position, media, false, Some(observer))?;
        }

        self.request_surface(position)?;
        self.preload_neighbor(position + 1)?;
        self.pager
            .maybe_load_more(position, self.config.load_more_trigger, &self.analytics);
        Ok(())
    }

    /// Warm up `position` in a spare slot without playing it. No-op when the
    /// position is already bound, out of range, or the pool has a single slot.
    pub fn preload_neighbor(&mut self, position: usize) -> Result<(), PoolError> {
        self.ensure_live()?;
        if self.pool.capacity() < 2 {
            return Ok(());
        }
        let Some(item) = self.pager.item(position).cloned() else {
            return Ok(());
        };
        if self.pool.slot_for_position(position).is_some() {
            return Ok(());
        }

        let slot = self.pool.allocate_or_reuse(position)?;
        let media = MediaSource::new(item.id.clone(), item.media_uri.clone());
        self.pool.bind(slot, position, media, true, None)?;
        debug!("preloading position {}: video={}", position, item.id);
        Ok(())
    }

    /// Poll-cadence heartbeat: drains engine events into observers and runs
    /// the surface retry schedule.
    pub fn tick(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.pump()?;
        self.process_pending_attach()?;
        Ok(())
    }

    fn request_surface(&mut self, position: usize) -> Result<(), PoolError> {
        self.pending_attach = None;
        if let Some(surface) = self.surfaces.surface_for(position) {
            self.pool.attach_surface(position, surface)?;
        } else {
            // View not materialized yet; retry a few times, then give up.
            // Playback continues without a surface either way.
            self.pending_attach = Some(PendingAttach {
                position,
                attempts_left: self.config.surface_retry_attempts,
                next_attempt_at_ms: self.clock.now_ms() + self.config.surface_retry_delay_ms,
            });
            debug!("surface for position {} not ready, scheduling retry", position);
        }
        Ok(())
    }

    fn process_pending_attach(&mut self) -> Result<(), PoolError> {
        let Some(pending) = self.pending_attach.as_mut() else {
            return Ok(());
        };
        if self.clock.now_ms() < pending.next_attempt_at_ms {
            return Ok(());
        }

        let position = pending.position;
        if let Some(surface) = self.surfaces.surface_for(position) {
            self.pending_attach = None;
            self.pool.attach_surface(position, surface)?;
            return Ok(());
        }

        // attempts_left can start at 0 when retries are configured off.
        pending.attempts_left = pending.attempts_left.saturating_sub(1);
        if pending.attempts_left == 0 {
            debug!("surface for position {} never materialized, giving up", position);
            self.pending_attach = None;
        } else {
            pending.next_attempt_at_ms = self.clock.now_ms() + self.config.surface_retry_delay_ms;
        }
        Ok(())
    }

    /// Layout change invalidated every surface: drop cached references and
    /// re-attach the current position without reloading media.
    pub fn invalidate_surfaces(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.detach_all_surfaces()?;
        if let Some(position) = self.pool.current_position() {
            self.request_surface(position)?;
        }
        Ok(())
    }

    /// App moved to the background.
    pub fn pause_all(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.pause_all()
    }

    /// App returned to the foreground.
    pub fn resume_current(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.resume_current()
    }

    /// Tap-to-pause / tap-to-play on the visible video.
    pub fn toggle_current(&mut self) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.toggle_current()
    }

    pub fn seek_current(&mut self, to_ms: u64) -> Result<(), PoolError> {
        self.ensure_live()?;
        self.pool.seek_current(to_ms)
    }

    /// The user started dragging; watch-time accrual stops until the scroll
    /// settles.
    pub fn on_drag_begin(&mut self) {
        self.viewport.on_drag_begin();
    }

    /// The scroll settled without changing position.
    pub fn on_scroll_settled(&mut self) {
        self.viewport.on_scroll_settled();
    }

    /// Final shutdown: closes the open watch interval and releases every
    /// engine. Safe to call more than once; only the first call acts.
    pub fn teardown(&mut self) {
        if self.torn_down {
            debug!("teardown already done");
            return;
        }
        self.torn_down = true;
        self.pending_attach = None;
        self.viewport.end_session();
        if let Err(e) = self.pool.release_all() {
            warn!("pool release failed during teardown: {}", e);
        }
        info!("coordinator torn down");
    }

    pub fn current_position(&self) -> Option<usize> {
        self.pool.current_position()
    }

    pub fn pool(&self) -> &PlayerPool {
        &self.pool
    }

    pub fn pager(&self) -> &FeedPager {
        &self.pager
    }

    /// Pool and pager state for the status line.
    pub fn status(&self) -> String {
        format!(
            "{}Feed: {} items, last_page={}",
            self.pool.status(),
            self.pager.len(),
            self.pager.is_last_page()
        )
    }
}

impl std::fmt::Debug for PlaybackCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackCoordinator")
            .field("pool", &self.pool)
            .field("pending_attach", &self.pending_attach)
            .field("torn_down", &self.torn_down)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::{Analytics, MemorySink, event};
    use crate::core::clock::ManualClock;
    use crate::core::sim::{SimControl, SimEngine};
    use crate::core::surface::SimSurfaces;
    use crate::feed::{FeedSource, MockFeedSource};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::sync::Arc;

    struct Rig {
        coordinator: PlaybackCoordinator,
        controls: Vec<SimControl>,
        surfaces: Rc<RefCell<SimSurfaces>>,
        sink: Arc<MemorySink>,
        clock: Arc<ManualClock>,
    }

    fn rig_with(config: FeedPlayConfig, feed: impl FeedSource + 'static) -> Rig {
        let clock = ManualClock::new(1_000);
        let sink = MemorySink::new();
        let analytics = Analytics::new(sink.clone(), clock.clone());

        let mut controls = Vec::new();
        let pool = PlayerPool::new(config.pool_capacity, || {
            let engine = SimEngine::new(1);
            controls.push(engine.control());
            Box::new(engine)
        });
        let pager = FeedPager::new(Box::new(feed), config.page_size);
        let surfaces = Rc::new(RefCell::new(SimSurfaces::new()));

        let coordinator = PlaybackCoordinator::new(
            pool,
            pager,
            Box::new(surfaces.clone()),
            analytics,
            clock.clone(),
            config,
        );
        Rig {
            coordinator,
            controls,
            surfaces,
            sink,
            clock,
        }
    }

    fn rig() -> Rig {
        rig_with(FeedPlayConfig::default(), MockFeedSource::new(30))
    }

    fn control_for<'a>(controls: &'a [SimControl], uri_tail: &str) -> &'a SimControl {
        controls
            .iter()
            .find(|c| c.media_uri().is_some_and(|u| u.ends_with(uri_tail)))
            .unwrap()
    }

    fn tick_engines(rig: &mut Rig) {
        for c in &rig.controls {
            c.tick();
        }
        rig.coordinator.tick().unwrap();
    }

    /// Test: start plays position 0 and preloads position 1
    #[test]
    fn test_start_plays_first_and_preloads_next() {
        let mut rig = rig();
        rig.surfaces.borrow_mut().materialize(0);
        rig.coordinator.start().unwrap();

        assert_eq!(rig.coordinator.current_position(), Some(0));
        assert!(rig.coordinator.pool().slot_for_position(1).is_some());
        tick_engines(&mut rig);

        let current = rig
            .controls
            .iter()
            .find(|c| c.is_playing())
            .expect("one engine playing");
        assert!(current.surface().is_some());
        // The preloaded neighbor is warm but paused.
        assert_eq!(rig.controls.iter().filter(|c| c.is_playing()).count(), 1);
    }

    /// Test: selecting a preloaded neighbor issues no second load
    /// Validates: swipe-to-next hits the promotion path
    #[test]
    fn test_swipe_to_preloaded_neighbor_promotes() {
        let mut rig = rig();
        rig.surfaces.borrow_mut().materialize(0);
        rig.surfaces.borrow_mut().materialize(1);
        rig.coordinator.start().unwrap();
        tick_engines(&mut rig); // both loads reach Ready

        let uri_1 = rig.coordinator.pager().item(1).unwrap().media_uri.clone();
        rig.coordinator.select_position(1).unwrap();
        tick_engines(&mut rig);

        let control = control_for(&rig.controls, &uri_1);
        assert_eq!(control.load_count(&uri_1), 1);
        assert!(control.is_playing());
        assert_eq!(rig.coordinator.current_position(), Some(1));
        // Position 2 got preloaded in turn.
        assert!(rig.coordinator.pool().slot_for_position(2).is_some());
    }

    /// Test: surface retry attaches once the view materializes
    #[test]
    fn test_surface_retry_eventually_attaches() {
        let mut rig = rig();
        rig.coordinator.start().unwrap(); // no surface for 0 yet
        tick_engines(&mut rig);
        assert!(rig.controls.iter().all(|c| c.surface().is_none()));

        rig.surfaces.borrow_mut().materialize(0);
        rig.clock.advance(50);
        rig.coordinator.tick().unwrap();

        let uri_0 = rig.coordinator.pager().item(0).unwrap().media_uri.clone();
        assert!(control_for(&rig.controls, &uri_0).surface().is_some());
    }

    /// Test: the retry gives up after the configured attempts
    /// Validates: a missing view degrades silently, playback untouched
    #[test]
    fn test_surface_retry_gives_up_silently() {
        let mut rig = rig();
        rig.coordinator.start().unwrap();

        for _ in 0..5 {
            rig.clock.advance(50);
            tick_engines(&mut rig);
        }
        assert!(rig.controls.iter().all(|c| c.surface().is_none()));

        // Materializing later does nothing until the next selection.
        rig.surfaces.borrow_mut().materialize(0);
        rig.clock.advance(50);
        rig.coordinator.tick().unwrap();
        assert!(rig.controls.iter().all(|c| c.surface().is_none()));

        // Playback proceeded without a surface the whole time.
        assert_eq!(rig.controls.iter().filter(|c| c.is_playing()).count(), 1);
    }

    /// Test: invalidation re-attaches a fresh surface without reloading
    #[test]
    fn test_invalidate_surfaces_reattaches_without_reload() {
        let mut rig = rig();
        rig.surfaces.borrow_mut().materialize(0);
        rig.coordinator.start().unwrap();
        tick_engines(&mut rig);

        let uri_0 = rig.coordinator.pager().item(0).unwrap().media_uri.clone();
        let old_surface = control_for(&rig.controls, &uri_0).surface().unwrap();

        rig.surfaces.borrow_mut().invalidate_all();
        rig.coordinator.invalidate_surfaces().unwrap();

        let control = control_for(&rig.controls, &uri_0);
        let new_surface = control.surface().unwrap();
        assert_ne!(old_surface, new_surface);
        assert_eq!(control.load_count(&uri_0), 1);
    }

    /// Test: selecting past the loaded range is a logged no-op
    #[test]
    fn test_out_of_range_selection_ignored() {
        let mut rig = rig();
        rig.coordinator.start().unwrap();
        let before = rig.coordinator.current_position();

        rig.coordinator.select_position(99).unwrap();
        assert_eq!(rig.coordinator.current_position(), before);
    }

    /// Test: nearing the end of loaded items pages the feed
    #[test]
    fn test_near_end_triggers_load_more() {
        let mut rig = rig();
        rig.surfaces.borrow_mut().materialize(0);
        rig.coordinator.start().unwrap();
        assert_eq!(rig.coordinator.pager().len(), 10);
        rig.sink.drain();

        rig.coordinator.select_position(7).unwrap();
        assert_eq!(rig.coordinator.pager().len(), 20);
        assert!(
            rig.sink
                .drain()
                .iter()
                .any(|e| e.name == event::PAGE_LOAD_MORE)
        );
    }

    /// Test: teardown is idempotent and later calls fail loudly
    #[test]
    fn test_teardown_idempotent_then_errors() {
        let mut rig = rig();
        rig.coordinator.start().unwrap();
        rig.coordinator.teardown();
        rig.coordinator.teardown(); // second call is a quiet no-op

        assert!(rig.controls.iter().all(|c| c.is_released()));
        assert_eq!(rig.coordinator.select_position(1), Err(PoolError::Released));
        assert_eq!(rig.coordinator.tick(), Err(PoolError::Released));
    }

    /// Test: a two-video session reports the full metrics lifecycle
    /// Validates: view start, first frame, watch complete and one final
    /// summary per playback attempt, in order
    #[test]
    fn test_session_metrics_lifecycle() {
        let mut rig = rig();
        rig.surfaces.borrow_mut().materialize(0);
        rig.surfaces.borrow_mut().materialize(1);

        rig.coordinator.start().unwrap();
        for _ in 0..3 {
            rig.clock.advance(200);
            tick_engines(&mut rig);
        }
        rig.coordinator.select_position(1).unwrap();
        for _ in 0..3 {
            rig.clock.advance(200);
            tick_engines(&mut rig);
        }
        rig.coordinator.teardown();

        let events = rig.sink.drain();
        let names: Vec<&str> = events.iter().map(|e| e.name).collect();

        let count = |name: &str| names.iter().filter(|n| **n == name).count();
        assert_eq!(count(event::VIDEO_VIEW_START), 2);
        assert_eq!(count(event::VIDEO_FIRST_FRAME), 2);
        assert_eq!(count(event::VIDEO_WATCH_COMPLETE), 2);
        assert_eq!(count(event::VIDEO_PERFORMANCE_SUMMARY), 2);

        // Leaving position 0 closes its view before position 1 opens.
        let complete_0 = events
            .iter()
            .position(|e| {
                e.name == event::VIDEO_WATCH_COMPLETE
                    && e.params["position"] == serde_json::json!(0)
            })
            .unwrap();
        let view_1 = events
            .iter()
            .position(|e| {
                e.name == event::VIDEO_VIEW_START
                    && e.params["position"] == serde_json::json!(1)
            })
            .unwrap();
        assert!(complete_0 < view_1);

        // Watch time at position 0 covers the three poll intervals.
        assert_eq!(events[complete_0].params["duration"], serde_json::json!(600));

        // The outgoing summary is emitted at hand-off, before the next view
        // opens, and covers only that video's own window rather than the
        // whole session.
        let summary_0 = events
            .iter()
            .position(|e| {
                e.name == event::VIDEO_PERFORMANCE_SUMMARY
                    && e.params["position"] == serde_json::json!(0)
            })
            .unwrap();
        assert!(summary_0 < view_1);
        assert_eq!(
            events[summary_0].params["total_play_time"],
            serde_json::json!(600)
        );
    }

    /// Test: retries configured off never panic and give up on first miss
    #[test]
    fn test_zero_retry_attempts_gives_up_immediately() {
        let config = FeedPlayConfig {
            surface_retry_attempts: 0,
            ..FeedPlayConfig::default()
        };
        let mut rig = rig_with(config, MockFeedSource::new(30));
        rig.coordinator.start().unwrap(); // no surface for 0

        rig.clock.advance(50);
        rig.coordinator.tick().unwrap();

        // Even a surface appearing right after is not picked up.
        rig.surfaces.borrow_mut().materialize(0);
        rig.clock.advance(50);
        rig.coordinator.tick().unwrap();
        assert!(rig.controls.iter().all(|c| c.surface().is_none()));
    }

    /// Test: single-engine configuration never preloads
    #[test]
    fn test_capacity_one_skips_preload() {
        let config = FeedPlayConfig {
            pool_capacity: 1,
            ..FeedPlayConfig::default()
        };
        let mut rig = rig_with(config, MockFeedSource::new(30));
        rig.coordinator.start().unwrap();

        assert_eq!(rig.coordinator.current_position(), Some(0));
        assert!(rig.coordinator.pool().slot_for_position(1).is_none());
    }
}
