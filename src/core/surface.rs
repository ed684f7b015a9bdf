//! Rendering surface collaborator.
//!
//! The rendering layer materializes one surface per visible feed position.
//! The coordinator only ever borrows a handle to attach the current engine;
//! it never creates or destroys surfaces. A provider may return `None` for a
//! position whose view is not ready yet - that drives the bounded retry in
//! the coordinator.

use std::collections::HashMap;

/// Opaque handle to a rendering surface owned by the UI layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// Yields surface handles for feed positions once their views exist.
pub trait SurfaceProvider {
    /// Surface for `position`, or `None` if the view is not materialized yet.
    fn surface_for(&mut self, position: usize) -> Option<SurfaceHandle>;
}

/// In-memory surface provider for the demo runner and tests.
///
/// Positions must be marked ready explicitly; `invalidate_all` simulates a
/// layout/orientation change by handing out fresh handles afterwards.
#[derive(Debug, Default)]
pub struct SimSurfaces {
    ready: HashMap<usize, SurfaceHandle>,
    next_id: u64,
}

impl SimSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the view at `position` as materialized.
    pub fn materialize(&mut self, position: usize) -> SurfaceHandle {
        self.next_id += 1;
        let handle = SurfaceHandle(self.next_id);
        self.ready.insert(position, handle);
        handle
    }

    /// Remove the view at `position` (scrolled off-screen / recycled).
    pub fn remove(&mut self, position: usize) {
        self.ready.remove(&position);
    }

    /// Drop every handle and re-issue new ones, as a layout change does.
    pub fn invalidate_all(&mut self) {
        let positions: Vec<usize> = self.ready.keys().copied().collect();
        self.ready.clear();
        for position in positions {
            self.materialize(position);
        }
    }
}

impl SurfaceProvider for SimSurfaces {
    fn surface_for(&mut self, position: usize) -> Option<SurfaceHandle> {
        self.ready.get(&position).copied()
    }
}

/// Lets the UI layer keep a shared handle to the provider it hands the
/// coordinator.
impl<P: SurfaceProvider> SurfaceProvider for std::rc::Rc<std::cell::RefCell<P>> {
    fn surface_for(&mut self, position: usize) -> Option<SurfaceHandle> {
        self.borrow_mut().surface_for(position)
    }
}
