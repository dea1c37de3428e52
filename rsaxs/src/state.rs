//! Change tracking between bodies and incremental histogram managers.
//!
//! Bodies raise signals through a [`Signaller`]; incremental managers read
//! the accumulated state before a calculation and reset it afterwards. A
//! bound signaller refers to its manager's slot table through a weak
//! reference, so it goes inert when the manager is dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

/// Raised by bodies on mutation; observed by incremental managers.
pub trait Signaller: Send + Sync + std::fmt::Debug {
    /// The body's internal structure changed (atoms added, removed or
    /// repositioned relative to each other).
    fn modified_internal(&self);
    /// The body moved as a whole (translation or rotation).
    fn modified_external(&self);
    /// The body's hydration shell changed.
    fn modified_hydration(&self);
}

/// The default signaller of a body not tracked by any manager. All signals
/// are dropped.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnboundSignaller;

impl Signaller for UnboundSignaller {
    fn modified_internal(&self) {}
    fn modified_external(&self) {}
    fn modified_hydration(&self) {}
}

#[derive(Debug)]
struct Slots {
    internal: Vec<AtomicBool>,
    external: Vec<AtomicBool>,
    hydration: AtomicBool,
}

impl Slots {
    fn new(bodies: usize, initial: bool) -> Self {
        Self {
            internal: (0..bodies).map(|_| AtomicBool::new(initial)).collect(),
            external: (0..bodies).map(|_| AtomicBool::new(initial)).collect(),
            hydration: AtomicBool::new(initial),
        }
    }
}

/// A signaller bound to one slot of a manager's state table.
#[derive(Clone, Debug)]
pub struct BoundSignaller {
    slot: usize,
    slots: Weak<Slots>,
}

impl Signaller for BoundSignaller {
    fn modified_internal(&self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.internal[self.slot].store(true, Ordering::Relaxed);
        }
    }

    fn modified_external(&self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.external[self.slot].store(true, Ordering::Relaxed);
        }
    }

    fn modified_hydration(&self) {
        if let Some(slots) = self.slots.upgrade() {
            slots.hydration.store(true, Ordering::Relaxed);
        }
    }
}

/// Per-body change state owned by an incremental histogram manager.
///
/// Freshly constructed state reports every body as modified, so the first
/// calculation builds everything.
#[derive(Debug)]
pub struct StateManager {
    slots: Arc<Slots>,
}

impl StateManager {
    /// State for `bodies` bodies, everything initially marked modified.
    #[must_use]
    pub fn new(bodies: usize) -> Self {
        Self {
            slots: Arc::new(Slots::new(bodies, true)),
        }
    }

    /// Number of tracked bodies.
    #[must_use]
    pub fn size(&self) -> usize {
        self.slots.external.len()
    }

    /// A signaller bound to slot `slot`, to be handed to the matching
    /// body.
    ///
    /// # Panics
    ///
    /// Panics if `slot` is out of range.
    #[must_use]
    pub fn probe(&self, slot: usize) -> Arc<BoundSignaller> {
        assert!(slot < self.size());
        Arc::new(BoundSignaller {
            slot,
            slots: Arc::downgrade(&self.slots),
        })
    }

    /// Which bodies have been moved as a whole since the last reset.
    #[must_use]
    pub fn externally_modified(&self) -> Vec<bool> {
        self.slots
            .external
            .iter()
            .map(|flag| flag.load(Ordering::Relaxed))
            .collect()
    }

    /// Which bodies have been internally restructured since the last
    /// reset.
    #[must_use]
    pub fn internally_modified(&self) -> Vec<bool> {
        self.slots
            .internal
            .iter()
            .map(|flag| flag.load(Ordering::Relaxed))
            .collect()
    }

    /// Whether the hydration shell changed since the last reset.
    #[must_use]
    pub fn hydration_modified(&self) -> bool {
        self.slots.hydration.load(Ordering::Relaxed)
    }

    /// Raise the hydration signal directly.
    pub fn signal_modified_hydration(&self) {
        self.slots.hydration.store(true, Ordering::Relaxed);
    }

    /// Clear all signals. Called after a completed calculation.
    pub fn reset(&self) {
        for flag in self.slots.internal.iter().chain(&self.slots.external) {
            flag.store(false, Ordering::Relaxed);
        }
        self.slots.hydration.store(false, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn fresh_state_is_fully_modified() {
        let state = StateManager::new(3);
        assert_eq!(state.externally_modified(), vec![true; 3]);
        assert_eq!(state.internally_modified(), vec![true; 3]);
        assert!(state.hydration_modified());
    }

    #[test]
    fn signals_accumulate_until_reset() {
        let state = StateManager::new(2);
        state.reset();
        assert_eq!(state.externally_modified(), vec![false; 2]);

        let probe = state.probe(1);
        probe.modified_external();
        assert_eq!(state.externally_modified(), vec![false, true]);
        assert_eq!(state.internally_modified(), vec![false, false]);

        probe.modified_internal();
        probe.modified_hydration();
        assert_eq!(state.internally_modified(), vec![false, true]);
        assert!(state.hydration_modified());

        state.reset();
        assert_eq!(state.externally_modified(), vec![false; 2]);
        assert!(!state.hydration_modified());
    }

    #[test]
    fn signaller_goes_inert_when_manager_drops() {
        let state = StateManager::new(1);
        let probe = state.probe(0);
        drop(state);
        // must not panic
        probe.modified_external();
        probe.modified_internal();
        probe.modified_hydration();
    }
}
