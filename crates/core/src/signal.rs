//! Clock-domain and wire-level signal primitives.
//!
//! Everything in the bridge advances on one synchronous clock, while the
//! processor direct slot is self-timed. These types are the only way an
//! external level reaches synchronous logic, and the only way synchronous
//! logic reaches a shared wire.
//!
//! # Synchronizer
//!
//! A [`Synchronizer`] is a two-flop pipeline. A raw level sampled on clock
//! edge `n` becomes visible through [`Synchronizer::get`] after edge `n + 1`,
//! i.e. two edges after it appeared on the pad. There is no way to read the
//! first stage, so nothing downstream can observe a metastable value.
//!
//! ```text
//!  pad ──▶ [stage 0] ──▶ [stage 1] ──▶ get()
//!          clock()       clock()
//! ```
//!
//! # Tri-state lines
//!
//! A bidirectional wire is modelled as a driver-enable plus a driven value
//! ([`TriState`]); the observed value comes back in through a synchronizer.

use serde::{Deserialize, Serialize};

/// Two-stage synchronizer for an asynchronous input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synchronizer<T: Copy> {
    stages: [T; 2],
}

impl<T: Copy> Synchronizer<T> {
    /// Create a synchronizer whose both stages hold `idle`.
    ///
    /// `idle` should be the level the line rests at while nobody drives it,
    /// otherwise the first two ticks after reset see a phantom transition.
    pub fn new(idle: T) -> Self {
        Self {
            stages: [idle, idle],
        }
    }

    /// Clock edge: shift `raw` into the first stage.
    #[inline]
    pub fn clock(&mut self, raw: T) {
        self.stages[1] = self.stages[0];
        self.stages[0] = raw;
    }

    /// Synchronized value (the second stage).
    #[inline]
    pub fn get(&self) -> T {
        self.stages[1]
    }

    /// Force both stages back to `idle`.
    pub fn reset(&mut self, idle: T) {
        self.stages = [idle, idle];
    }
}

/// Output half of a bidirectional line.
///
/// When `enable` is false the line is released and `value` is meaningless.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TriState<T: Copy + Default> {
    pub enable: bool,
    pub value: T,
}

impl<T: Copy + Default> TriState<T> {
    /// A released (high impedance) driver.
    pub fn released() -> Self {
        Self {
            enable: false,
            value: T::default(),
        }
    }

    /// An enabled driver presenting `value`.
    pub fn driven(value: T) -> Self {
        Self {
            enable: true,
            value,
        }
    }

    /// The driven value, or `None` when released.
    pub fn get(&self) -> Option<T> {
        self.enable.then_some(self.value)
    }
}

impl TriState<bool> {
    /// Open-collector assertion of an active-low line: drive it low.
    pub fn pull_low() -> Self {
        Self::driven(false)
    }

    /// Resolve the electrical level of an open-collector line that has a
    /// pull-up, given this driver and the level driven by everyone else.
    pub fn wired_and(&self, others: bool) -> bool {
        match self.get() {
            Some(level) => level && others,
            None => others,
        }
    }
}

/// Registered edge detector on a synchronized boolean.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct EdgeDetector {
    previous: bool,
}

impl EdgeDetector {
    pub fn new(initial: bool) -> Self {
        Self { previous: initial }
    }

    /// True when `now` is asserted and the value registered last tick was not.
    #[inline]
    pub fn rose(&self, now: bool) -> bool {
        now && !self.previous
    }

    /// Clock edge: register `now`.
    #[inline]
    pub fn clock(&mut self, now: bool) {
        self.previous = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synchronizer_delays_by_two_edges() {
        let mut sync = Synchronizer::new(0u32);
        sync.clock(0xDEAD_BEEF);
        assert_eq!(sync.get(), 0, "first edge only reaches stage 0");
        sync.clock(0xDEAD_BEEF);
        assert_eq!(sync.get(), 0xDEAD_BEEF);
    }

    #[test]
    fn synchronizer_passes_every_sample_in_order() {
        let mut sync = Synchronizer::new(false);
        let pattern = [true, false, false, true, true];
        let mut seen = Vec::new();
        for &level in &pattern {
            sync.clock(level);
            seen.push(sync.get());
        }
        sync.clock(false);
        seen.push(sync.get());
        // Two-edge latency: output at edge n is input at edge n - 1 (stage shift),
        // with the reset value filling the first slot.
        assert_eq!(seen, vec![false, true, false, false, true, true]);
    }

    #[test]
    fn synchronizer_reset_restores_idle() {
        let mut sync = Synchronizer::new(true);
        sync.clock(false);
        sync.clock(false);
        assert!(!sync.get());
        sync.reset(true);
        assert!(sync.get());
    }

    #[test]
    fn tristate_released_has_no_value() {
        let line: TriState<u32> = TriState::released();
        assert_eq!(line.get(), None);
        assert_eq!(TriState::driven(5u32).get(), Some(5));
    }

    #[test]
    fn open_collector_resolution() {
        let released = TriState::<bool>::released();
        let pulled = TriState::pull_low();
        assert!(released.wired_and(true));
        assert!(!released.wired_and(false));
        assert!(!pulled.wired_and(true));
    }

    #[test]
    fn edge_detector() {
        let mut edge = EdgeDetector::new(false);
        assert!(edge.rose(true));
        edge.clock(true);
        assert!(!edge.rose(true));
        edge.clock(false);
        assert!(edge.rose(true));
    }
}
