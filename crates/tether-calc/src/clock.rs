//! Time sources for the run loop.
//!
//! Production loops read `web_time::Instant::now()`. Tests build loops on a
//! [`LabClock`], whose time only moves when advanced, so debounce windows can
//! be exercised without sleeping.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use web_time::{Duration, Instant};

/// A manually-advanceable clock for deterministic tests.
///
/// All loops sharing the same `LabClock` see the same time.
#[derive(Debug, Clone)]
pub struct LabClock {
    epoch: Instant,
    offset_us: Arc<AtomicU64>,
}

impl LabClock {
    /// Create a new lab clock starting at `Instant::now()`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            offset_us: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Advance the lab clock by `delta`.
    pub fn advance(&self, delta: Duration) {
        let us = delta.as_micros().min(u64::MAX as u128) as u64;
        self.offset_us.fetch_add(us, Ordering::Release);
    }

    /// Move the clock forward to `target`. Never moves backwards.
    pub fn advance_to(&self, target: Instant) {
        let now = self.now();
        if let Some(delta) = target.checked_duration_since(now) {
            self.advance(delta);
        }
    }

    /// Current lab time.
    #[must_use]
    pub fn now(&self) -> Instant {
        let offset = Duration::from_micros(self.offset_us.load(Ordering::Acquire));
        self.epoch + offset
    }
}

impl Default for LabClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Where a run loop reads the time from.
#[derive(Debug, Clone, Default)]
pub enum Clock {
    /// Real wall-clock time.
    #[default]
    Real,
    /// Deterministic lab clock.
    Lab(LabClock),
}

impl Clock {
    #[must_use]
    pub fn now(&self) -> Instant {
        match self {
            Self::Real => Instant::now(),
            Self::Lab(c) => c.now(),
        }
    }

    #[must_use]
    pub fn is_lab(&self) -> bool {
        matches!(self, Self::Lab(_))
    }

    /// Wait until `deadline`: sleeps on a real clock, jumps a lab clock.
    pub(crate) fn wait_until(&self, deadline: Instant) {
        match self {
            Self::Real => {
                if let Some(delta) = deadline.checked_duration_since(Instant::now()) {
                    std::thread::sleep(delta);
                }
            }
            Self::Lab(c) => c.advance_to(deadline),
        }
    }
}
