//! Time abstraction
//!
//! The probe only needs wall-clock seconds and microseconds. Tests use
//! [`ManualClock`] to get deterministic timestamps and a controllable
//! per-read overhead.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;

use crate::event::Timestamp;

/// Wall-clock time source
pub trait WallClock: Send + Sync {
    /// Current wall-clock time
    fn now(&self) -> Timestamp;
}

/// Real clock implementation using system time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_datetime(Utc::now())
    }
}

impl<C: WallClock + ?Sized> WallClock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

impl<C: WallClock + ?Sized> WallClock for &C {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}

/// Manually driven clock
///
/// Every `now()` returns the current reading and then advances it by
/// `step` microseconds, which models the cost of taking a timestamp.
#[derive(Debug)]
pub struct ManualClock {
    micros: AtomicI64,
    step: AtomicI64,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            micros: AtomicI64::new(start.as_micros()),
            step: AtomicI64::new(0),
        }
    }

    /// Advance by `step` microseconds after every read
    pub fn with_step(self, step: i64) -> Self {
        self.step.store(step, Ordering::Relaxed);
        self
    }

    /// Change the per-read step
    pub fn set_step(&self, step: i64) {
        self.step.store(step, Ordering::Relaxed);
    }

    /// Move the clock forward
    pub fn advance(&self, micros: i64) {
        self.micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Jump to an absolute time
    pub fn set(&self, ts: Timestamp) {
        self.micros.store(ts.as_micros(), Ordering::Relaxed);
    }

    /// Current reading without advancing
    pub fn peek(&self) -> Timestamp {
        Timestamp::from_micros(self.micros.load(Ordering::Relaxed))
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Timestamp::default())
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> Timestamp {
        let step = self.step.load(Ordering::Relaxed);
        Timestamp::from_micros(self.micros.fetch_add(step, Ordering::Relaxed))
    }
}
