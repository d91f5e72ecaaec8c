//! Monotonic timestamp sources.
//!
//! Every timestamp the recorder emits is nanoseconds since the clock's own
//! epoch. `MonotonicClock` anchors that epoch on an `Instant` captured at
//! construction; `ManualClock` lets tests dictate time exactly, including
//! repeated values.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic, non-decreasing nanosecond counter.
pub trait Clock: Send + Sync {
    fn now_ns(&self) -> u64;
}

/// Wall-clock monotonic time relative to the moment the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        // u64 nanoseconds covers ~584 years of uptime.
        self.epoch.elapsed().as_nanos() as u64
    }
}

/// Clock that only moves when told to.
///
/// Shared between threads through `Arc`; reads are `Relaxed` because tests
/// sequence `set`/`advance` against recorder calls themselves.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ns: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ns),
        }
    }

    pub fn set(&self, ns: u64) {
        self.now.store(ns, Ordering::Relaxed);
    }

    /// Move the clock forward by `delta_ns` and return the new value.
    pub fn advance(&self, delta_ns: u64) -> u64 {
        self.now.fetch_add(delta_ns, Ordering::Relaxed) + delta_ns
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}
