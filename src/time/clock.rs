//! Wall-clock and virtual time sources.

use crate::types::Time;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Time source abstraction for the host loop.
///
/// `park_until` is how the loop waits for the next timer: a wall clock
/// sleeps, a virtual clock advances.
pub trait TimeSource {
    /// Returns the current time.
    fn now(&self) -> Time;

    /// Blocks (or jumps) until `deadline` has been reached.
    fn park_until(&self, deadline: Time);
}

/// Wall clock time source for production use.
///
/// The epoch is the instant the clock was created.
#[derive(Debug)]
pub struct WallClock {
    epoch: Instant,
}

impl WallClock {
    /// Creates a new wall clock time source.
    #[must_use]
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for WallClock {
    fn now(&self) -> Time {
        let elapsed = self.epoch.elapsed();
        Time::from_nanos(u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX))
    }

    fn park_until(&self, deadline: Time) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(Duration::from_nanos(deadline.duration_since(now)));
        }
    }
}

/// Virtual time source for lab testing.
///
/// Time only moves when the host loop parks or a test advances it, so every
/// timing decision the engine makes is reproducible.
#[derive(Debug, Default)]
pub struct VirtualClock {
    now: AtomicU64,
}

impl VirtualClock {
    /// Creates a new virtual clock starting at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            now: AtomicU64::new(0),
        }
    }

    /// Creates a virtual clock starting at the given time.
    #[must_use]
    pub fn starting_at(time: Time) -> Self {
        Self {
            now: AtomicU64::new(time.as_nanos()),
        }
    }

    /// Advances time by the given number of nanoseconds.
    pub fn advance(&self, nanos: u64) {
        self.now.fetch_add(nanos, Ordering::AcqRel);
    }

    /// Advances time by a duration.
    pub fn advance_by(&self, duration: Duration) {
        self.advance(u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX));
    }

    /// Advances time to the given absolute time.
    ///
    /// If the target time is in the past, this is a no-op.
    pub fn advance_to(&self, time: Time) {
        self.now.fetch_max(time.as_nanos(), Ordering::AcqRel);
    }
}

impl TimeSource for VirtualClock {
    fn now(&self) -> Time {
        Time::from_nanos(self.now.load(Ordering::Acquire))
    }

    fn park_until(&self, deadline: Time) {
        self.advance_to(deadline);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn virtual_clock_only_moves_forward() {
        let clock = VirtualClock::starting_at(Time::from_millis(10));
        clock.advance_to(Time::from_millis(4));
        assert_eq!(clock.now(), Time::from_millis(10));
        clock.advance_by(Duration::from_millis(3));
        assert_eq!(clock.now(), Time::from_millis(13));
    }

    #[test]
    fn wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let a = clock.now();
        clock.park_until(a.saturating_add_nanos(1_000));
        assert!(clock.now() >= a);
    }
}
