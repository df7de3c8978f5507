//! Burst cost measurement and the yield decision.
//!
//! A session predicts where the next step would end (`elapsed_risk`: time
//! spent in the current burst plus the mean step cost) and yields when that
//! prediction crosses the speed's slice budget. Overshooting by a little
//! yields only sometimes; overshooting by a lot always yields.

use crate::types::Time;

/// Number of steps sampled before the mean step cost is frozen.
pub const MAX_SAMPLING_WINDOW: u32 = 255;

/// Jitter axis at which yielding is unconditional.
pub const SATURATED_AXIS: u8 = 10;

/// Timing state of one session.
#[derive(Debug, Clone, Copy)]
pub struct TimeMetrics {
    session_start: Time,
    slice_start: Time,
    samples: u32,
    total_ms: f64,
    mean_ms: f64,
    steps: u64,
    bursts: u64,
}

impl TimeMetrics {
    /// Starts measuring at `now`.
    #[must_use]
    pub const fn new(now: Time) -> Self {
        Self {
            session_start: now,
            slice_start: now,
            samples: 0,
            total_ms: 0.0,
            mean_ms: 0.0,
            steps: 0,
            bursts: 0,
        }
    }

    /// Marks the start of a burst.
    pub fn begin_slice(&mut self, now: Time) {
        self.slice_start = now;
        self.bursts += 1;
    }

    /// Records one step that ran from `started` to `now`.
    pub fn record_step(&mut self, started: Time, now: Time) {
        self.steps += 1;
        if self.samples < MAX_SAMPLING_WINDOW {
            self.samples += 1;
            self.total_ms += now.millis_since(started);
            self.mean_ms = self.total_ms / f64::from(self.samples);
        }
    }

    /// Mean step cost in milliseconds.
    #[must_use]
    pub const fn mean_ms(&self) -> f64 {
        self.mean_ms
    }

    /// Steps recorded so far.
    #[must_use]
    pub const fn steps(&self) -> u64 {
        self.steps
    }

    /// Bursts started so far.
    #[must_use]
    pub const fn bursts(&self) -> u64 {
        self.bursts
    }

    /// Milliseconds since the session started.
    #[must_use]
    pub fn session_elapsed_ms(&self, now: Time) -> f64 {
        now.millis_since(self.session_start)
    }

    /// Predicted burst time at the end of the next step.
    #[must_use]
    pub fn elapsed_risk(&self, now: Time) -> f64 {
        now.millis_since(self.slice_start) + self.mean_ms
    }

    /// Decides whether the burst should yield now.
    ///
    /// `interval_ms` is the slice budget, `normal_interval_ms` the budget of
    /// the normal speed. `roll` is drawn only for a probabilistic decision
    /// and must return a value in `[0, 1)`.
    pub fn should_yield(
        &self,
        now: Time,
        interval_ms: i64,
        normal_interval_ms: i64,
        run_async: bool,
        roll: impl FnOnce() -> f64,
    ) -> bool {
        let interval = interval_ms as f64;
        let risk = self.elapsed_risk(now);
        if risk <= interval {
            return false;
        }
        if run_async && interval_ms < normal_interval_ms {
            return true;
        }
        let axis = jitter_axis(risk - interval);
        axis >= SATURATED_AXIS || roll() * 10.0 < f64::from(axis)
    }
}

/// Maps a budget overshoot in milliseconds to a jitter axis.
#[must_use]
pub fn jitter_axis(over_ms: f64) -> u8 {
    if over_ms < 8.0 {
        2
    } else if over_ms < 36.0 {
        5
    } else if over_ms < 48.0 {
        8
    } else {
        SATURATED_AXIS
    }
}
