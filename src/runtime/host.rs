//! The provided single-threaded host loop.
//!
//! [`HostLoop`] owns a [`TimerQueue`] and a [`TimeSource`]. Running the loop
//! repeatedly parks the clock until the earliest deadline and runs that
//! task. With a [`VirtualClock`] parking is instantaneous, which makes every
//! timing decision in the engine reproducible in tests.

use std::cell::{Cell, RefCell};
use std::time::Duration;

use super::{Scheduler, Task, TimerHandle, TimerQueue};
use crate::time::{TimeSource, VirtualClock, WallClock};
use crate::tracing_compat::{trace, warn};
use crate::types::Time;

/// Deterministic host driven by virtual time.
pub type LabHost = HostLoop<VirtualClock>;

/// Host driven by the wall clock.
pub type LocalHost = HostLoop<WallClock>;

/// A single-threaded timer loop implementing [`Scheduler`].
#[derive(Debug)]
pub struct HostLoop<C: TimeSource> {
    clock: C,
    queue: RefCell<TimerQueue>,
    waitable: bool,
    max_steps: Option<u64>,
    steps: Cell<u64>,
}

impl HostLoop<VirtualClock> {
    /// Creates a lab host starting at virtual time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(VirtualClock::new())
    }
}

impl Default for HostLoop<VirtualClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl HostLoop<WallClock> {
    /// Creates a host on the wall clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_clock(WallClock::new())
    }
}

impl Default for HostLoop<WallClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: TimeSource> HostLoop<C> {
    /// Creates a host over an arbitrary time source.
    #[must_use]
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            queue: RefCell::new(TimerQueue::new()),
            waitable: false,
            max_steps: None,
            steps: Cell::new(0),
        }
    }

    /// Marks the host as waitable, enabling the timed synchronous path.
    #[must_use]
    pub fn waitable(mut self, value: bool) -> Self {
        self.waitable = value;
        self
    }

    /// Caps how many tasks one `run_until_idle` call may run.
    #[must_use]
    pub fn max_steps(mut self, max: u64) -> Self {
        self.max_steps = Some(max);
        self
    }

    /// Returns the host clock.
    #[must_use]
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Number of pending tasks.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Total number of tasks this host has run.
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps.get()
    }

    /// Parks until the earliest deadline and runs that task.
    ///
    /// Returns `false` when nothing is pending.
    pub fn run_next(&self) -> bool {
        let Some(deadline) = self.queue.borrow_mut().peek_deadline() else {
            return false;
        };
        if deadline > self.clock.now() {
            self.clock.park_until(deadline);
        }
        self.run_due_one(self.clock.now())
    }

    /// Runs tasks until the queue is empty (or `max_steps` is hit).
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0usize;
        loop {
            if let Some(max) = self.max_steps {
                if ran as u64 >= max {
                    warn!(max_steps = max, pending = self.pending(), "host loop step limit reached");
                    break;
                }
            }
            if !self.run_next() {
                break;
            }
            ran += 1;
        }
        ran
    }

    /// Runs every task due within `duration` from now, then parks until the
    /// end of the window.
    pub fn run_for(&self, duration: Duration) -> usize {
        let limit = self.clock.now() + duration;
        let mut ran = 0usize;
        loop {
            let next = self.queue.borrow_mut().peek_deadline();
            match next {
                Some(deadline) if deadline <= limit => {
                    if deadline > self.clock.now() {
                        self.clock.park_until(deadline);
                    }
                    if self.run_due_one(self.clock.now()) {
                        ran += 1;
                    }
                }
                _ => break,
            }
        }
        if limit > self.clock.now() {
            self.clock.park_until(limit);
        }
        ran
    }

    /// Runs the tasks that were already due when called.
    ///
    /// Tasks they schedule, even with zero delay, wait for the next call.
    pub fn pump_due(&self) -> usize {
        let now = self.clock.now();
        let watermark = self.queue.borrow().watermark();
        let mut ran = 0usize;
        loop {
            // Queue borrow must end before the task runs; tasks reschedule.
            let popped = self.queue.borrow_mut().pop_due_before(now, watermark);
            let Some((_, task)) = popped else {
                break;
            };
            self.run_task(task);
            ran += 1;
        }
        ran
    }

    /// Drops every pending task without running it.
    pub fn clear(&self) {
        self.queue.borrow_mut().clear();
    }

    fn run_due_one(&self, now: Time) -> bool {
        let popped = self.queue.borrow_mut().pop_due(now);
        match popped {
            Some((_, task)) => {
                self.run_task(task);
                true
            }
            None => false,
        }
    }

    fn run_task(&self, task: Task) {
        self.steps.set(self.steps.get() + 1);
        trace!(step = self.steps.get(), now = %self.clock.now(), "host task");
        task();
    }
}

impl<C: TimeSource> Scheduler for HostLoop<C> {
    fn now(&self) -> Time {
        self.clock.now()
    }

    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        let deadline = self.clock.now() + delay;
        self.queue.borrow_mut().insert(deadline, task)
    }

    fn cancel(&self, handle: TimerHandle) -> bool {
        self.queue.borrow_mut().cancel(handle)
    }

    fn is_waitable(&self) -> bool {
        self.waitable
    }

    fn pump(&self) -> usize {
        self.pump_due()
    }
}
