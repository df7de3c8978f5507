//! Host scheduling.
//!
//! Lightloop never blocks and never spawns threads. Everything that has to
//! happen "later" (an async chain tick, a chain debris report, the next
//! iteration burst) is handed to the host through the [`Scheduler`] trait,
//! the engine's only yield primitive.
//!
//! - [`timer`]: Timer queue ordered by deadline with lazy cancellation
//! - [`host`]: [`HostLoop`], the provided single-threaded host
//!
//! # Hosts
//!
//! | Host | Clock | Parking |
//! |---|---|---|
//! | [`LabHost`] | [`VirtualClock`](crate::time::VirtualClock) | jumps to the next deadline |
//! | [`LocalHost`] | [`WallClock`](crate::time::WallClock) | sleeps the thread |
//!
//! Embedders with their own event loop implement [`Scheduler`] directly.
//!
//! # Example
//!
//! ```
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use std::time::Duration;
//! use lightloop::runtime::{LabHost, Scheduler};
//!
//! let host = LabHost::new();
//! let hits = Rc::new(Cell::new(0));
//! let h = hits.clone();
//! host.schedule(Duration::from_millis(5), Box::new(move || h.set(h.get() + 1)));
//!
//! assert_eq!(host.run_until_idle(), 1);
//! assert_eq!(hits.get(), 1);
//! assert_eq!(host.now().as_millis(), 5);
//! ```

pub mod host;
pub mod timer;

use core::fmt;
use std::time::Duration;

use crate::types::Time;

pub use host::{HostLoop, LabHost, LocalHost};
pub use timer::TimerQueue;

/// A unit of deferred work handed to the host.
pub type Task = Box<dyn FnOnce()>;

/// Handle to a scheduled task, used to cancel it before it runs.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// Creates a handle from a raw sequence number.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw sequence number.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TimerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TimerHandle({})", self.0)
    }
}

/// The host's "schedule this later" primitive.
///
/// Implementations run tasks on the host's single thread, in deadline order,
/// and never run a task from inside `schedule` itself.
pub trait Scheduler {
    /// Current host time.
    fn now(&self) -> Time;

    /// Runs `task` once `delay` has elapsed.
    fn schedule(&self, delay: Duration, task: Task) -> TimerHandle;

    /// Cancels a pending task. Returns `false` if it already ran or was
    /// already cancelled.
    fn cancel(&self, handle: TimerHandle) -> bool;

    /// Whether a synchronous caller may pump the host in place.
    ///
    /// When `false`, synchronous iteration takes the quick path with no
    /// timing at all.
    fn is_waitable(&self) -> bool {
        false
    }

    /// Runs tasks that are already due without parking. Returns how many ran.
    fn pump(&self) -> usize {
        0
    }
}
