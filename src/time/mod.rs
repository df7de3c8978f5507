//! Time sources for the engine.
//!
//! The Deferred engine and the iteration driver never read the system clock
//! directly. They ask the host [`Scheduler`](crate::Scheduler) for `now()`,
//! and the host loop is parameterised by a [`TimeSource`]:
//!
//! - [`WallClock`]: production time; parking sleeps the thread
//! - [`VirtualClock`]: lab time; parking jumps straight to the deadline
//!
//! # Example
//!
//! ```
//! use lightloop::time::{TimeSource, VirtualClock};
//! use lightloop::Time;
//!
//! let clock = VirtualClock::new();
//! assert_eq!(clock.now(), Time::ZERO);
//!
//! clock.park_until(Time::from_millis(5));
//! assert_eq!(clock.now(), Time::from_millis(5));
//! ```

mod clock;

pub use clock::{TimeSource, VirtualClock, WallClock};
