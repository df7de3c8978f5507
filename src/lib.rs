//! Lightloop: a cooperative execution engine for single-threaded hosts.
//!
//! # Overview
//!
//! Lightloop sequences logical steps on a host event loop without native
//! futures or threads. It has two halves:
//!
//! - [`Deferred`]: a chainable task primitive with cancellation, nested
//!   flattening and unhandled-failure ("chain debris") reporting.
//! - [`LightIterator`](iter::LightIterator): an adaptive driver that runs
//!   long loops in time-boxed bursts and yields back to the host between
//!   bursts based on measured cost.
//!
//! Both halves read the same immutable [`SpeedTable`] and schedule work
//! through the host's [`Scheduler`]. Every effect flows through an explicit
//! [`Cx`].
//!
//! # Module Structure
//!
//! - [`types`]: Core types (time, dynamic values, speed profiles, cancel reasons)
//! - [`time`]: Time sources (wall clock and virtual clock)
//! - [`runtime`]: Host scheduling primitive and the provided host loop
//! - [`cx`]: Capability context shared by Deferreds and iteration sessions
//! - [`config`]: Engine configuration (defaults, env vars, TOML)
//! - [`deferred`]: The Deferred chain engine
//! - [`iter`]: Iterator protocol, loop shapes and the time-sliced driver
//! - [`util`]: Deterministic RNG
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use lightloop::runtime::LabHost;
//! use lightloop::{Cx, Deferred, EngineConfig, Step, Value};
//!
//! let host = Rc::new(LabHost::new());
//! let cx = Cx::new(EngineConfig::default(), host.clone());
//!
//! let d = Deferred::new(&cx);
//! d.then(|v| Ok(Step::replace(v.as_i64().unwrap_or(0) * 2)));
//! d.begin(21);
//! host.run_until_idle();
//!
//! assert_eq!(d.outcome().and_then(Result::ok), Some(Value::Int(42)));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod cx;
pub mod deferred;
pub mod error;
pub mod iter;
pub mod runtime;
pub mod time;
pub mod tracing_compat;
pub mod types;
pub mod util;

#[cfg(any(test, feature = "test-internals"))]
pub mod test_utils;

pub use config::EngineConfig;
pub use cx::{Cx, UnhandledFailure};
pub use deferred::{Awaitable, Deferred, DeferredId, State, Step, StepResult};
pub use error::{ConfigError, Error, ErrorCategory, ErrorKind, Result};
pub use iter::{Driver, Session, SessionState, Shape, Turn};
pub use runtime::{Scheduler, TimerHandle};
pub use types::{Speed, SpeedName, SpeedProfile, SpeedTable, Time, Value};
