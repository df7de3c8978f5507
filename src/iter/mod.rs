//! Iteration: the iterator protocol, loop shapes and the time-sliced driver.
//!
//! A loop is an [`Iter`] (one of the built-in shapes, or your own) whose
//! outputs feed an accumulator. [`Driver`] is the entry point: it picks the
//! shape and accumulator for each operation and either drains the loop in
//! one go or hands it to a [`LightIterator`] session that runs it in
//! time-boxed bursts, yielding to the host between bursts.
//!
//! # Module Contents
//!
//! - [`shapes`]: The seven loop shapes
//! - [`gather`]: Accumulators (collect, filter, fold, every/some, ...)
//! - [`quick`]: The synchronous fast path and the timed synchronous path
//! - [`metrics`]: Burst cost measurement and the yield decision
//! - [`light`]: [`LightIterator`] sessions and their [`Session`] handle
//! - [`driver`]: [`Driver`] entry points
//! - [`range`]: Inclusive integer and character ranges
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use lightloop::runtime::LabHost;
//! use lightloop::{Cx, Driver, EngineConfig, Turn, Value};
//!
//! let host = Rc::new(LabHost::new());
//! let cx = Cx::new(EngineConfig::default(), host.clone());
//!
//! let doubled = Driver::new(&cx)
//!     .map(vec![1, 2, 3], |item, _key| {
//!         Ok(Turn::Continue(Value::from(item.as_i64().unwrap_or(0) * 2)))
//!     })
//!     .unwrap();
//! assert_eq!(doubled, Value::from(vec![2, 4, 6]));
//! ```

pub mod driver;
pub mod gather;
pub mod light;
pub mod metrics;
pub mod quick;
pub mod range;
pub mod shapes;

pub use driver::Driver;
pub use light::{LightIterator, Session, SessionState};
pub use range::range;
pub use shapes::{LoopFn, SourceFn};

use crate::error::{Error, Result};
use crate::types::Value;

/// What a loop callback wants to happen next.
#[derive(Debug, Clone, PartialEq)]
pub enum Turn {
    /// Keep going; the value is this step's output. A `Value::Deferred`
    /// output is awaited by async sessions before it is recorded.
    Continue(Value),
    /// End the loop now. Not an error: the result so far stands.
    Stop,
}

impl Turn {
    /// Shorthand for `Turn::Continue(value.into())`.
    #[must_use]
    pub fn next(value: impl Into<Value>) -> Self {
        Self::Continue(value.into())
    }
}

/// Return type of loop callbacks.
pub type TurnResult = Result<Turn>;

/// One produced element of a loop.
#[derive(Debug, Clone, PartialEq)]
pub struct Entry {
    /// Position: index for lists, key for maps, counter for counted loops.
    pub key: Value,
    /// The element the callback was called with.
    pub item: Value,
    /// What the callback returned.
    pub output: Value,
}

/// Result of advancing an [`Iter`].
#[derive(Debug, Clone, PartialEq)]
pub enum Next {
    /// One more element.
    Item(Entry),
    /// The loop is over.
    Stop,
}

/// The iterator protocol driven by [`LightIterator`] and the quick path.
///
/// Each call runs (at most) one callback step.
pub trait Iter {
    /// Advances by one step.
    fn next(&mut self) -> Result<Next>;
}

impl<I: Iter + ?Sized> Iter for Box<I> {
    fn next(&mut self) -> Result<Next> {
        (**self).next()
    }
}

/// Loop shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Lists and strings, by index.
    ArrayLoop,
    /// Maps, by key.
    KeyLoop,
    /// A counted loop over a bound.
    Repeat,
    /// Until the callback stops it.
    Forever,
    /// Key/value pairs of a list or map.
    PairedItems,
    /// Columns of a list of lists.
    Zip,
    /// Anything else: a caller-supplied source.
    Generic,
}

impl Shape {
    /// The shape used for `value` when none is given.
    ///
    /// Lists, strings and `Null` (an empty loop) walk by index, maps by key.
    pub fn auto(value: &Value) -> Result<Self> {
        match value {
            Value::List(_) | Value::Str(_) | Value::Null => Ok(Self::ArrayLoop),
            Value::Map(_) => Ok(Self::KeyLoop),
            other => Err(Error::not_iterable(other)),
        }
    }
}
