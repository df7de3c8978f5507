//! Chain links and the step contract.
//!
//! A chain is a FIFO of [`Link`]s. User links come from `then`, `rescue`,
//! `ensure` and friends; engine links observe a settled result (nested
//! flattening, session suspension) or apply a deferred option change.

use core::fmt;

use super::{Options, State};
use crate::error::Error;
use crate::types::Value;

/// What a chain step did with the prior result.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Carry the prior result (and state) forward unchanged.
    Keep,
    /// Replace the result.
    ///
    /// `Value::Error` moves the chain into Failure, `Value::Deferred` pauses
    /// the chain until that Deferred settles, anything else is a Success.
    Replace(Value),
    /// End the chain here: remaining queued steps are discarded and the
    /// current result stands.
    Stop,
}

impl Step {
    /// Shorthand for `Step::Replace(value.into())`.
    #[must_use]
    pub fn replace(value: impl Into<Value>) -> Self {
        Self::Replace(value.into())
    }

    /// Replace the result with whatever `awaitable` settles to.
    #[must_use]
    pub fn await_on(awaitable: &impl super::Awaitable) -> Self {
        Self::Replace(Value::Deferred(awaitable.as_deferred()))
    }
}

impl From<Value> for Step {
    fn from(value: Value) -> Self {
        Self::Replace(value)
    }
}

/// Return type of chain callbacks. `Err` becomes the Failure result.
pub type StepResult = Result<Step, Error>;

/// A user callback stored in a link.
pub(crate) enum Callback {
    /// Receives the prior result as one value.
    Single(Box<dyn FnOnce(Value) -> StepResult>),
    /// Receives a `List` of exactly `arity` elements positionally, anything
    /// else as a one-element vector.
    Spread {
        arity: usize,
        f: Box<dyn FnOnce(Vec<Value>) -> StepResult>,
    },
}

impl Callback {
    pub(crate) fn single(f: impl FnOnce(Value) -> StepResult + 'static) -> Self {
        Self::Single(Box::new(f))
    }

    pub(crate) fn spread(arity: usize, f: impl FnOnce(Vec<Value>) -> StepResult + 'static) -> Self {
        Self::Spread {
            arity,
            f: Box::new(f),
        }
    }

    /// Runs the callback with panic isolation.
    pub(crate) fn invoke(self, input: Value) -> StepResult {
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || match self {
            Self::Single(f) => f(input),
            Self::Spread { arity, f } => f(spread_args(arity, input)),
        }));
        outcome.unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())))
    }
}

fn spread_args(arity: usize, input: Value) -> Vec<Value> {
    match input {
        Value::List(items) if items.len() == arity => items,
        other => vec![other],
    }
}

/// Engine callback run with the settled state and result.
pub(crate) type Observer = Box<dyn FnOnce(State, Value)>;

/// Deferred option mutation applied when the chain reaches it.
pub(crate) type Configure = Box<dyn FnOnce(&mut Options)>;

/// One entry of a Deferred chain.
pub(crate) enum Link {
    /// Success and failure branches; a missing branch passes the result on.
    Branches {
        on_success: Option<Callback>,
        on_failure: Option<Callback>,
    },
    /// One callback for both states.
    Either(Callback),
    /// Engine observer; survives `Step::Stop` and cancellation.
    Observe(Observer),
    /// Option change queued behind earlier links.
    Configure(Configure),
}

impl Link {
    pub(crate) const fn is_observer(&self) -> bool {
        matches!(self, Self::Observe(_))
    }
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Branches {
                on_success,
                on_failure,
            } => f
                .debug_struct("Branches")
                .field("on_success", &on_success.is_some())
                .field("on_failure", &on_failure.is_some())
                .finish(),
            Self::Either(_) => f.write_str("Either"),
            Self::Observe(_) => f.write_str("Observe"),
            Self::Configure(_) => f.write_str("Configure"),
        }
    }
}
