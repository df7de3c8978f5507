//! The Deferred chain engine.
//!
//! A [`Deferred`] is a chainable unit of future work. Steps are queued with
//! [`then`](Deferred::then) and friends, the Deferred is fired once with
//! [`begin`](Deferred::begin) or [`raise`](Deferred::raise), and the queued
//! steps then drain in insertion order, each seeing the result of the one
//! before it.
//!
//! # States
//!
//! ```text
//! Unfired ──begin──▶ Success ◀──┐
//!    │                 │  ▲     │ steps may move the result
//!    └───raise───▶ Failure ─────┘ between the two fired states
//! ```
//!
//! `Unfired` is left exactly once. A step returning a Deferred pauses the
//! chain (nested flattening) until that Deferred settles; the next step sees
//! the settled value, never the pending Deferred.
//!
//! # Sync and async draining
//!
//! An async Deferred (the default) processes one link per host tick, each
//! tick scheduled after the Deferred's speed delay. A sync Deferred drains
//! every ready link inside the call that made them ready.
//!
//! # Chain debris
//!
//! A Failure that reaches the end of the chain while no errback was ever
//! attached is reported through [`Cx::report_unhandled`] after the speed
//! delay, unless an errback is attached first.
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use lightloop::runtime::LabHost;
//! use lightloop::{Cx, Deferred, EngineConfig, Error, Step, Value};
//!
//! let host = Rc::new(LabHost::new());
//! let cx = Cx::new(EngineConfig::default(), host.clone());
//!
//! let d = Deferred::new(&cx);
//! d.then(|_| Err(Error::user("no luck")))
//!     .rescue(|err| Ok(Step::replace(format!("recovered from {err}"))));
//! d.begin(());
//! host.run_until_idle();
//!
//! assert_eq!(
//!     d.outcome().and_then(Result::ok),
//!     Some(Value::from("recovered from user error: no luck"))
//! );
//! ```

mod chain;
mod debris;
mod timing;

use core::fmt;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

pub(crate) use chain::{Callback, Link};
pub use chain::{Step, StepResult};
pub use timing::{failure, succeed, till, wait};

use crate::cx::Cx;
use crate::error::{Error, ErrorKind};
use crate::runtime::TimerHandle;
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, Speed, Value};

pub use crate::types::DeferredId;

/// Lifecycle state of a Deferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Not fired yet.
    Unfired,
    /// Fired; the current result is a success value.
    Success,
    /// Fired; the current result is an error.
    Failure,
}

impl State {
    /// Returns true once the Deferred has fired.
    #[must_use]
    pub const fn is_fired(self) -> bool {
        !matches!(self, Self::Unfired)
    }
}

/// Live options of a Deferred.
///
/// Changes requested after the chain started are queued as links, so they
/// take effect between the steps around them.
pub(crate) struct Options {
    pub(crate) speed: Speed,
    pub(crate) run_async: bool,
    pub(crate) cancellers: Vec<Box<dyn FnOnce()>>,
    pub(crate) stoppers: Vec<Box<dyn FnOnce()>>,
}

/// Types a chain step can wait on.
///
/// Sealed: only [`Deferred`] and the iteration [`Session`](crate::Session)
/// implement it.
pub trait Awaitable: sealed::Sealed {
    /// The Deferred that settles with this value's outcome.
    fn as_deferred(&self) -> Deferred;
}

pub(crate) mod sealed {
    pub trait Sealed {}
}

struct Inner {
    id: DeferredId,
    state: State,
    chain: VecDeque<Link>,
    options: Options,
    success: Value,
    failure: Option<Error>,
    nested: usize,
    cancelled: bool,
    sealed: bool,
    has_errback: bool,
    draining: bool,
    tick: Option<TimerHandle>,
    debris: Option<TimerHandle>,
    data: BTreeMap<String, Value>,
}

impl Inner {
    fn current(&self) -> Value {
        match (&self.state, &self.failure) {
            (State::Failure, Some(err)) => Value::Error(err.clone()),
            _ => self.success.clone(),
        }
    }

    fn settle_success(&mut self, value: Value) {
        self.state = State::Success;
        self.success = value;
        self.failure = None;
    }

    fn settle_failure(&mut self, err: Error) {
        self.state = State::Failure;
        self.success = Value::Null;
        self.failure = Some(err);
    }

    fn settle(&mut self, value: Value) {
        match value {
            Value::Error(err) => self.settle_failure(err),
            other => self.settle_success(other),
        }
    }

    /// True when a drain would make progress.
    fn ready(&self) -> bool {
        self.state.is_fired() && !self.cancelled && self.nested == 0 && !self.chain.is_empty()
    }
}

/// A chainable unit of future work.
///
/// Handles are cheap to clone and all refer to the same Deferred.
#[derive(Clone)]
pub struct Deferred {
    inner: Rc<RefCell<Inner>>,
    cx: Cx,
}

impl Deferred {
    /// Creates an unfired Deferred with the context's default speed and mode.
    #[must_use]
    pub fn new(cx: &Cx) -> Self {
        let config = cx.config();
        let options = Options {
            speed: Speed::Named(config.default_speed),
            run_async: config.default_async,
            cancellers: Vec::new(),
            stoppers: Vec::new(),
        };
        Self {
            inner: Rc::new(RefCell::new(Inner {
                id: DeferredId::next(),
                state: State::Unfired,
                chain: VecDeque::new(),
                options,
                success: Value::Null,
                failure: None,
                nested: 0,
                cancelled: false,
                sealed: false,
                has_errback: false,
                draining: false,
                tick: None,
                debris: None,
                data: BTreeMap::new(),
            })),
            cx: cx.clone(),
        }
    }

    /// Returns the identifier.
    #[must_use]
    pub fn id(&self) -> DeferredId {
        self.inner.borrow().id
    }

    /// Returns the context this Deferred was created with.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        &self.cx
    }

    /// Returns true if both handles refer to the same Deferred.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> State {
        self.inner.borrow().state
    }

    /// Returns true once fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.state().is_fired()
    }

    /// Returns true once cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.borrow().cancelled
    }

    /// Returns true once [`end`](Self::end) sealed the chain.
    #[must_use]
    pub fn is_sealed(&self) -> bool {
        self.inner.borrow().sealed
    }

    /// Number of links still queued.
    #[must_use]
    pub fn pending_links(&self) -> usize {
        self.inner.borrow().chain.len()
    }

    /// The settled result, or `None` while unfired or waiting on a nested
    /// Deferred.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<Value, Error>> {
        let inner = self.inner.borrow();
        if !inner.state.is_fired() || inner.nested > 0 {
            return None;
        }
        Some(match &inner.failure {
            Some(err) if inner.state == State::Failure => Err(err.clone()),
            _ => Ok(inner.success.clone()),
        })
    }

    // === Chain building ===

    /// Appends a success step.
    pub fn then(&self, on_success: impl FnOnce(Value) -> StepResult + 'static) -> &Self {
        self.push_user(
            Link::Branches {
                on_success: Some(Callback::single(on_success)),
                on_failure: None,
            },
            false,
        )
    }

    /// Appends a step with both branches.
    pub fn then_else(
        &self,
        on_success: impl FnOnce(Value) -> StepResult + 'static,
        on_failure: impl FnOnce(Error) -> StepResult + 'static,
    ) -> &Self {
        self.push_user(
            Link::Branches {
                on_success: Some(Callback::single(on_success)),
                on_failure: Some(errback(on_failure)),
            },
            true,
        )
    }

    /// Appends a success step that destructures a list result.
    ///
    /// A `List` of exactly `arity` elements is passed positionally; any other
    /// result arrives as a one-element vector.
    pub fn then_spread(
        &self,
        arity: usize,
        on_success: impl FnOnce(Vec<Value>) -> StepResult + 'static,
    ) -> &Self {
        self.push_user(
            Link::Branches {
                on_success: Some(Callback::spread(arity, on_success)),
                on_failure: None,
            },
            false,
        )
    }

    /// Appends a failure step.
    pub fn rescue(&self, on_failure: impl FnOnce(Error) -> StepResult + 'static) -> &Self {
        self.push_user(
            Link::Branches {
                on_success: None,
                on_failure: Some(errback(on_failure)),
            },
            true,
        )
    }

    /// Appends a step that runs in either state with the current result.
    pub fn ensure(&self, f: impl FnOnce(Value) -> StepResult + 'static) -> &Self {
        self.push_user(Link::Either(Callback::single(f)), true)
    }

    /// Seals the chain; later `then` calls are ignored.
    pub fn end(&self) -> &Self {
        let mut inner = self.inner.borrow_mut();
        if !inner.sealed {
            inner.sealed = true;
            debug!(deferred = %inner.id, "chain sealed");
        }
        drop(inner);
        self
    }

    pub(crate) fn push_user(&self, link: Link, handles_failure: bool) -> &Self {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.sealed || inner.cancelled {
                debug!(
                    deferred = %inner.id,
                    sealed = inner.sealed,
                    cancelled = inner.cancelled,
                    "link ignored"
                );
                return self;
            }
            inner.chain.push_back(link);
            if handles_failure {
                inner.has_errback = true;
            }
        }
        if handles_failure {
            self.clear_debris();
        }
        self.fire();
        self
    }

    /// Runs `f` with the settled state and result once every link queued
    /// before it has drained. Ignores the seal and survives cancellation.
    pub(crate) fn observe(&self, f: impl FnOnce(State, Value) + 'static) {
        let immediate = {
            let inner = self.inner.borrow();
            inner.cancelled && inner.state.is_fired() && inner.nested == 0
        };
        if immediate {
            let (state, value) = {
                let inner = self.inner.borrow();
                (inner.state, inner.current())
            };
            f(state, value);
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.chain.push_back(Link::Observe(Box::new(f)));
            // The observer inherits the failure and reports it if it must.
            inner.has_errback = true;
        }
        self.clear_debris();
        self.fire();
    }

    /// The failure now belongs to whoever adopted it.
    fn mark_handled(&self) {
        self.inner.borrow_mut().has_errback = true;
        self.clear_debris();
    }

    // === Firing ===

    /// Fires the Deferred with a success value.
    ///
    /// A Deferred passed as the value is adopted: this Deferred fires with
    /// its outcome, right away if it already settled, otherwise once it
    /// does. Calling `begin` on a fired Deferred does nothing.
    pub fn begin(&self, value: impl Into<Value>) -> &Self {
        let value = value.into();
        if self.is_fired() {
            debug!(deferred = %self.id(), "begin on fired deferred ignored");
            return self;
        }
        if let Value::Deferred(source) = value {
            return self.adopt(&source);
        }
        self.fire_with(State::Success, value);
        self
    }

    /// Fires the Deferred with a failure, wrapping non-error values.
    pub fn raise(&self, value: impl Into<Value>) -> &Self {
        if self.is_fired() {
            debug!(deferred = %self.id(), "raise on fired deferred ignored");
            return self;
        }
        self.fire_with(State::Failure, Value::Error(Error::wrap(value.into())));
        self
    }

    fn adopt(&self, source: &Self) -> &Self {
        if source.ptr_eq(self) {
            let err = Error::new(ErrorKind::InvalidStateTransition)
                .with_message("a deferred cannot begin with itself");
            self.fire_with(State::Failure, Value::Error(err));
            return self;
        }
        match source.outcome() {
            Some(Ok(value)) => {
                source.mark_handled();
                self.fire_with(State::Success, value);
            }
            Some(Err(err)) => {
                source.mark_handled();
                self.fire_with(State::Failure, Value::Error(err));
            }
            None => {
                let this = self.clone();
                source.observe(move |state, value| match state {
                    State::Failure => {
                        this.raise(value);
                    }
                    _ => {
                        this.begin(value);
                    }
                });
            }
        }
        self
    }

    fn fire_with(&self, state: State, value: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_fired() {
                return;
            }
            inner.options.cancellers.clear();
            match state {
                State::Failure => inner.settle_failure(Error::wrap(value)),
                _ => inner.settle_success(value),
            }
            debug!(deferred = %inner.id, state = ?inner.state, "fired");
        }
        self.fire();
    }

    /// Starts or continues draining according to the current mode.
    fn fire(&self) {
        let (ready, idle, run_async) = {
            let inner = self.inner.borrow();
            let idle = inner.state.is_fired() && inner.nested == 0 && inner.chain.is_empty();
            (inner.ready(), idle, inner.options.run_async)
        };
        if idle {
            self.check_debris();
        } else if ready {
            if run_async {
                self.schedule_tick();
            } else {
                self.drain();
            }
        }
    }

    fn schedule_tick(&self) {
        let delay = {
            let inner = self.inner.borrow();
            if inner.tick.is_some() {
                return;
            }
            self.cx.speeds().delay(inner.options.speed)
        };
        let this = self.clone();
        let handle = self.cx.schedule(delay, Box::new(move || this.on_tick()));
        self.inner.borrow_mut().tick = Some(handle);
    }

    fn on_tick(&self) {
        self.inner.borrow_mut().tick = None;
        self.step_once();
        self.fire();
    }

    fn drain(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.draining {
                // The running drain loop picks up whatever was just queued.
                return;
            }
            inner.draining = true;
        }
        while self.step_once() {
            if self.inner.borrow().options.run_async {
                break;
            }
        }
        self.inner.borrow_mut().draining = false;
        self.fire();
    }

    /// Processes the next link. Returns false when nothing could run.
    fn step_once(&self) -> bool {
        let (link, state, input, id) = {
            let mut inner = self.inner.borrow_mut();
            if !inner.ready() {
                return false;
            }
            let Some(link) = inner.chain.pop_front() else {
                return false;
            };
            (link, inner.state, inner.current(), inner.id)
        };
        trace!(deferred = %id, link = ?link, state = ?state, "processing link");
        let callback = match link {
            Link::Branches {
                on_success,
                on_failure,
            } => match state {
                State::Failure => on_failure,
                _ => on_success,
            },
            Link::Either(cb) => Some(cb),
            Link::Observe(f) => {
                f(state, input);
                return true;
            }
            Link::Configure(apply) => {
                apply(&mut self.inner.borrow_mut().options);
                return true;
            }
        };
        if let Some(cb) = callback {
            let outcome = cb.invoke(input);
            self.apply_step(outcome);
        }
        true
    }

    fn apply_step(&self, outcome: StepResult) {
        if self.is_cancelled() {
            // The step cancelled its own Deferred; the result stays as it was.
            debug!(deferred = %self.id(), "step result dropped after cancel");
            return;
        }
        match outcome {
            Ok(Step::Keep) => {}
            Ok(Step::Stop) => {
                let mut inner = self.inner.borrow_mut();
                inner.chain.retain(Link::is_observer);
                debug!(deferred = %inner.id, "chain stopped");
            }
            Ok(Step::Replace(Value::Deferred(next))) => self.nest(next),
            Ok(Step::Replace(value)) => self.inner.borrow_mut().settle(value),
            Err(err) => self.inner.borrow_mut().settle_failure(err),
        }
    }

    /// Pauses the chain until `next` settles.
    fn nest(&self, next: Self) {
        if next.ptr_eq(self) {
            let err = Error::new(ErrorKind::InvalidStateTransition)
                .with_message("a deferred step cannot return its own deferred");
            self.inner.borrow_mut().settle_failure(err);
            return;
        }
        {
            let mut inner = self.inner.borrow_mut();
            inner.nested += 1;
            inner.success = Value::Deferred(next.clone());
            inner.failure = None;
            inner.state = State::Success;
            debug!(deferred = %inner.id, inner = %next.id(), "waiting on nested deferred");
        }
        let outer = self.clone();
        next.observe(move |state, value| outer.resume(state, value));
    }

    fn resume(&self, state: State, value: Value) {
        {
            let mut inner = self.inner.borrow_mut();
            inner.nested = inner.nested.saturating_sub(1);
            match state {
                State::Failure => inner.settle_failure(Error::wrap(value)),
                _ => inner.settle_success(value),
            }
            trace!(deferred = %inner.id, state = ?inner.state, "resumed after nested deferred");
        }
        if self.is_cancelled() {
            self.notify_observers();
        } else {
            self.fire();
        }
    }

    // === Cancellation ===

    /// Cancels the Deferred. Idempotent.
    ///
    /// Unfired: cancellers run, and if none of them fired the Deferred it
    /// fails with a cancellation error. Fired: stoppers run once, and a
    /// nested Deferred it waits on is cancelled too. Either way no further
    /// user step runs.
    pub fn cancel(&self) -> &Self {
        self.cancel_with(&CancelReason::default())
    }

    /// Cancels with an explicit reason.
    pub fn cancel_with(&self, reason: &CancelReason) -> &Self {
        let (was_fired, tick, debris) = {
            let mut inner = self.inner.borrow_mut();
            if inner.cancelled {
                return self;
            }
            inner.cancelled = true;
            debug!(deferred = %inner.id, reason = %reason, "cancelled");
            (inner.state.is_fired(), inner.tick.take(), inner.debris.take())
        };
        for handle in tick.into_iter().chain(debris) {
            self.cx.cancel_timer(handle);
        }

        if was_fired {
            let stoppers = std::mem::take(&mut self.inner.borrow_mut().options.stoppers);
            for stop in stoppers {
                stop();
            }
            let nested = match &self.inner.borrow().success {
                Value::Deferred(d) => Some(d.clone()),
                _ => None,
            };
            if let Some(d) = nested {
                d.cancel_with(&CancelReason::parent_cancelled());
            }
        } else {
            let cancellers = std::mem::take(&mut self.inner.borrow_mut().options.cancellers);
            for cancel in cancellers {
                cancel();
            }
            let mut inner = self.inner.borrow_mut();
            if !inner.state.is_fired() {
                inner.settle_failure(Error::cancelled(reason));
            }
        }
        self.notify_observers();
        self
    }

    /// Hands the settled result to every observer; drops user links.
    fn notify_observers(&self) {
        let (observers, state, value) = {
            let mut inner = self.inner.borrow_mut();
            if inner.nested > 0 {
                return;
            }
            let links = std::mem::take(&mut inner.chain);
            let observers: Vec<_> = links
                .into_iter()
                .filter_map(|link| match link {
                    Link::Observe(f) => Some(f),
                    _ => None,
                })
                .collect();
            (observers, inner.state, inner.current())
        };
        for f in observers {
            f(state, value.clone());
        }
    }

    // === Options ===

    /// Current speed.
    #[must_use]
    pub fn speed(&self) -> Speed {
        self.inner.borrow().options.speed
    }

    /// Current mode.
    #[must_use]
    pub fn is_async(&self) -> bool {
        self.inner.borrow().options.run_async
    }

    /// Delay between async ticks at the current speed.
    #[must_use]
    pub fn delay(&self) -> Duration {
        self.cx.speeds().delay(self.speed())
    }

    /// Sets the speed: immediately before firing, otherwise once the links
    /// queued so far have drained.
    pub fn set_speed(&self, speed: impl Into<Speed>) -> &Self {
        let speed = speed.into();
        self.configure(move |options| options.speed = speed)
    }

    /// Sets async (one link per tick) or sync draining.
    pub fn set_async(&self, run_async: bool) -> &Self {
        self.configure(move |options| options.run_async = run_async)
    }

    /// Registers a callback run if the Deferred is cancelled before firing.
    pub fn add_canceller(&self, f: impl FnOnce() + 'static) -> &Self {
        self.configure(move |options| options.cancellers.push(Box::new(f)))
    }

    /// Registers a callback run if the Deferred is cancelled after firing.
    pub fn add_stopper(&self, f: impl FnOnce() + 'static) -> &Self {
        self.configure(move |options| options.stoppers.push(Box::new(f)))
    }

    fn configure(&self, apply: impl FnOnce(&mut Options) + 'static) -> &Self {
        let queued = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_fired() {
                inner.chain.push_back(Link::Configure(Box::new(apply)));
                true
            } else {
                apply(&mut inner.options);
                false
            }
        };
        if queued {
            self.fire();
        }
        self
    }

    // === Storage ===

    /// Reads a value from the per-instance store.
    #[must_use]
    pub fn data(&self, key: &str) -> Option<Value> {
        self.inner.borrow().data.get(key).cloned()
    }

    /// Writes a value to the per-instance store, returning the old one.
    pub fn set_data(&self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.inner.borrow_mut().data.insert(key.into(), value.into())
    }
}

fn errback(f: impl FnOnce(Error) -> StepResult + 'static) -> Callback {
    Callback::single(move |value| f(value.into_error()))
}

impl sealed::Sealed for Deferred {}

impl Awaitable for Deferred {
    fn as_deferred(&self) -> Deferred {
        self.clone()
    }
}

impl fmt::Debug for Deferred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => f
                .debug_struct("Deferred")
                .field("id", &inner.id)
                .field("state", &inner.state)
                .field("links", &inner.chain.len())
                .field("nested", &inner.nested)
                .field("cancelled", &inner.cancelled)
                .finish(),
            Err(_) => f.debug_struct("Deferred").finish_non_exhaustive(),
        }
    }
}
