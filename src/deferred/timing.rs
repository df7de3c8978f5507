//! Factories and time-based chain steps.
//!
//! `wait` and `till` are the only timeouts the engine has. Both are built on
//! the host scheduler: `wait` is one timer, `till` re-arms a timer at the
//! Deferred's speed delay until its predicate holds.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use super::{Callback, Deferred, Link, Step};
use crate::cx::Cx;
use crate::error::Error;
use crate::runtime::TimerHandle;
use crate::types::Value;

/// Shortest polling period for `till`, so a zero-delay speed cannot spin.
const MIN_POLL: Duration = Duration::from_millis(1);

/// A Deferred already fired with `value`.
#[must_use]
pub fn succeed(cx: &Cx, value: impl Into<Value>) -> Deferred {
    let d = Deferred::new(cx);
    d.begin(value);
    d
}

/// A Deferred already failed with `err`.
#[must_use]
pub fn failure(cx: &Cx, err: Error) -> Deferred {
    let d = Deferred::new(cx);
    d.raise(err);
    d
}

/// A Deferred that fires with `Null` after `duration`.
///
/// Cancelling it before then cancels the timer.
#[must_use]
pub fn wait(cx: &Cx, duration: Duration) -> Deferred {
    let d = Deferred::new(cx);
    let target = d.clone();
    let handle = cx.schedule(duration, Box::new(move || {
        target.begin(Value::Null);
    }));
    let timer_cx = cx.clone();
    d.add_canceller(move || {
        timer_cx.cancel_timer(handle);
    });
    d
}

/// A Deferred that fires with `Null` once `predicate` returns true.
///
/// The predicate is checked immediately, then once per speed delay.
#[must_use]
pub fn till(cx: &Cx, predicate: impl FnMut() -> bool + 'static) -> Deferred {
    let d = Deferred::new(cx);
    let poller = Rc::new(Poller {
        target: d.clone(),
        predicate: RefCell::new(Box::new(predicate)),
        timer: RefCell::new(None),
    });
    let on_cancel = poller.clone();
    d.add_canceller(move || {
        if let Some(handle) = on_cancel.timer.borrow_mut().take() {
            on_cancel.target.cx().cancel_timer(handle);
        }
    });
    Poller::poll(&poller);
    d
}

struct Poller {
    target: Deferred,
    predicate: RefCell<Box<dyn FnMut() -> bool>>,
    timer: RefCell<Option<TimerHandle>>,
}

impl Poller {
    fn poll(this: &Rc<Self>) {
        this.timer.borrow_mut().take();
        if this.target.is_fired() {
            return;
        }
        let done = (this.predicate.borrow_mut())();
        if done {
            this.target.begin(Value::Null);
            return;
        }
        let period = this.target.delay().max(MIN_POLL);
        let next = this.clone();
        let handle = this
            .target
            .cx()
            .schedule(period, Box::new(move || Self::poll(&next)));
        *this.timer.borrow_mut() = Some(handle);
    }
}

impl Deferred {
    /// Appends a step that holds the current result for `duration`.
    ///
    /// The result (success or failure) passes through unchanged.
    pub fn wait(&self, duration: Duration) -> &Self {
        let cx = self.cx.clone();
        self.push_user(
            Link::Either(Callback::single(move |prior| {
                let timer = wait(&cx, duration);
                Ok(Step::Replace(Value::Deferred(pass_through(&timer, prior))))
            })),
            false,
        )
    }

    /// Appends a step that holds the current result until `predicate`
    /// returns true.
    pub fn till(&self, predicate: impl FnMut() -> bool + 'static) -> &Self {
        let cx = self.cx.clone();
        self.push_user(
            Link::Either(Callback::single(move |prior| {
                let gate = till(&cx, predicate);
                Ok(Step::Replace(Value::Deferred(pass_through(&gate, prior))))
            })),
            false,
        )
    }
}

/// Makes `gate` settle with `prior` instead of its own value.
fn pass_through(gate: &Deferred, prior: Value) -> Deferred {
    gate.set_async(false);
    gate.then(move |_| Ok(Step::Replace(prior)));
    gate.clone()
}
