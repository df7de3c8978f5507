//! Time-sliced iteration sessions.
//!
//! A [`LightIterator`] owns a loop and its accumulator and runs the loop in
//! bursts. Each burst is a zero-delay host task; it steps the loop until the
//! burst budget of its speed is spent (see [`metrics`](super::metrics)),
//! then schedules the next burst and returns control to the host.
//!
//! ```text
//! Idle ──▶ Running ──▶ Completed
//!            │  ▲  ╲
//!   await    ▼  │   ╲ cancel
//!         Suspended ──▶ Cancelled
//! ```
//!
//! An async session that gets a `Value::Deferred` output suspends until
//! that Deferred settles, records the settled value and carries on. A
//! failure there, or an error from the loop, ends the session with that
//! failure.

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

use super::gather::Gather;
use super::metrics::TimeMetrics;
use super::{Entry, Iter, Next};
use crate::cx::Cx;
use crate::deferred::{sealed, Awaitable, Deferred, State};
use crate::error::{Error, Result};
use crate::runtime::TimerHandle;
use crate::tracing_compat::{debug, trace};
use crate::types::{CancelReason, Speed, Value};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// Created; the first burst has not run.
    Idle,
    /// Bursts are running.
    Running,
    /// Waiting for an inner Deferred.
    Suspended,
    /// Finished, successfully or with a failure.
    Completed,
    /// Cancelled before it finished.
    Cancelled,
}

impl SessionState {
    /// Returns true for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Handle state shared between a session and its [`Session`] handles.
struct Shared {
    state: Cell<SessionState>,
    cancelled: Cell<bool>,
    burst: Cell<Option<TimerHandle>>,
    awaiting: RefCell<Option<Deferred>>,
}

/// A time-sliced loop.
pub struct LightIterator {
    cx: Cx,
    iter: Box<dyn Iter>,
    gather: Option<Gather>,
    metrics: TimeMetrics,
    interval_ms: i64,
    normal_interval_ms: i64,
    run_async: bool,
    deferred: Deferred,
    shared: Rc<Shared>,
}

impl LightIterator {
    /// Creates an idle session at `speed`.
    ///
    /// The owning Deferred runs at the same speed.
    #[must_use]
    pub fn new(cx: &Cx, iter: Box<dyn Iter>, gather: Gather, speed: Speed, run_async: bool) -> Self {
        let deferred = Deferred::new(cx);
        deferred.set_speed(speed);
        Self {
            cx: cx.clone(),
            iter,
            gather: Some(gather),
            metrics: TimeMetrics::new(cx.now()),
            interval_ms: cx.speeds().interval(speed),
            normal_interval_ms: cx.speeds().normal_interval(),
            run_async,
            deferred,
            shared: Rc::new(Shared {
                state: Cell::new(SessionState::Idle),
                cancelled: Cell::new(false),
                burst: Cell::new(None),
                awaiting: RefCell::new(None),
            }),
        }
    }

    /// Schedules the first burst and returns the session handle.
    pub fn start(self) -> Session {
        let session = Session {
            deferred: self.deferred.clone(),
            shared: self.shared.clone(),
        };
        let shared = self.shared.clone();
        let cx = self.cx.clone();
        self.deferred.add_canceller(move || {
            shared.cancelled.set(true);
            shared.state.set(SessionState::Cancelled);
            if let Some(handle) = shared.burst.take() {
                cx.cancel_timer(handle);
            }
            let awaiting = shared.awaiting.borrow_mut().take();
            if let Some(inner) = awaiting {
                inner.cancel_with(&CancelReason::session_cancelled());
            }
            debug!("iteration session cancelled");
        });
        debug!(deferred = %self.deferred.id(), interval_ms = self.interval_ms, "iteration session started");
        Box::new(self).schedule_burst();
        session
    }

    fn schedule_burst(self: Box<Self>) {
        let cx = self.cx.clone();
        let shared = self.shared.clone();
        let handle = cx.schedule(
            Duration::ZERO,
            Box::new(move || {
                self.shared.burst.set(None);
                self.burst();
            }),
        );
        shared.burst.set(Some(handle));
    }

    fn burst(mut self: Box<Self>) {
        if self.shared.cancelled.get() {
            return;
        }
        self.shared.state.set(SessionState::Running);
        self.metrics.begin_slice(self.cx.now());
        trace!(
            deferred = %self.deferred.id(),
            burst = self.metrics.bursts(),
            steps = self.metrics.steps(),
            "iteration burst"
        );
        loop {
            if self.shared.cancelled.get() {
                return;
            }
            let started = self.cx.now();
            let next = self.iter.next();
            self.metrics.record_step(started, self.cx.now());
            match next {
                Err(err) => return self.fail(err),
                Ok(Next::Stop) => return self.complete(),
                Ok(Next::Item(entry)) => {
                    if self.run_async {
                        if let Value::Deferred(inner) = &entry.output {
                            let inner = inner.clone();
                            return self.suspend(&inner, entry);
                        }
                    }
                    if !self.record(entry) {
                        return self.complete();
                    }
                }
            }
            let now = self.cx.now();
            let cx = self.cx.clone();
            if self.metrics.should_yield(
                now,
                self.interval_ms,
                self.normal_interval_ms,
                self.run_async,
                || cx.random_f64(),
            ) {
                trace!(
                    deferred = %self.deferred.id(),
                    risk_ms = self.metrics.elapsed_risk(now),
                    "iteration yield"
                );
                return self.schedule_burst();
            }
        }
    }

    fn record(&mut self, entry: Entry) -> bool {
        self.gather.as_mut().is_some_and(|gather| gather.record(entry))
    }

    fn suspend(self: Box<Self>, inner: &Deferred, entry: Entry) {
        self.shared.state.set(SessionState::Suspended);
        *self.shared.awaiting.borrow_mut() = Some(inner.clone());
        debug!(deferred = %self.deferred.id(), inner = %inner.id(), "iteration suspended");
        let Entry { key, item, .. } = entry;
        inner.observe(move |state, value| {
            self.shared.awaiting.borrow_mut().take();
            if self.shared.cancelled.get() {
                return;
            }
            self.resume(state, Entry { key, item, output: value });
        });
    }

    fn resume(mut self: Box<Self>, state: State, entry: Entry) {
        if state == State::Failure {
            return self.fail(entry.output.into_error());
        }
        self.shared.state.set(SessionState::Running);
        if self.record(entry) {
            self.schedule_burst();
        } else {
            self.complete();
        }
    }

    fn complete(mut self: Box<Self>) {
        self.shared.state.set(SessionState::Completed);
        let result = self.gather.take().map(Gather::finish).unwrap_or_default();
        debug!(
            deferred = %self.deferred.id(),
            steps = self.metrics.steps(),
            bursts = self.metrics.bursts(),
            elapsed_ms = self.metrics.session_elapsed_ms(self.cx.now()),
            "iteration completed"
        );
        self.deferred.begin(result);
    }

    fn fail(self: Box<Self>, err: Error) {
        self.shared.state.set(SessionState::Completed);
        debug!(deferred = %self.deferred.id(), error = %err, "iteration failed");
        self.deferred.raise(err);
    }
}

/// Handle to a running (or finished) iteration session.
///
/// Its [`deferred`](Self::deferred) fires with the loop result.
#[derive(Clone)]
pub struct Session {
    deferred: Deferred,
    shared: Rc<Shared>,
}

impl Session {
    /// A session that already finished with `result`.
    pub(crate) fn finished(cx: &Cx, speed: Speed, result: Result<Value>) -> Self {
        let deferred = Deferred::new(cx);
        deferred.set_speed(speed);
        match result {
            Ok(value) => deferred.begin(value),
            Err(err) => deferred.raise(err),
        };
        Self {
            deferred,
            shared: Rc::new(Shared {
                state: Cell::new(SessionState::Completed),
                cancelled: Cell::new(false),
                burst: Cell::new(None),
                awaiting: RefCell::new(None),
            }),
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// The Deferred that fires with the loop result.
    #[must_use]
    pub fn deferred(&self) -> &Deferred {
        &self.deferred
    }

    /// Cancels the session. Idempotent; does nothing once it finished.
    ///
    /// A finished session has already handed its result to the Deferred, so
    /// steps chained on [`deferred`](Self::deferred) still run.
    pub fn cancel(&self) {
        if self.deferred.is_fired() {
            return;
        }
        self.deferred.cancel_with(&CancelReason::session_cancelled());
    }

    /// The loop result once the session's Deferred has settled.
    #[must_use]
    pub fn outcome(&self) -> Option<Result<Value>> {
        self.deferred.outcome()
    }
}

impl sealed::Sealed for Session {}

impl Awaitable for Session {
    fn as_deferred(&self) -> Deferred {
        self.deferred.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("deferred", &self.deferred.id())
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::deferred;
    use crate::error::ErrorKind;
    use crate::iter::shapes::{ArrayLoop, Forever, LoopFn};
    use crate::iter::{Shape, Turn};
    use crate::runtime::LabHost;
    use crate::test_utils::{init_test_logging, test_config, test_cx, test_cx_with};
    use crate::types::SpeedName;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn session(cx: &Cx, input: Value, f: LoopFn<'static>, speed: SpeedName) -> Session {
        let iter = ArrayLoop::new(input, f).unwrap();
        LightIterator::new(cx, Box::new(iter), Gather::collect(Shape::ArrayLoop), speed.into(), true).start()
    }

    #[test]
    fn session_runs_on_the_host() {
        init_test("session_runs_on_the_host");
        let (cx, host) = test_cx();
        let f: LoopFn<'static> = Box::new(|item, _| Ok(Turn::next(item.as_i64().unwrap_or(0) + 1)));
        let s = session(&cx, Value::from(vec![1, 2, 3]), f, SpeedName::Normal);
        assert_eq!(s.state(), SessionState::Idle);

        host.run_until_idle();
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.outcome(), Some(Ok(Value::from(vec![2, 3, 4]))));
        crate::test_complete!("session_runs_on_the_host");
    }

    #[test]
    fn limp_sessions_yield_every_step() {
        init_test("limp_sessions_yield_every_step");
        let (cx, host) = test_cx();
        let bursts = Rc::new(Cell::new(0usize));
        let counter = bursts.clone();
        let f: LoopFn<'static> = Box::new(move |item, _| {
            counter.set(counter.get() + 1);
            Ok(Turn::Continue(item))
        });
        let s = session(&cx, Value::from(vec![1, 2, 3, 4]), f, SpeedName::Limp);

        // One burst per host task, so each run_next advances one step.
        assert!(host.run_next());
        assert_eq!(bursts.get(), 1);
        assert_eq!(s.state(), SessionState::Running);
        host.run_until_idle();
        assert_eq!(bursts.get(), 4);
        assert_eq!(s.outcome(), Some(Ok(Value::from(vec![1, 2, 3, 4]))));
    }

    #[test]
    fn expensive_steps_split_into_bursts() {
        init_test("expensive_steps_split_into_bursts");
        let (cx, host) = test_cx();
        let clock = host.clone();
        let f: LoopFn<'static> = Box::new(move |item, _| {
            clock.clock().advance_by(Duration::from_millis(60));
            Ok(Turn::Continue(item))
        });
        let s = session(&cx, Value::from(vec![1, 2, 3]), f, SpeedName::Normal);
        let tasks = host.run_until_idle();
        // Far over budget after each step: one burst per element, plus the
        // owning Deferred's own ticks.
        assert!(tasks >= 3, "ran {tasks} host tasks");
        assert_eq!(s.outcome(), Some(Ok(Value::from(vec![1, 2, 3]))));
    }

    #[test]
    fn async_session_awaits_inner_deferreds() {
        init_test("async_session_awaits_inner_deferreds");
        let (cx, host) = test_cx();
        let inner_cx = cx.clone();
        let f: LoopFn<'static> = Box::new(move |item, _| {
            let d = deferred::wait(&inner_cx, Duration::from_millis(10));
            let n = item.as_i64().unwrap_or(0);
            d.then(move |_| Ok(crate::Step::replace(n * 10)));
            Ok(Turn::Continue(Value::Deferred(d)))
        });
        let s = session(&cx, Value::from(vec![1, 2]), f, SpeedName::Normal);

        host.run_next();
        assert_eq!(s.state(), SessionState::Suspended);
        host.run_until_idle();
        assert_eq!(s.outcome(), Some(Ok(Value::from(vec![10, 20]))));
    }

    #[test]
    fn inner_failure_fails_the_session() {
        init_test("inner_failure_fails_the_session");
        let (cx, host) = test_cx();
        let inner_cx = cx.clone();
        let f: LoopFn<'static> = Box::new(move |_, _| {
            Ok(Turn::Continue(Value::Deferred(deferred::failure(
                &inner_cx,
                Error::user("inner broke"),
            ))))
        });
        let s = session(&cx, Value::from(vec![1, 2]), f, SpeedName::Normal);
        s.deferred().rescue(|err| Ok(crate::Step::replace(err.message().unwrap_or("").to_string())));
        host.run_until_idle();
        assert_eq!(s.state(), SessionState::Completed);
        assert_eq!(s.outcome(), Some(Ok(Value::from("inner broke"))));
        assert_eq!(cx.unhandled_count(), 0);
    }

    #[test]
    fn loop_errors_fail_the_session() {
        init_test("loop_errors_fail_the_session");
        let (cx, host) = test_cx();
        let f: LoopFn<'static> = Box::new(|item, _| {
            if item.as_i64() == Some(2) {
                Err(Error::user("two"))
            } else {
                Ok(Turn::Continue(item))
            }
        });
        let s = session(&cx, Value::from(vec![1, 2, 3]), f, SpeedName::Normal);
        host.run_until_idle();
        let err = s.outcome().unwrap().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
        // Nobody handled it: chain debris reports it.
        assert_eq!(cx.unhandled_count(), 1);
    }

    #[test]
    fn cancel_stops_a_forever_loop() {
        init_test("cancel_stops_a_forever_loop");
        let (cx, host) = test_cx_with(test_config(), LabHost::new().max_steps(50));
        let f: LoopFn<'static> = Box::new(|n, _| Ok(Turn::Continue(n)));
        let iter = Forever::new(f);
        let s = LightIterator::new(&cx, Box::new(iter), Gather::Last(Value::Null), SpeedName::Limp.into(), true)
            .start();

        for _ in 0..5 {
            host.run_next();
        }
        assert_eq!(s.state(), SessionState::Running);
        s.cancel();
        s.cancel();
        assert_eq!(s.state(), SessionState::Cancelled);
        host.run_until_idle();
        assert_eq!(host.pending(), 0);
        let err = s.outcome().unwrap().unwrap_err();
        assert!(err.is_cancelled());
        assert_eq!(err.message(), Some("session cancelled"));
        assert_eq!(cx.unhandled_count(), 0);
    }

    #[test]
    fn cancel_while_suspended_cancels_the_inner_deferred() {
        init_test("cancel_while_suspended_cancels_the_inner_deferred");
        let (cx, host) = test_cx();
        let inner = Deferred::new(&cx);
        let handed = inner.clone();
        let f: LoopFn<'static> = Box::new(move |_, _| Ok(Turn::Continue(Value::Deferred(handed.clone()))));
        let s = session(&cx, Value::from(vec![1]), f, SpeedName::Normal);
        host.run_next();
        assert_eq!(s.state(), SessionState::Suspended);

        s.cancel();
        assert!(inner.is_cancelled());
        host.run_until_idle();
        assert_eq!(s.state(), SessionState::Cancelled);
        let err = inner.outcome().unwrap().unwrap_err();
        assert_eq!(err.message(), Some("session cancelled"));
    }

    #[test]
    fn cancel_after_completion_keeps_chained_steps() {
        init_test("cancel_after_completion_keeps_chained_steps");
        let (cx, host) = test_cx();
        let f: LoopFn<'static> = Box::new(|item, _| Ok(Turn::Continue(item)));
        let s = session(&cx, Value::from(vec![1, 2]), f, SpeedName::Normal);
        host.run_until_idle();
        assert_eq!(s.state(), SessionState::Completed);

        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        s.deferred().then(move |v| {
            log.borrow_mut().push(v.clone());
            Ok(crate::Step::Keep)
        });
        s.cancel();
        host.run_until_idle();

        assert_eq!(s.state(), SessionState::Completed);
        assert!(!s.deferred().is_cancelled());
        assert_eq!(*seen.borrow(), vec![Value::from(vec![1, 2])]);
        assert_eq!(s.outcome(), Some(Ok(Value::from(vec![1, 2]))));
        crate::test_complete!("cancel_after_completion_keeps_chained_steps");
    }
}
