//! Synchronous execution.
//!
//! QuickIteration drains a loop without any timing. On a waitable host the
//! synchronous path is timed instead: when a burst overruns its budget the
//! host is pumped in place so due timers still run, then the loop carries
//! on. Both produce the same result for the same loop.
//!
//! Synchronous loops never await: a `Value::Deferred` output is recorded as
//! it is.

use super::gather::Gather;
use super::metrics::TimeMetrics;
use super::{Iter, Next};
use crate::cx::Cx;
use crate::error::Result;
use crate::tracing_compat::trace;
use crate::types::{Speed, Value};

/// Drains `iter` into `gather` with no timing.
pub fn quick<I: Iter + ?Sized>(iter: &mut I, gather: &mut Gather) -> Result<()> {
    loop {
        match iter.next()? {
            Next::Item(entry) => {
                if !gather.record(entry) {
                    return Ok(());
                }
            }
            Next::Stop => return Ok(()),
        }
    }
}

/// Drains `iter` into `gather`, pumping the host whenever the burst
/// overruns the slice budget of `speed`.
pub fn timed<I: Iter + ?Sized>(cx: &Cx, speed: Speed, iter: &mut I, gather: &mut Gather) -> Result<()> {
    let interval = cx.speeds().interval(speed);
    let normal = cx.speeds().normal_interval();
    let mut metrics = TimeMetrics::new(cx.now());
    metrics.begin_slice(cx.now());
    loop {
        let started = cx.now();
        let next = iter.next()?;
        metrics.record_step(started, cx.now());
        match next {
            Next::Item(entry) => {
                if !gather.record(entry) {
                    return Ok(());
                }
            }
            Next::Stop => return Ok(()),
        }
        if metrics.should_yield(cx.now(), interval, normal, false, || cx.random_f64()) {
            let ran = cx.pump();
            trace!(steps = metrics.steps(), pumped = ran, "sync loop pumped host");
            metrics.begin_slice(cx.now());
        }
    }
}

/// Runs a loop to completion on the current call stack.
pub fn run_sync<I: Iter + ?Sized>(cx: &Cx, speed: Speed, iter: &mut I, mut gather: Gather) -> Result<Value> {
    if cx.is_waitable() {
        timed(cx, speed, iter, &mut gather)?;
    } else {
        quick(iter, &mut gather)?;
    }
    Ok(gather.finish())
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::iter::shapes::{ArrayLoop, LoopFn};
    use crate::iter::Turn;
    use crate::runtime::LabHost;
    use crate::test_utils::{init_test_logging, test_config, test_cx_with};
    use crate::types::SpeedName;

    fn double<'a>() -> LoopFn<'a> {
        Box::new(|item, _| Ok(Turn::next(item.as_i64().unwrap_or(0) * 2)))
    }

    #[test]
    fn quick_and_timed_agree() {
        init_test_logging();
        let (cx, host) = test_cx_with(test_config(), LabHost::new().waitable(true));

        let input = Value::from(vec![1, 2, 3, 4]);
        let mut plain = ArrayLoop::new(input.clone(), double()).unwrap();
        let mut a = Gather::collect(crate::iter::Shape::ArrayLoop);
        quick(&mut plain, &mut a).unwrap();

        let clock = host.clone();
        let slow: LoopFn<'_> = Box::new(move |item, _| {
            clock.clock().advance_by(Duration::from_millis(30));
            Ok(Turn::next(item.as_i64().unwrap_or(0) * 2))
        });
        let mut timed_loop = ArrayLoop::new(input, slow).unwrap();
        let mut b = Gather::collect(crate::iter::Shape::ArrayLoop);
        timed(&cx, Speed::Named(SpeedName::Normal), &mut timed_loop, &mut b).unwrap();

        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn timed_loop_pumps_due_timers() {
        init_test_logging();
        let (cx, host) = test_cx_with(test_config(), LabHost::new().waitable(true));

        let fired = Rc::new(Cell::new(false));
        let flag = fired.clone();
        cx.schedule(Duration::from_millis(10), Box::new(move || flag.set(true)));

        let clock = host.clone();
        let seen = Rc::new(Cell::new(false));
        let observed = seen.clone();
        let probe = fired.clone();
        let f: LoopFn<'_> = Box::new(move |item, _| {
            clock.clock().advance_by(Duration::from_millis(60));
            observed.set(observed.get() || probe.get());
            Ok(Turn::Continue(item))
        });
        let mut iter = ArrayLoop::new(Value::from(vec![1, 2, 3]), f).unwrap();
        let out = run_sync(&cx, Speed::Named(SpeedName::Normal), &mut iter, Gather::Last(Value::Null)).unwrap();

        assert_eq!(out, Value::Int(3));
        assert!(seen.get(), "timer should fire between steps");
    }

    #[test]
    fn errors_end_the_loop() {
        let f: LoopFn<'_> = Box::new(|_, _| Err(crate::Error::user("bad item")));
        let mut iter = ArrayLoop::new(Value::from(vec![1, 2]), f).unwrap();
        let mut gather = Gather::Append(Vec::new());
        let err = quick(&mut iter, &mut gather).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::User);
    }
}
