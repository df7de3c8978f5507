//! The capability context type.
//!
//! `Cx` is cheap to clone (one `Rc`) and deliberately `!Send`: the engine is
//! single-threaded and every handle it gives out lives on the host thread.
//!
//! # Wrapping Cx for Embedders
//!
//! ```ignore
//! pub struct Page<'a> {
//!     cx: &'a Cx,
//!     rows: Vec<Value>,
//! }
//!
//! impl Page<'_> {
//!     pub fn render(&self) -> Deferred {
//!         Driver::new(self.cx).fast().for_each_async(self.rows.clone(), draw_row)
//!     }
//! }
//! ```

use core::fmt;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::config::EngineConfig;
use crate::error::Error;
use crate::runtime::{Scheduler, Task, TimerHandle};
use crate::tracing_compat::error;
use crate::types::{DeferredId, SpeedTable, Time};
use crate::util::DetRng;

/// A failure that reached the end of a chain with no errback attached.
#[derive(Debug, Clone, PartialEq)]
pub struct UnhandledFailure {
    /// The Deferred that held the failure.
    pub deferred: DeferredId,
    /// The failure itself.
    pub error: Error,
    /// Host time of the report.
    pub at: Time,
}

/// The capability context shared by Deferreds and iteration sessions.
#[derive(Clone)]
pub struct Cx {
    inner: Rc<CxInner>,
}

struct CxInner {
    config: EngineConfig,
    scheduler: Rc<dyn Scheduler>,
    rng: RefCell<DetRng>,
    unhandled: RefCell<Vec<UnhandledFailure>>,
}

impl Cx {
    /// Creates a context over a host scheduler.
    #[must_use]
    pub fn new(config: EngineConfig, scheduler: Rc<dyn Scheduler>) -> Self {
        let rng = DetRng::new(config.seed);
        Self {
            inner: Rc::new(CxInner {
                config,
                scheduler,
                rng: RefCell::new(rng),
                unhandled: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Returns the frozen configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Returns the speed table.
    #[must_use]
    pub fn speeds(&self) -> &SpeedTable {
        &self.inner.config.speeds
    }

    /// Returns the host scheduler.
    #[must_use]
    pub fn scheduler(&self) -> &Rc<dyn Scheduler> {
        &self.inner.scheduler
    }

    /// Current host time.
    #[must_use]
    pub fn now(&self) -> Time {
        self.inner.scheduler.now()
    }

    /// Schedules a task on the host.
    pub fn schedule(&self, delay: Duration, task: Task) -> TimerHandle {
        self.inner.scheduler.schedule(delay, task)
    }

    /// Cancels a scheduled task.
    pub fn cancel_timer(&self, handle: TimerHandle) -> bool {
        self.inner.scheduler.cancel(handle)
    }

    /// Whether the host may be pumped from a synchronous caller.
    #[must_use]
    pub fn is_waitable(&self) -> bool {
        self.inner.scheduler.is_waitable()
    }

    /// Runs host tasks that are already due.
    pub fn pump(&self) -> usize {
        self.inner.scheduler.pump()
    }

    /// Draws a float in `[0, 1)` from the deterministic RNG.
    pub fn random_f64(&self) -> f64 {
        self.inner.rng.borrow_mut().next_f64()
    }

    /// Records a chain debris report.
    ///
    /// # Panics
    ///
    /// Panics after recording when `panic_on_unhandled` is configured.
    pub fn report_unhandled(&self, deferred: DeferredId, err: Error) {
        let at = self.now();
        error!(deferred = %deferred, error = %err, at = %at, "unhandled failure in deferred chain");
        let message = format!("unhandled failure in {deferred}: {err}");
        self.inner.unhandled.borrow_mut().push(UnhandledFailure {
            deferred,
            error: err,
            at,
        });
        if self.inner.config.panic_on_unhandled {
            panic!("{message}");
        }
    }

    /// Takes every unhandled-failure report collected so far.
    pub fn take_unhandled(&self) -> Vec<UnhandledFailure> {
        std::mem::take(&mut *self.inner.unhandled.borrow_mut())
    }

    /// Number of reports not yet taken.
    #[must_use]
    pub fn unhandled_count(&self) -> usize {
        self.inner.unhandled.borrow().len()
    }
}

impl fmt::Debug for Cx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cx")
            .field("default_speed", &self.inner.config.default_speed)
            .field("default_async", &self.inner.config.default_async)
            .field("now", &self.now())
            .field("unhandled", &self.unhandled_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_utils::{init_test_logging, test_config, test_cx, test_cx_with};
    use crate::runtime::LabHost;
    use std::cell::Cell;

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn schedule_runs_on_host() {
        init_test("schedule_runs_on_host");
        let (cx, host) = test_cx();
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        cx.schedule(Duration::from_millis(3), Box::new(move || flag.set(true)));
        host.run_until_idle();
        assert!(ran.get());
        assert_eq!(cx.now(), Time::from_millis(3));
        crate::test_complete!("schedule_runs_on_host");
    }

    #[test]
    fn rng_is_seeded_from_config() {
        init_test("rng_is_seeded_from_config");
        let (a, _ha) = test_cx();
        let (b, _hb) = test_cx();
        for _ in 0..16 {
            assert!((a.random_f64() - b.random_f64()).abs() < f64::EPSILON);
        }
        crate::test_complete!("rng_is_seeded_from_config");
    }

    #[test]
    fn unhandled_reports_are_collected() {
        init_test("unhandled_reports_are_collected");
        let (cx, _host) = test_cx();
        let id = DeferredId::next();
        cx.report_unhandled(id, Error::user("lost"));
        assert_eq!(cx.unhandled_count(), 1);
        let reports = cx.take_unhandled();
        assert_eq!(reports[0].deferred, id);
        assert_eq!(reports[0].error.kind(), ErrorKind::User);
        assert_eq!(cx.unhandled_count(), 0);
        crate::test_complete!("unhandled_reports_are_collected");
    }

    #[test]
    #[should_panic(expected = "unhandled failure")]
    fn unhandled_report_panics_when_configured() {
        init_test_logging();
        let (cx, _host) = test_cx_with(test_config().panic_on_unhandled(true), LabHost::new());
        cx.report_unhandled(DeferredId::next(), Error::user("lost"));
    }
}
