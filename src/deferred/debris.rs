//! Chain debris: delayed reporting of unhandled failures.
//!
//! When a Failure reaches the end of a chain and no errback was ever
//! attached, a report is scheduled one speed delay later. Attaching an
//! errback inside that window cancels it; this race is observable and
//! intentional.

use super::{Deferred, State};
use crate::tracing_compat::trace;

impl Deferred {
    /// Schedules a debris report if the chain ended in an unhandled failure.
    pub(super) fn check_debris(&self) {
        let delay = {
            let inner = self.inner.borrow();
            let unhandled = inner.state == State::Failure
                && inner.chain.is_empty()
                && inner.nested == 0
                && !inner.has_errback
                && !inner.cancelled
                && inner.debris.is_none()
                && inner.failure.as_ref().is_some_and(|e| !e.is_cancelled());
            if !unhandled {
                return;
            }
            self.cx.speeds().delay(inner.options.speed)
        };
        let this = self.clone();
        let handle = self.cx.schedule(delay, Box::new(move || this.report_debris()));
        let mut inner = self.inner.borrow_mut();
        inner.debris = Some(handle);
        trace!(deferred = %inner.id, delay_ms = delay.as_millis() as u64, "chain debris scheduled");
    }

    /// Cancels a pending debris report.
    pub(super) fn clear_debris(&self) {
        let handle = self.inner.borrow_mut().debris.take();
        if let Some(handle) = handle {
            self.cx.cancel_timer(handle);
            trace!(deferred = %self.id(), "chain debris cleared");
        }
    }

    fn report_debris(&self) {
        let report = {
            let mut inner = self.inner.borrow_mut();
            inner.debris = None;
            if inner.state == State::Failure && !inner.has_errback && !inner.cancelled {
                inner.failure.clone().map(|err| (inner.id, err))
            } else {
                None
            }
        };
        if let Some((id, err)) = report {
            self.cx.report_unhandled(id, err);
        }
    }
}
