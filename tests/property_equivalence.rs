//! Property tests: synchronous and time-sliced loops agree, and chain steps
//! keep their insertion order, whatever the input and step cost.

#[macro_use]
mod common;

use common::*;
use lightloop::runtime::LabHost;
use lightloop::{Deferred, Driver, SpeedName, Step, Turn, Value};
use proptest::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

fn speed_name() -> impl Strategy<Value = SpeedName> {
    prop::sample::select(SpeedName::ALL.to_vec())
}

fn int(v: &Value) -> i64 {
    v.as_i64().unwrap_or(0)
}

/// Runs `op` synchronously on a non-waitable host, then as a session whose
/// steps each cost `cost_ms` of lab time, and returns both results.
fn both_ways(
    items: &[i64],
    speed: SpeedName,
    cost_ms: u64,
    op: impl Fn(&Driver, Value, Rc<dyn Fn()>) -> (Option<Value>, Option<Deferred>),
) -> (Value, Value) {
    let (cx, _host) = test_lab();
    let input = Value::from(items.to_vec());
    let noop: Rc<dyn Fn()> = Rc::new(|| {});
    let (sync, _) = op(&Driver::new(&cx).speed(speed), input.clone(), noop);

    let (cx, host) = test_lab_with(test_config(), LabHost::new());
    let clock = host.clone();
    let cost: Rc<dyn Fn()> = Rc::new(move || spend(&clock, cost_ms));
    let (_, deferred) = op(&Driver::new(&cx).speed(speed), input, cost);
    host.run_until_idle();

    let deferred = deferred.expect("async op returns a deferred");
    (sync.expect("sync op returns a value"), settled_value(&deferred))
}

proptest! {
    #![proptest_config(test_proptest_config(48))]

    #[test]
    fn map_agrees(items in prop::collection::vec(-1000i64..1000, 0..40), speed in speed_name(), cost in 0u64..20) {
        init_test_logging();
        let (sync, sliced) = both_ways(&items, speed, cost, |driver, input, cost| {
            let async_cost = cost.clone();
            let sync = driver
                .map(input.clone(), |item, _| {
                    cost();
                    Ok(Turn::next(int(&item) * 7 - 1))
                })
                .ok();
            let deferred = driver.map_async(input, move |item, _| {
                async_cost();
                Ok(Turn::next(int(&item) * 7 - 1))
            });
            (sync, Some(deferred))
        });
        prop_assert_eq!(sync, sliced);
    }

    #[test]
    fn filter_agrees(items in prop::collection::vec(-50i64..50, 0..40), speed in speed_name(), cost in 0u64..20) {
        init_test_logging();
        let (sync, sliced) = both_ways(&items, speed, cost, |driver, input, cost| {
            let async_cost = cost.clone();
            let sync = driver
                .filter(input.clone(), |item, _| {
                    cost();
                    Ok(Turn::next(int(&item) % 3 == 0))
                })
                .ok();
            let deferred = driver.filter_async(input, move |item, _| {
                async_cost();
                Ok(Turn::next(int(&item) % 3 == 0))
            });
            (sync, Some(deferred))
        });
        prop_assert_eq!(sync, sliced);
    }

    #[test]
    fn for_each_agrees(items in prop::collection::vec(any::<i64>(), 0..40), speed in speed_name(), cost in 0u64..20) {
        init_test_logging();
        let (sync, sliced) = both_ways(&items, speed, cost, |driver, input, cost| {
            let async_cost = cost.clone();
            let sync = driver
                .for_each(input.clone(), |_, _| {
                    cost();
                    Ok(Turn::Continue(Value::Null))
                })
                .ok();
            let deferred = driver.for_each_async(input, move |_, _| {
                async_cost();
                Ok(Turn::Continue(Value::Null))
            });
            (sync, Some(deferred))
        });
        prop_assert_eq!(sync, sliced.clone());
        prop_assert_eq!(sliced, Value::from(items));
    }

    #[test]
    fn chain_steps_keep_insertion_order(count in 1usize..24, speed in speed_name()) {
        init_test_logging();
        let (cx, host) = test_lab();
        let log = Rc::new(RefCell::new(Vec::new()));
        let d = Deferred::new(&cx);
        d.set_speed(speed);
        for i in 0..count {
            let log = log.clone();
            d.then(move |v| {
                log.borrow_mut().push(i);
                Ok(Step::Replace(v))
            });
        }
        d.begin(());
        host.run_until_idle();
        prop_assert_eq!(log.borrow().clone(), (0..count).collect::<Vec<_>>());
    }
}
