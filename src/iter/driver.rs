//! Iteration entry points.
//!
//! A [`Driver`] carries the options of a family of loops (speed, mode and an
//! optional shape override) and exposes one method per loop operation.
//! Plain methods run the loop on the current call stack and return its
//! result. `_async` methods run it as a time-sliced
//! [`LightIterator`](super::LightIterator) session and return the Deferred
//! that fires with the result; with `run_async(false)` they run
//! synchronously and return an already fired Deferred.
//!
//! ```
//! use std::rc::Rc;
//! use lightloop::runtime::LabHost;
//! use lightloop::{Cx, Driver, EngineConfig, Turn, Value};
//!
//! let host = Rc::new(LabHost::new());
//! let cx = Cx::new(EngineConfig::default(), host.clone());
//!
//! let evens = Driver::new(&cx).fast().filter_async(vec![1, 2, 3, 4], |item, _| {
//!     Ok(Turn::next(item.as_i64().unwrap_or(1) % 2 == 0))
//! });
//! host.run_until_idle();
//! assert_eq!(evens.outcome().and_then(Result::ok), Some(Value::from(vec![2, 4])));
//! ```

use std::cell::RefCell;
use std::rc::Rc;

use super::gather::{FoldCell, Gather};
use super::light::{LightIterator, Session};
use super::quick;
use super::shapes::{self, Forever, Generic, LoopFn, PairedItems, Repeat, SourceFn, Zip};
use super::{Iter, Shape, Turn, TurnResult};
use crate::cx::Cx;
use crate::deferred::Deferred;
use crate::error::Result;
use crate::types::{Speed, SpeedName, Value};

/// A loop ready to run: the iterator and its accumulator.
type Plan<'a> = Result<(Box<dyn Iter + 'a>, Gather)>;

/// Which accumulator a collection loop feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Collect {
    ForEach,
    Map,
    Filter,
    Every,
    Some,
}

/// Options shared by a family of loops, and the loop operations.
#[derive(Clone)]
pub struct Driver {
    cx: Cx,
    speed: Speed,
    run_async: bool,
    shape: Option<Shape>,
}

impl Driver {
    /// A driver with the context's default speed and mode.
    #[must_use]
    pub fn new(cx: &Cx) -> Self {
        let config = cx.config();
        Self {
            cx: cx.clone(),
            speed: Speed::Named(config.default_speed),
            run_async: config.default_async,
            shape: None,
        }
    }

    /// Sets the speed.
    #[must_use]
    pub fn speed(mut self, speed: impl Into<Speed>) -> Self {
        self.speed = speed.into();
        self
    }

    /// Selects time-sliced (`true`) or synchronous `_async` methods.
    #[must_use]
    pub const fn run_async(mut self, run_async: bool) -> Self {
        self.run_async = run_async;
        self
    }

    /// Forces the loop shape instead of picking it from the collection.
    #[must_use]
    pub const fn shape(mut self, shape: Shape) -> Self {
        self.shape = Some(shape);
        self
    }

    /// Speed `limp`.
    #[must_use]
    pub fn limp(self) -> Self {
        self.speed(SpeedName::Limp)
    }

    /// Speed `doze`.
    #[must_use]
    pub fn doze(self) -> Self {
        self.speed(SpeedName::Doze)
    }

    /// Speed `slow`.
    #[must_use]
    pub fn slow(self) -> Self {
        self.speed(SpeedName::Slow)
    }

    /// Speed `normal`.
    #[must_use]
    pub fn normal(self) -> Self {
        self.speed(SpeedName::Normal)
    }

    /// Speed `fast`.
    #[must_use]
    pub fn fast(self) -> Self {
        self.speed(SpeedName::Fast)
    }

    /// Speed `rapid`.
    #[must_use]
    pub fn rapid(self) -> Self {
        self.speed(SpeedName::Rapid)
    }

    /// Speed `ninja`.
    #[must_use]
    pub fn ninja(self) -> Self {
        self.speed(SpeedName::Ninja)
    }

    /// The context loops run under.
    #[must_use]
    pub const fn cx(&self) -> &Cx {
        &self.cx
    }

    /// The configured speed.
    #[must_use]
    pub const fn current_speed(&self) -> Speed {
        self.speed
    }

    // === Synchronous operations ===

    /// Calls `f` for every element; returns the collection.
    pub fn for_each<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan(Collect::ForEach, collection.into(), Box::new(f)))
    }

    /// Collects `f`'s outputs: a list, or a map for maps.
    pub fn map<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan(Collect::Map, collection.into(), Box::new(f)))
    }

    /// Keeps the elements for which `f` outputs a truthy value.
    pub fn filter<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan(Collect::Filter, collection.into(), Box::new(f)))
    }

    /// Folds the collection with `f(accumulator, item, key)`.
    ///
    /// Without `initial` the first element seeds the accumulator. An empty
    /// collection with no initial value reduces to `Null`.
    pub fn reduce<'a>(
        &self,
        collection: impl Into<Value>,
        initial: Option<Value>,
        f: impl FnMut(Value, Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan_reduce(collection.into(), initial, f))
    }

    /// True when `f` outputs a truthy value for every element.
    pub fn every<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan(Collect::Every, collection.into(), Box::new(f)))
    }

    /// True when `f` outputs a truthy value for some element.
    pub fn some<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(self.plan(Collect::Some, collection.into(), Box::new(f)))
    }

    /// Counted loop over `bound`; returns the last output.
    pub fn repeat<'a>(
        &self,
        bound: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(plan_repeat(&bound.into(), Box::new(f)))
    }

    /// Loops until `f` returns [`Turn::Stop`]; returns the last output.
    pub fn forever<'a>(&self, f: impl FnMut(Value, Value) -> TurnResult + 'a) -> Result<Value> {
        self.run(plan_forever(Box::new(f)))
    }

    /// The `[key, value]` pairs of a list or map.
    pub fn items(&self, collection: impl Into<Value>) -> Result<Value> {
        self.run(plan_items(collection.into(), None))
    }

    /// Collects `f(value, key)` over the pairs of a list or map.
    pub fn items_with<'a>(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(plan_items(collection.into(), Some(Box::new(f))))
    }

    /// Transposes a list of lists, stopping at the shortest.
    pub fn zip(&self, lists: impl Into<Value>) -> Result<Value> {
        self.run(plan_zip(lists.into(), None))
    }

    /// Collects `f(tuple, index)` over the columns of a list of lists.
    pub fn zip_with<'a>(
        &self,
        lists: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(plan_zip(lists.into(), Some(Box::new(f))))
    }

    /// Pulls items from `source` until it stops, passing each through `f`;
    /// returns the last output.
    pub fn iterate<'a>(
        &self,
        source: impl FnMut() -> TurnResult + 'a,
        f: impl FnMut(Value, Value) -> TurnResult + 'a,
    ) -> Result<Value> {
        self.run(plan_iterate(Box::new(source), Box::new(f)))
    }

    /// Drains a caller-supplied iterator, collecting its outputs.
    pub fn drive_iter<'a>(&self, iter: impl Iter + 'a) -> Result<Value> {
        self.run(Ok((Box::new(iter), Gather::Append(Vec::new()))))
    }

    // === Time-sliced operations ===

    /// Runs `f` over `target` as a session.
    ///
    /// The shape is picked from `target` (or the driver's override); the
    /// result is the list of outputs, a map for key loops, and the last
    /// output for counted, endless and generic loops.
    pub fn drive(
        &self,
        target: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Session {
        let target = target.into();
        let plan = self.shape_of(&target).and_then(|shape| {
            let iter = shapes::build(shape, target, Box::new(f))?;
            Ok((iter, Gather::for_shape(shape)))
        });
        self.spawn(plan)
    }

    /// Runs a caller-supplied iterator as a session, collecting its outputs.
    pub fn drive_iter_async(&self, iter: impl Iter + 'static) -> Session {
        self.spawn(Ok((Box::new(iter), Gather::Append(Vec::new()))))
    }

    /// Time-sliced [`for_each`](Self::for_each).
    pub fn for_each_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan(Collect::ForEach, collection.into(), Box::new(f)))
    }

    /// Time-sliced [`map`](Self::map).
    pub fn map_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan(Collect::Map, collection.into(), Box::new(f)))
    }

    /// Time-sliced [`filter`](Self::filter).
    pub fn filter_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan(Collect::Filter, collection.into(), Box::new(f)))
    }

    /// Time-sliced [`reduce`](Self::reduce).
    pub fn reduce_async(
        &self,
        collection: impl Into<Value>,
        initial: Option<Value>,
        f: impl FnMut(Value, Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan_reduce(collection.into(), initial, f))
    }

    /// Time-sliced [`every`](Self::every).
    pub fn every_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan(Collect::Every, collection.into(), Box::new(f)))
    }

    /// Time-sliced [`some`](Self::some).
    pub fn some_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(self.plan(Collect::Some, collection.into(), Box::new(f)))
    }

    /// Time-sliced [`repeat`](Self::repeat).
    pub fn repeat_async(
        &self,
        bound: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(plan_repeat(&bound.into(), Box::new(f)))
    }

    /// Time-sliced [`forever`](Self::forever).
    pub fn forever_async(&self, f: impl FnMut(Value, Value) -> TurnResult + 'static) -> Deferred {
        self.defer(plan_forever(Box::new(f)))
    }

    /// Time-sliced [`items`](Self::items).
    pub fn items_async(&self, collection: impl Into<Value>) -> Deferred {
        self.defer(plan_items(collection.into(), None))
    }

    /// Time-sliced [`items_with`](Self::items_with).
    pub fn items_with_async(
        &self,
        collection: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(plan_items(collection.into(), Some(Box::new(f))))
    }

    /// Time-sliced [`zip`](Self::zip).
    pub fn zip_async(&self, lists: impl Into<Value>) -> Deferred {
        self.defer(plan_zip(lists.into(), None))
    }

    /// Time-sliced [`zip_with`](Self::zip_with).
    pub fn zip_with_async(
        &self,
        lists: impl Into<Value>,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(plan_zip(lists.into(), Some(Box::new(f))))
    }

    /// Time-sliced [`iterate`](Self::iterate).
    pub fn iterate_async(
        &self,
        source: impl FnMut() -> TurnResult + 'static,
        f: impl FnMut(Value, Value) -> TurnResult + 'static,
    ) -> Deferred {
        self.defer(plan_iterate(Box::new(source), Box::new(f)))
    }

    // === Plumbing ===

    fn shape_of(&self, target: &Value) -> Result<Shape> {
        self.shape.map_or_else(|| Shape::auto(target), Ok)
    }

    fn plan<'a>(&self, collect: Collect, target: Value, f: LoopFn<'a>) -> Plan<'a> {
        let shape = self.shape_of(&target)?;
        let gather = match collect {
            Collect::ForEach => Gather::Passthrough(target.clone()),
            Collect::Map => Gather::collect(shape),
            Collect::Filter => Gather::select(shape),
            Collect::Every => Gather::Every(true),
            Collect::Some => Gather::Some(false),
        };
        Ok((shapes::build(shape, target, f)?, gather))
    }

    fn plan_reduce<'a>(
        &self,
        target: Value,
        initial: Option<Value>,
        mut f: impl FnMut(Value, Value, Value) -> TurnResult + 'a,
    ) -> Plan<'a> {
        let shape = self.shape_of(&target)?;
        let acc: FoldCell = Rc::new(RefCell::new(initial));
        let seen = acc.clone();
        let step: LoopFn<'a> = Box::new(move |item, key| {
            let current = seen.borrow().clone();
            match current {
                None => Ok(Turn::Continue(item)),
                Some(acc) => f(acc, item, key),
            }
        });
        Ok((shapes::build(shape, target, step)?, Gather::Fold(acc)))
    }

    fn run<'a>(&self, plan: Plan<'a>) -> Result<Value> {
        let (mut iter, gather) = plan?;
        quick::run_sync(&self.cx, self.speed, &mut iter, gather)
    }

    fn spawn(&self, plan: Plan<'static>) -> Session {
        match plan {
            Err(err) => Session::finished(&self.cx, self.speed, Err(err)),
            Ok((mut iter, gather)) if !self.run_async => {
                let result = quick::run_sync(&self.cx, self.speed, &mut iter, gather);
                Session::finished(&self.cx, self.speed, result)
            }
            Ok((iter, gather)) => LightIterator::new(&self.cx, iter, gather, self.speed, true).start(),
        }
    }

    fn defer(&self, plan: Plan<'static>) -> Deferred {
        self.spawn(plan).deferred().clone()
    }
}

fn plan_repeat<'a>(bound: &Value, f: LoopFn<'a>) -> Plan<'a> {
    Ok((Box::new(Repeat::new(bound, f)?), Gather::Last(Value::Null)))
}

fn plan_forever(f: LoopFn<'_>) -> Plan<'_> {
    Ok((Box::new(Forever::new(f)), Gather::Last(Value::Null)))
}

fn plan_items(target: Value, f: Option<LoopFn<'_>>) -> Plan<'_> {
    Ok((Box::new(PairedItems::new(target, f)?), Gather::Append(Vec::new())))
}

fn plan_zip(lists: Value, f: Option<LoopFn<'_>>) -> Plan<'_> {
    Ok((Box::new(Zip::new(lists, f)?), Gather::Append(Vec::new())))
}

fn plan_iterate<'a>(source: SourceFn<'a>, f: LoopFn<'a>) -> Plan<'a> {
    Ok((Box::new(Generic::new(source, Some(f))), Gather::Last(Value::Null)))
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("speed", &self.speed)
            .field("run_async", &self.run_async)
            .field("shape", &self.shape)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::{Error, ErrorKind};
    use crate::test_utils::{init_test_logging, test_cx};

    fn init_test(name: &str) {
        init_test_logging();
        crate::test_phase!(name);
    }

    fn int(v: &Value) -> i64 {
        v.as_i64().unwrap_or(0)
    }

    #[test]
    fn reduce_sums() {
        init_test("reduce_sums");
        let (cx, _host) = test_cx();
        let sum = Driver::new(&cx)
            .reduce(vec![1, 2, 3, 4, 5], None, |acc, item, _| Ok(Turn::next(int(&acc) + int(&item))))
            .unwrap();
        assert_eq!(sum, Value::Int(15));

        let seeded = Driver::new(&cx)
            .reduce(vec![1, 2], Some(Value::Int(100)), |acc, item, _| {
                Ok(Turn::next(int(&acc) + int(&item)))
            })
            .unwrap();
        assert_eq!(seeded, Value::Int(103));

        let empty = Driver::new(&cx)
            .reduce(Value::List(vec![]), None, |acc, _, _| Ok(Turn::Continue(acc)))
            .unwrap();
        assert_eq!(empty, Value::Null);
    }

    #[test]
    fn every_and_some() {
        init_test("every_and_some");
        let (cx, _host) = test_cx();
        let driver = Driver::new(&cx);
        let big = |item: Value, _: Value| -> TurnResult { Ok(Turn::next(int(&item) >= 10)) };
        assert_eq!(driver.every(vec![12, 54, 18, 130, 44], big).unwrap(), Value::Bool(true));
        assert_eq!(driver.some(vec![2, 5, 8, 1, 4], big).unwrap(), Value::Bool(false));
        assert_eq!(driver.every(Value::List(vec![]), big).unwrap(), Value::Bool(true));
    }

    #[test]
    fn some_short_circuits() {
        init_test("some_short_circuits");
        let (cx, _host) = test_cx();
        let calls = Cell::new(0);
        let found = Driver::new(&cx)
            .some(vec![1, 20, 3, 4], |item, _| {
                calls.set(calls.get() + 1);
                Ok(Turn::next(int(&item) >= 10))
            })
            .unwrap();
        assert_eq!(found, Value::Bool(true));
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn map_over_maps_keeps_keys() {
        init_test("map_over_maps_keeps_keys");
        let (cx, _host) = test_cx();
        let prices = Value::map([("apple", Value::Int(3)), ("pear", Value::Int(5))]);
        let doubled = Driver::new(&cx)
            .map(prices, |item, _| Ok(Turn::next(int(&item) * 2)))
            .unwrap();
        assert_eq!(
            doubled,
            Value::map([("apple", Value::Int(6)), ("pear", Value::Int(10))])
        );
    }

    #[test]
    fn filter_over_maps_keeps_entries() {
        init_test("filter_over_maps_keeps_entries");
        let (cx, _host) = test_cx();
        let stock = Value::map([("a", Value::Int(0)), ("b", Value::Int(2))]);
        let in_stock = Driver::new(&cx)
            .filter(stock, |item, _| Ok(Turn::Continue(item)))
            .unwrap();
        assert_eq!(in_stock, Value::map([("b", Value::Int(2))]));
    }

    #[test]
    fn for_each_returns_the_collection() {
        init_test("for_each_returns_the_collection");
        let (cx, _host) = test_cx();
        let mut seen = Vec::new();
        let out = Driver::new(&cx)
            .for_each(vec!["x", "y"], |item, key| {
                seen.push((key, item));
                Ok(Turn::Continue(Value::Null))
            })
            .unwrap();
        assert_eq!(out, Value::from(vec!["x", "y"]));
        assert_eq!(seen.len(), 2);
    }

    #[test]
    fn stop_keeps_partial_result() {
        init_test("stop_keeps_partial_result");
        let (cx, _host) = test_cx();
        let out = Driver::new(&cx)
            .map(vec![1, 2, 3, 4], |item, _| {
                if int(&item) == 3 {
                    Ok(Turn::Stop)
                } else {
                    Ok(Turn::Continue(item))
                }
            })
            .unwrap();
        assert_eq!(out, Value::from(vec![1, 2]));
    }

    #[test]
    fn scalars_are_not_iterable() {
        init_test("scalars_are_not_iterable");
        let (cx, _host) = test_cx();
        let err = Driver::new(&cx)
            .map(42, |item, _| Ok(Turn::Continue(item)))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotIterable);
    }

    #[test]
    fn zip_and_items() {
        init_test("zip_and_items");
        let (cx, _host) = test_cx();
        let driver = Driver::new(&cx);
        let lists = Value::List(vec![Value::from(vec![1, 2, 3]), Value::from(vec![4, 5, 6])]);
        assert_eq!(
            driver.zip(lists.clone()).unwrap(),
            Value::List(vec![
                Value::from(vec![1, 4]),
                Value::from(vec![2, 5]),
                Value::from(vec![3, 6]),
            ])
        );
        let sums = driver
            .zip_with(lists, |tuple, _| {
                let sum: i64 = tuple.as_list().unwrap_or(&[]).iter().filter_map(Value::as_i64).sum();
                Ok(Turn::next(sum))
            })
            .unwrap();
        assert_eq!(sums, Value::from(vec![5, 7, 9]));

        let pairs = driver.items(Value::map([("k", Value::Int(1))])).unwrap();
        assert_eq!(
            pairs,
            Value::List(vec![Value::List(vec![Value::from("k"), Value::Int(1)])])
        );
    }

    #[test]
    fn repeat_forever_and_iterate() {
        init_test("repeat_forever_and_iterate");
        let (cx, _host) = test_cx();
        let driver = Driver::new(&cx);

        let total = Cell::new(0);
        let last = driver
            .repeat(4, |n, _| {
                total.set(total.get() + int(&n));
                Ok(Turn::Continue(n))
            })
            .unwrap();
        assert_eq!(last, Value::Int(3));
        assert_eq!(total.get(), 6);

        let last = driver
            .forever(|n, _| if int(&n) == 10 { Ok(Turn::Stop) } else { Ok(Turn::Continue(n)) })
            .unwrap();
        assert_eq!(last, Value::Int(9));

        let mut queue = vec![3, 2, 1];
        let last = driver
            .iterate(
                move || Ok(queue.pop().map_or(Turn::Stop, |n| Turn::next(n))),
                |item, _| Ok(Turn::next(int(&item) * 100)),
            )
            .unwrap();
        assert_eq!(last, Value::Int(300));
    }

    #[test]
    fn shape_override_walks_pairs() {
        init_test("shape_override_walks_pairs");
        let (cx, _host) = test_cx();
        let out = Driver::new(&cx)
            .shape(Shape::PairedItems)
            .map(vec!["a", "b"], |item, key| Ok(Turn::next(format!("{key}:{item}"))))
            .unwrap();
        assert_eq!(out, Value::from(vec!["0:\"a\"", "1:\"b\""]));
    }

    #[test]
    fn async_variants_match_sync_results() {
        init_test("async_variants_match_sync_results");
        let (cx, host) = test_cx();
        let driver = Driver::new(&cx).slow();
        let sync = driver.map(vec![1, 2, 3], |i, _| Ok(Turn::next(int(&i) * 3))).unwrap();
        let deferred = driver.map_async(vec![1, 2, 3], |i, _| Ok(Turn::next(int(&i) * 3)));
        assert!(!deferred.is_fired());
        host.run_until_idle();
        assert_eq!(deferred.outcome(), Some(Ok(sync)));
    }

    #[test]
    fn sync_mode_returns_fired_deferreds() {
        init_test("sync_mode_returns_fired_deferreds");
        let (cx, _host) = test_cx();
        let d = Driver::new(&cx)
            .run_async(false)
            .reduce_async(vec![1, 2, 3], None, |acc, item, _| Ok(Turn::next(int(&acc) + int(&item))));
        assert_eq!(d.outcome(), Some(Ok(Value::Int(6))));
    }

    #[test]
    fn setup_errors_fail_the_deferred() {
        init_test("setup_errors_fail_the_deferred");
        let (cx, host) = test_cx();
        let d = Driver::new(&cx).repeat_async(Value::from("nope"), |n, _| Ok(Turn::Continue(n)));
        d.rescue(|err| Ok(crate::Step::replace(err.kind().as_str())));
        host.run_until_idle();
        assert_eq!(
            d.outcome(),
            Some(Ok(Value::from(ErrorKind::InvalidBound.as_str())))
        );
    }

    #[test]
    fn drive_picks_accumulator_from_shape() {
        init_test("drive_picks_accumulator_from_shape");
        let (cx, host) = test_cx();
        let session = Driver::new(&cx).shape(Shape::Repeat).drive(3, |n, _| Ok(Turn::Continue(n)));
        host.run_until_idle();
        assert_eq!(session.outcome(), Some(Ok(Value::Int(2))));
    }

    #[test]
    fn reduce_callback_errors_propagate() {
        init_test("reduce_callback_errors_propagate");
        let (cx, _host) = test_cx();
        let err = Driver::new(&cx)
            .reduce(vec![1, 2, 3], None, |_, _, _| Err(Error::user("no sums today")))
            .unwrap_err();
        assert_eq!(err.message(), Some("no sums today"));
    }
}
