//! Loop shapes.
//!
//! Every shape owns its callback and produces one [`Entry`] per call to
//! [`Iter::next`]. A callback returning [`Turn::Stop`] ends the loop; an
//! `Err` or a panic ends it with that error.

use std::collections::btree_map;
use std::panic::{catch_unwind, AssertUnwindSafe};

use super::{Entry, Iter, Next, Shape, Turn, TurnResult};
use crate::error::{Error, Result};
use crate::types::Value;

/// A loop callback: `(item, key) -> Turn`.
pub type LoopFn<'a> = Box<dyn FnMut(Value, Value) -> TurnResult + 'a>;

/// A generic loop source: yields items until it returns [`Turn::Stop`].
pub type SourceFn<'a> = Box<dyn FnMut() -> TurnResult + 'a>;

/// Calls a loop callback with panic isolation.
pub(crate) fn call(f: &mut LoopFn<'_>, item: Value, key: Value) -> TurnResult {
    catch_unwind(AssertUnwindSafe(|| f(item, key)))
        .unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())))
}

fn call_source(source: &mut SourceFn<'_>) -> TurnResult {
    catch_unwind(AssertUnwindSafe(|| source()))
        .unwrap_or_else(|payload| Err(Error::panicked(payload.as_ref())))
}

fn step(key: Value, item: Value, turn: Turn) -> Next {
    match turn {
        Turn::Continue(output) => Next::Item(Entry { key, item, output }),
        Turn::Stop => Next::Stop,
    }
}

/// Builds the iterator for `shape` over `target`.
///
/// `Generic` loops have no collection to walk; build them with
/// [`Generic::new`].
pub fn build<'a>(shape: Shape, target: Value, f: LoopFn<'a>) -> Result<Box<dyn Iter + 'a>> {
    Ok(match shape {
        Shape::ArrayLoop => Box::new(ArrayLoop::new(target, f)?),
        Shape::KeyLoop => Box::new(KeyLoop::new(target, f)?),
        Shape::Repeat => Box::new(Repeat::new(&target, f)?),
        Shape::Forever => Box::new(Forever::new(f)),
        Shape::PairedItems => Box::new(PairedItems::new(target, Some(f))?),
        Shape::Zip => Box::new(Zip::new(target, Some(f))?),
        Shape::Generic => {
            return Err(Error::not_iterable(&target)
                .with_message("generic loops are built from a source function"))
        }
    })
}

/// Lists and strings, by index. `Null` is an empty loop.
#[must_use = "loops do nothing unless driven"]
pub struct ArrayLoop<'a> {
    items: std::vec::IntoIter<Value>,
    index: usize,
    f: LoopFn<'a>,
}

impl<'a> ArrayLoop<'a> {
    /// Walks `target`'s elements.
    pub fn new(target: Value, f: LoopFn<'a>) -> Result<Self> {
        let items = match target {
            Value::Null => Vec::new(),
            other => other
                .clone()
                .into_elements()
                .ok_or_else(|| Error::not_iterable(&other))?,
        };
        Ok(Self {
            items: items.into_iter(),
            index: 0,
            f,
        })
    }
}

impl Iter for ArrayLoop<'_> {
    fn next(&mut self) -> Result<Next> {
        let Some(item) = self.items.next() else {
            return Ok(Next::Stop);
        };
        let key = Value::from(self.index);
        self.index += 1;
        let turn = call(&mut self.f, item.clone(), key.clone())?;
        Ok(step(key, item, turn))
    }
}

/// Maps, by key in key order.
#[must_use = "loops do nothing unless driven"]
pub struct KeyLoop<'a> {
    entries: btree_map::IntoIter<String, Value>,
    f: LoopFn<'a>,
}

impl<'a> KeyLoop<'a> {
    /// Walks `target`'s entries.
    pub fn new(target: Value, f: LoopFn<'a>) -> Result<Self> {
        match target {
            Value::Map(map) => Ok(Self {
                entries: map.into_iter(),
                f,
            }),
            other => Err(Error::not_iterable(&other)),
        }
    }
}

impl Iter for KeyLoop<'_> {
    fn next(&mut self) -> Result<Next> {
        let Some((key, item)) = self.entries.next() else {
            return Ok(Next::Stop);
        };
        let key = Value::Str(key);
        let turn = call(&mut self.f, item.clone(), key.clone())?;
        Ok(step(key, item, turn))
    }
}

/// A counted loop.
///
/// The bound is either a count `n` (`0..n`) or a map
/// `{begin, end, step}` with `end` exclusive. `begin` defaults to 0 and
/// `step` to 1 (or -1 when `end < begin`). The callback gets the current
/// number as the item and the iteration count as the key.
#[must_use = "loops do nothing unless driven"]
pub struct Repeat<'a> {
    current: i64,
    end: i64,
    step: i64,
    count: usize,
    f: LoopFn<'a>,
}

impl<'a> Repeat<'a> {
    /// Parses `bound` and builds the loop.
    pub fn new(bound: &Value, f: LoopFn<'a>) -> Result<Self> {
        let (begin, end, step) = parse_bound(bound)?;
        Ok(Self {
            current: begin,
            end,
            step,
            count: 0,
            f,
        })
    }

    fn exhausted(&self) -> bool {
        if self.step > 0 {
            self.current >= self.end
        } else {
            self.current <= self.end
        }
    }
}

fn parse_bound(bound: &Value) -> Result<(i64, i64, i64)> {
    if let Some(n) = bound.as_i64() {
        return Ok((0, n, 1));
    }
    let Value::Map(map) = bound else {
        return Err(Error::invalid_bound(format!(
            "repeat bound must be a count or a {{begin, end, step}} map, got {}",
            bound.type_name()
        )));
    };
    let field = |name: &str| -> Result<Option<i64>> {
        match map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(v) => v
                .as_i64()
                .map(Some)
                .ok_or_else(|| Error::invalid_bound(format!("{name} must be an integer"))),
        }
    };
    let begin = field("begin")?.unwrap_or(0);
    let end = field("end")?.ok_or_else(|| Error::invalid_bound("end is required"))?;
    let step = field("step")?.unwrap_or(if end < begin { -1 } else { 1 });
    if step == 0 {
        return Err(Error::invalid_bound("step must not be zero"));
    }
    Ok((begin, end, step))
}

impl Iter for Repeat<'_> {
    fn next(&mut self) -> Result<Next> {
        if self.exhausted() {
            return Ok(Next::Stop);
        }
        let item = Value::Int(self.current);
        let key = Value::from(self.count);
        self.current = self.current.saturating_add(self.step);
        self.count += 1;
        let turn = call(&mut self.f, item.clone(), key.clone())?;
        Ok(step(key, item, turn))
    }
}

/// Runs until the callback returns [`Turn::Stop`]. Item and key are both
/// the iteration count.
#[must_use = "loops do nothing unless driven"]
pub struct Forever<'a> {
    count: usize,
    f: LoopFn<'a>,
}

impl<'a> Forever<'a> {
    /// Builds the loop.
    pub fn new(f: LoopFn<'a>) -> Self {
        Self { count: 0, f }
    }
}

impl Iter for Forever<'_> {
    fn next(&mut self) -> Result<Next> {
        let count = Value::from(self.count);
        self.count += 1;
        let turn = call(&mut self.f, count.clone(), count.clone())?;
        Ok(step(count.clone(), count, turn))
    }
}

/// Key/value pairs of a list or map.
///
/// Without a callback each output is the pair `[key, value]`.
#[must_use = "loops do nothing unless driven"]
pub struct PairedItems<'a> {
    pairs: std::vec::IntoIter<(Value, Value)>,
    f: Option<LoopFn<'a>>,
}

impl<'a> PairedItems<'a> {
    /// Collects `target`'s pairs.
    pub fn new(target: Value, f: Option<LoopFn<'a>>) -> Result<Self> {
        let pairs: Vec<(Value, Value)> = match target {
            Value::Map(map) => map.into_iter().map(|(k, v)| (Value::Str(k), v)).collect(),
            Value::Null => Vec::new(),
            other => other
                .clone()
                .into_elements()
                .ok_or_else(|| Error::not_iterable(&other))?
                .into_iter()
                .enumerate()
                .map(|(i, v)| (Value::from(i), v))
                .collect(),
        };
        Ok(Self {
            pairs: pairs.into_iter(),
            f,
        })
    }
}

impl Iter for PairedItems<'_> {
    fn next(&mut self) -> Result<Next> {
        let Some((key, item)) = self.pairs.next() else {
            return Ok(Next::Stop);
        };
        let turn = match &mut self.f {
            Some(f) => call(f, item.clone(), key.clone())?,
            None => Turn::Continue(Value::List(vec![key.clone(), item.clone()])),
        };
        Ok(step(key, item, turn))
    }
}

/// Columns of a list of lists, stopping at the shortest.
///
/// The item is the tuple of the `i`-th elements. Without a callback each
/// output is that tuple.
#[must_use = "loops do nothing unless driven"]
pub struct Zip<'a> {
    columns: Vec<std::vec::IntoIter<Value>>,
    index: usize,
    len: usize,
    f: Option<LoopFn<'a>>,
}

impl<'a> Zip<'a> {
    /// Splits `target` into its lists.
    pub fn new(target: Value, f: Option<LoopFn<'a>>) -> Result<Self> {
        let lists = match target {
            Value::List(lists) => lists,
            Value::Null => Vec::new(),
            other => return Err(Error::not_iterable(&other)),
        };
        let columns = lists
            .into_iter()
            .map(|list| list.clone().into_elements().ok_or_else(|| Error::not_iterable(&list)))
            .collect::<Result<Vec<_>>>()?;
        let len = columns.iter().map(Vec::len).min().unwrap_or(0);
        Ok(Self {
            columns: columns.into_iter().map(Vec::into_iter).collect(),
            index: 0,
            len,
            f,
        })
    }
}

impl Iter for Zip<'_> {
    fn next(&mut self) -> Result<Next> {
        if self.index >= self.len {
            return Ok(Next::Stop);
        }
        let tuple: Value = self.columns.iter_mut().filter_map(Iterator::next).collect();
        let key = Value::from(self.index);
        self.index += 1;
        let turn = match &mut self.f {
            Some(f) => call(f, tuple.clone(), key.clone())?,
            None => Turn::Continue(tuple.clone()),
        };
        Ok(step(key, tuple, turn))
    }
}

/// A caller-supplied source.
///
/// The source yields items until it returns [`Turn::Stop`]; each item goes
/// through the callback (or straight to the output without one) with the
/// iteration count as the key.
#[must_use = "loops do nothing unless driven"]
pub struct Generic<'a> {
    source: SourceFn<'a>,
    count: usize,
    f: Option<LoopFn<'a>>,
}

impl<'a> Generic<'a> {
    /// Builds the loop.
    pub fn new(source: SourceFn<'a>, f: Option<LoopFn<'a>>) -> Self {
        Self {
            source,
            count: 0,
            f,
        }
    }
}

impl Iter for Generic<'_> {
    fn next(&mut self) -> Result<Next> {
        let item = match call_source(&mut self.source)? {
            Turn::Continue(item) => item,
            Turn::Stop => return Ok(Next::Stop),
        };
        let key = Value::from(self.count);
        self.count += 1;
        let turn = match &mut self.f {
            Some(f) => call(f, item.clone(), key.clone())?,
            None => Turn::Continue(item.clone()),
        };
        Ok(step(key, item, turn))
    }
}
