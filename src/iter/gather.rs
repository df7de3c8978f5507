//! Accumulators: how loop outputs become a loop result.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use super::{Entry, Shape};
use crate::types::Value;

/// Shared accumulator of a fold; the reduce callback reads it before each
/// step and the fold records each output into it.
pub type FoldCell = Rc<RefCell<Option<Value>>>;

/// Accumulates loop outputs into the loop result.
#[derive(Debug)]
pub enum Gather {
    /// Ignores outputs; the result is the original collection.
    Passthrough(Value),
    /// Collects outputs into a list.
    Append(Vec<Value>),
    /// Collects outputs into a map under their keys.
    Keyed(BTreeMap<String, Value>),
    /// Keeps the items whose output is truthy, as a list.
    SelectList(Vec<Value>),
    /// Keeps the entries whose output is truthy, as a map.
    SelectMap(BTreeMap<String, Value>),
    /// Each output becomes the accumulator; the result is the last one, or
    /// `Null` if nothing was folded.
    Fold(FoldCell),
    /// True until an output is falsy; stops at the first falsy one.
    Every(bool),
    /// False until an output is truthy; stops at the first truthy one.
    Some(bool),
    /// The last output (`Null` for an empty loop).
    Last(Value),
}

impl Gather {
    /// The accumulator a plain `drive` uses for `shape`.
    #[must_use]
    pub fn for_shape(shape: Shape) -> Self {
        match shape {
            Shape::ArrayLoop | Shape::PairedItems | Shape::Zip => Self::Append(Vec::new()),
            Shape::KeyLoop => Self::Keyed(BTreeMap::new()),
            Shape::Repeat | Shape::Forever | Shape::Generic => Self::Last(Value::Null),
        }
    }

    /// Collecting accumulator for `map` over `shape`.
    #[must_use]
    pub fn collect(shape: Shape) -> Self {
        match shape {
            Shape::KeyLoop => Self::Keyed(BTreeMap::new()),
            _ => Self::Append(Vec::new()),
        }
    }

    /// Selecting accumulator for `filter` over `shape`.
    #[must_use]
    pub fn select(shape: Shape) -> Self {
        match shape {
            Shape::KeyLoop => Self::SelectMap(BTreeMap::new()),
            _ => Self::SelectList(Vec::new()),
        }
    }

    /// Records one entry. Returns false when the loop should stop.
    pub fn record(&mut self, entry: Entry) -> bool {
        match self {
            Self::Passthrough(_) => {}
            Self::Append(items) => items.push(entry.output),
            Self::Keyed(map) => {
                map.insert(key_string(entry.key), entry.output);
            }
            Self::SelectList(items) => {
                if entry.output.is_truthy() {
                    items.push(entry.item);
                }
            }
            Self::SelectMap(map) => {
                if entry.output.is_truthy() {
                    map.insert(key_string(entry.key), entry.item);
                }
            }
            Self::Fold(acc) => {
                *acc.borrow_mut() = Some(entry.output);
            }
            Self::Every(all) => {
                if !entry.output.is_truthy() {
                    *all = false;
                    return false;
                }
            }
            Self::Some(any) => {
                if entry.output.is_truthy() {
                    *any = true;
                    return false;
                }
            }
            Self::Last(last) => *last = entry.output,
        }
        true
    }

    /// The loop result.
    #[must_use]
    pub fn finish(self) -> Value {
        match self {
            Self::Passthrough(collection) => collection,
            Self::Append(items) | Self::SelectList(items) => Value::List(items),
            Self::Keyed(map) | Self::SelectMap(map) => Value::Map(map),
            Self::Fold(acc) => acc.borrow_mut().take().unwrap_or_default(),
            Self::Every(flag) | Self::Some(flag) => Value::Bool(flag),
            Self::Last(last) => last,
        }
    }
}

fn key_string(key: Value) -> String {
    match key {
        Value::Str(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: impl Into<Value>, item: impl Into<Value>, output: impl Into<Value>) -> Entry {
        Entry {
            key: key.into(),
            item: item.into(),
            output: output.into(),
        }
    }

    #[test]
    fn select_keeps_items_not_outputs() {
        let mut g = Gather::select(Shape::ArrayLoop);
        assert!(g.record(entry(0, "a", true)));
        assert!(g.record(entry(1, "b", 0)));
        assert!(g.record(entry(2, "c", "yes")));
        assert_eq!(g.finish(), Value::from(vec!["a", "c"]));
    }

    #[test]
    fn keyed_uses_map_keys() {
        let mut g = Gather::collect(Shape::KeyLoop);
        g.record(entry("x", 1, 10));
        assert_eq!(g.finish(), Value::map([("x", Value::Int(10))]));
    }

    #[test]
    fn every_and_some_short_circuit() {
        let mut every = Gather::Every(true);
        assert!(every.record(entry(0, 1, true)));
        assert!(!every.record(entry(1, 2, false)));
        assert_eq!(every.finish(), Value::Bool(false));

        let mut some = Gather::Some(false);
        assert!(some.record(entry(0, 1, 0)));
        assert!(!some.record(entry(1, 2, 1)));
        assert_eq!(some.finish(), Value::Bool(true));
    }

    #[test]
    fn empty_fold_is_null() {
        let g = Gather::Fold(FoldCell::default());
        assert_eq!(g.finish(), Value::Null);
    }

    #[test]
    fn passthrough_returns_collection() {
        let mut g = Gather::Passthrough(Value::from(vec![1, 2]));
        g.record(entry(0, 1, "ignored"));
        assert_eq!(g.finish(), Value::from(vec![1, 2]));
    }
}
