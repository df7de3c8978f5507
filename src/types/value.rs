//! Dynamic values carried through Deferred chains and iteration sessions.
//!
//! The engine is value-agnostic: a chain step may turn a number into a list,
//! a list into a Deferred, or a Deferred into an error. [`Value`] is the
//! closed set of shapes the engine understands. Two variants are engine type
//! tags rather than data:
//!
//! - [`Value::Error`]: a failure result; a step that produces one moves the
//!   chain into the Failure state
//! - [`Value::Deferred`]: an inner future; a step or iteration callback that
//!   produces one suspends the outer work until it settles

use core::fmt;
use std::collections::BTreeMap;

use crate::deferred::Deferred;
use crate::error::Error;

/// A dynamically typed engine value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value.
    #[default]
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// String.
    Str(String),
    /// Ordered list.
    List(Vec<Value>),
    /// String-keyed map, iterated in key order.
    Map(BTreeMap<String, Value>),
    /// An error used as a value (Failure results, raised payloads).
    Error(Error),
    /// An inner future.
    Deferred(Deferred),
}

impl Value {
    /// Returns a short name for the variant, used in error messages.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Error(_) => "error",
            Self::Deferred(_) => "deferred",
        }
    }

    /// Truthiness: `null`, `false`, zero, NaN and the empty string are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(b) => *b,
            Self::Int(n) => *n != 0,
            Self::Float(x) => *x != 0.0 && !x.is_nan(),
            Self::Str(s) => !s.is_empty(),
            Self::List(_) | Self::Map(_) | Self::Error(_) | Self::Deferred(_) => true,
        }
    }

    /// Returns true for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for list and string values, which iterate by index.
    #[must_use]
    pub const fn is_array_like(&self) -> bool {
        matches!(self, Self::List(_) | Self::Str(_))
    }

    /// Returns the integer value, converting integral floats.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Float(x) if x.fract() == 0.0 && x.is_finite() => Some(*x as i64),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    /// Returns the numeric value as a float.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(x) => Some(*x),
            _ => None,
        }
    }

    /// Returns the string slice for `Str`.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the list items for `List`.
    #[must_use]
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the map for `Map`.
    #[must_use]
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Returns the error for `Error`.
    #[must_use]
    pub fn as_error(&self) -> Option<&Error> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }

    /// Returns the inner Deferred for `Deferred`.
    #[must_use]
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Self::Deferred(d) => Some(d),
            _ => None,
        }
    }

    /// Converts into an error, wrapping non-error payloads.
    #[must_use]
    pub fn into_error(self) -> Error {
        Error::wrap(self)
    }

    /// Splits an array-like value into its elements.
    ///
    /// Strings yield one single-character string per `char`.
    #[must_use]
    pub fn into_elements(self) -> Option<Vec<Value>> {
        match self {
            Self::List(items) => Some(items),
            Self::Str(s) => Some(s.chars().map(Self::from).collect()),
            _ => None,
        }
    }

    /// Builds a map value from key/value pairs.
    #[must_use]
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Map(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Int(a), Self::Float(b)) | (Self::Float(b), Self::Int(a)) => (*a as f64) == *b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Error(a), Self::Error(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::Map(map) => {
                f.write_str("{")?;
                for (i, (k, v)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                f.write_str("}")
            }
            Self::Error(err) => write!(f, "<{err}>"),
            Self::Deferred(d) => write!(f, "<deferred {}>", d.id()),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Self::Int(i64::try_from(n).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<char> for Value {
    fn from(c: char) -> Self {
        Self::Str(c.to_string())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Str(s)
    }
}

impl From<()> for Value {
    fn from((): ()) -> Self {
        Self::Null
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}

impl From<Error> for Value {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

impl From<Deferred> for Value {
    fn from(d: Deferred) -> Self {
        Self::Deferred(d)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self::List(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truthiness_follows_host_convention() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::from(0).is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Float(f64::NAN).is_truthy());
        assert!(Value::from(-1).is_truthy());
        assert!(Value::List(vec![]).is_truthy());
    }

    #[test]
    fn strings_split_into_chars() {
        let chars = Value::from("abc").into_elements();
        assert_eq!(
            chars,
            Some(vec![Value::from("a"), Value::from("b"), Value::from("c")])
        );
        assert_eq!(Value::from(3).into_elements(), None);
    }

    #[test]
    fn int_and_float_compare_numerically() {
        assert_eq!(Value::Int(2), Value::Float(2.0));
        assert_ne!(Value::Int(2), Value::from("2"));
    }

    #[test]
    fn display_is_compact() {
        let v = Value::from(vec![Value::from(1), Value::from("x"), Value::Null]);
        assert_eq!(v.to_string(), "[1, \"x\", null]");
        let m = Value::map([("k", Value::from(true))]);
        assert_eq!(m.to_string(), "{\"k\": true}");
    }
}
