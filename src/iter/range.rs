//! Inclusive ranges over integers and characters.

use crate::error::{Error, Result};
use crate::types::Value;

/// Longest list `range` builds.
pub const MAX_RANGE_LEN: u64 = 1 << 24;

/// Builds the inclusive range from `begin` to `end`.
///
/// Both bounds are integers, or both are single-character strings. `step`
/// is a magnitude: the direction comes from the bounds, so
/// `range(5, 1, 2)` is `[5, 3, 1]`. A zero step, or a range longer than
/// [`MAX_RANGE_LEN`], is rejected.
///
/// ```
/// use lightloop::iter::range;
/// use lightloop::Value;
///
/// assert_eq!(range(1, 5, 1).unwrap(), Value::from(vec![1, 2, 3, 4, 5]));
/// assert_eq!(range('a', 'c', 1).unwrap(), Value::from(vec!["a", "b", "c"]));
/// ```
pub fn range(begin: impl Into<Value>, end: impl Into<Value>, step: i64) -> Result<Value> {
    if step == 0 {
        return Err(Error::invalid_bound("range step must not be zero"));
    }
    let (begin, end) = (begin.into(), end.into());
    match (&begin, &end) {
        (Value::Int(a), Value::Int(b)) => Ok(ints(*a, *b, step.unsigned_abs())?.map(Value::Int).collect()),
        (Value::Str(a), Value::Str(b)) => {
            let (a, b) = (single_char(a)?, single_char(b)?);
            Ok(ints(i64::from(u32::from(a)), i64::from(u32::from(b)), step.unsigned_abs())?
                .filter_map(|code| u32::try_from(code).ok().and_then(char::from_u32))
                .map(Value::from)
                .collect())
        }
        _ => Err(Error::invalid_bound(format!(
            "range bounds must both be integers or characters, got {} and {}",
            begin.type_name(),
            end.type_name()
        ))),
    }
}

fn single_char(s: &str) -> Result<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Ok(c),
        _ => Err(Error::invalid_bound(format!("{s:?} is not a single character"))),
    }
}

fn ints(begin: i64, end: i64, step: u64) -> Result<impl Iterator<Item = i64>> {
    let ascending = begin <= end;
    let span = begin.abs_diff(end);
    if span / step >= MAX_RANGE_LEN {
        return Err(Error::invalid_bound(format!(
            "range from {begin} to {end} by {step} exceeds {MAX_RANGE_LEN} elements"
        )));
    }
    Ok((0..=span / step).map(move |i| {
        // i * step <= span, so the offset fits between the bounds.
        let offset = i * step;
        if ascending {
            begin.wrapping_add_unsigned(offset)
        } else {
            begin.wrapping_sub_unsigned(offset)
        }
    }))
}
