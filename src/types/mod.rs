//! Core types for the Lightloop engine.
//!
//! - [`id`]: Identifier and time types (`DeferredId`, `Time`)
//! - [`value`]: The dynamic `Value` carried through chains and loops
//! - [`speed`]: Speed names and the immutable profile table
//! - [`cancel`]: Cancellation reason and kind types

pub mod cancel;
pub mod id;
pub mod speed;
pub mod value;

pub use cancel::{CancelKind, CancelReason};
pub use id::{DeferredId, Time};
pub use speed::{Speed, SpeedName, SpeedProfile, SpeedTable};
pub use value::Value;
