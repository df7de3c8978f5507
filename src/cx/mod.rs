//! Capability context.
//!
//! The [`Cx`] type is the capability token through which the engine reaches
//! every effect: the host scheduler, the clock, the yield RNG, the frozen
//! configuration and the unhandled-failure sink.
//!
//! All effects in Lightloop flow through an explicit `Cx`. There is no global
//! speed table and no ambient "current host"; a Deferred or iteration session
//! captures the `Cx` it was created with.
//!
//! # Module Contents
//!
//! - [`Cx`]: The capability context token
//! - [`UnhandledFailure`]: A chain debris report

pub mod cx;

pub use cx::{Cx, UnhandledFailure};
