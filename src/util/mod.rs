//! Internal utilities.
//!
//! Kept dependency-free so yield decisions stay reproducible on the lab host.

pub mod det_rng;

pub use det_rng::DetRng;
