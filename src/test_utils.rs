//! Test utilities for Lightloop.
//!
//! Shared helpers for unit tests:
//! - Consistent tracing-based logging initialization
//! - Phase/section macros for readable test output
//! - Lab host and `Cx` constructors
//!
//! # Example
//! ```ignore
//! use lightloop::test_utils::{init_test_logging, test_cx};
//!
//! init_test_logging();
//! let (cx, host) = test_cx();
//! let d = lightloop::Deferred::new(&cx);
//! d.begin(1);
//! host.run_until_idle();
//! assert!(d.is_fired());
//! ```ignore

use std::rc::Rc;
use std::sync::{Mutex, Once};

use tracing_subscriber::fmt::format::FmtSpan;

use crate::config::EngineConfig;
use crate::cx::Cx;
use crate::runtime::LabHost;

static INIT_LOGGING: Once = Once::new();
static ENV_LOCK: Mutex<()> = Mutex::new(());

/// Default seed used by test lab helpers.
pub const DEFAULT_TEST_SEED: u64 = 0xDEAD_BEEF;

/// Initialize test logging with trace-level output.
///
/// Safe to call multiple times; only initializes once.
pub fn init_test_logging() {
    init_test_logging_with_level(tracing::Level::TRACE);
}

/// Initialize test logging with a custom level.
///
/// The first call wins; later calls are no-ops.
pub fn init_test_logging_with_level(level: tracing::Level) {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(level)
            .with_test_writer()
            .with_file(true)
            .with_line_number(true)
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .with_ansi(false)
            .try_init();
    });
}

/// Acquire the global environment lock for tests that mutate env vars.
pub fn env_lock() -> std::sync::MutexGuard<'static, ()> {
    ENV_LOCK
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Test configuration: standard speeds, deterministic seed.
#[must_use]
pub fn test_config() -> EngineConfig {
    EngineConfig::new().seed(DEFAULT_TEST_SEED)
}

/// Create a lab host and a `Cx` bound to it.
#[must_use]
pub fn test_cx() -> (Cx, Rc<LabHost>) {
    test_cx_with(test_config(), LabHost::new())
}

/// Create a `Cx` over a caller-configured lab host.
#[must_use]
pub fn test_cx_with(config: EngineConfig, host: LabHost) -> (Cx, Rc<LabHost>) {
    let host = Rc::new(host);
    let cx = Cx::new(config, host.clone());
    (cx, host)
}

/// Log a test phase transition with a visual separator.
#[macro_export]
macro_rules! test_phase {
    ($name:expr) => {
        tracing::info!(phase = %$name, "========================================");
        tracing::info!(phase = %$name, "TEST PHASE: {}", $name);
        tracing::info!(phase = %$name, "========================================");
    };
}

/// Log a section within a test phase.
#[macro_export]
macro_rules! test_section {
    ($name:expr) => {
        tracing::debug!(section = %$name, "--- {} ---", $name);
    };
}

/// Log test completion with summary.
#[macro_export]
macro_rules! test_complete {
    ($name:expr) => {
        tracing::info!(test = %$name, "test completed successfully: {}", $name);
    };
    ($name:expr, $($key:ident = $value:expr),* $(,)?) => {
        tracing::info!(
            test = %$name,
            $($key = %$value,)*
            "test completed successfully: {}",
            $name
        );
    };
}

/// Log before assertions for context.
#[macro_export]
macro_rules! assert_with_log {
    ($cond:expr, $msg:expr, $expected:expr, $actual:expr) => {
        tracing::debug!(
            expected = ?$expected,
            actual = ?$actual,
            "Asserting: {}",
            $msg
        );
        assert!($cond, "{}: expected {:?}, got {:?}", $msg, $expected, $actual);
    };
}

/// Assert that a Deferred settled successfully with a specific value.
#[macro_export]
macro_rules! assert_settled_ok {
    ($deferred:expr, $expected:expr) => {
        match $deferred.outcome() {
            Some(Ok(v)) => assert_eq!(v, $crate::Value::from($expected)),
            other => panic!("expected Ok({:?}), got {:?}", $expected, other),
        }
    };
}

/// Assert that a Deferred settled with a failure of the given kind.
#[macro_export]
macro_rules! assert_settled_err {
    ($deferred:expr, $kind:expr) => {
        match $deferred.outcome() {
            Some(Err(e)) => assert_eq!(e.kind(), $kind, "unexpected error {e}"),
            other => panic!("expected Err({:?}), got {:?}", $kind, other),
        }
    };
}
