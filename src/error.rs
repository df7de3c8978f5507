//! Error types and error handling strategy for Lightloop.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed; a thrown non-error payload is wrapped,
//!   never discarded
//! - A failed chain step becomes the Deferred's Failure result and is
//!   recoverable by a later `rescue`
//! - Panics inside callbacks are isolated and converted to
//!   [`ErrorKind::Panicked`]
//! - Cancellation is its own kind and is never reported as an unhandled failure
//!
//! # Error Categories
//!
//! - **Step**: anything raised by a chain step or iteration callback
//! - **Cancellation**: a Deferred cancelled before it fired
//! - **Iteration**: a collection or bound the driver cannot walk
//! - **Configuration**: invalid speed names or config values
//! - **Internal**: engine bugs and invalid state transitions

use core::fmt;
use std::sync::Arc;

use crate::types::{CancelReason, Value};

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Steps ===
    /// A chain step or iteration callback failed.
    Step,
    /// User-provided error.
    User,
    /// A callback panicked.
    Panicked,

    // === Cancellation ===
    /// The Deferred was cancelled before it fired.
    Cancelled,
    /// A failure reached the end of a chain with no errback attached.
    Unhandled,

    // === Iteration ===
    /// The value cannot be iterated with the requested shape.
    NotIterable,
    /// A repeat bound is malformed (for example a zero step).
    InvalidBound,

    // === Configuration ===
    /// Unknown speed name or negative delay.
    InvalidSpeed,

    // === Internal / state machine ===
    /// Invalid state transition.
    InvalidStateTransition,
    /// Internal engine error (bug).
    Internal,
}

impl ErrorKind {
    /// Returns the error category for this kind.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Step | Self::User | Self::Panicked => ErrorCategory::Step,
            Self::Cancelled | Self::Unhandled => ErrorCategory::Cancellation,
            Self::NotIterable | Self::InvalidBound => ErrorCategory::Iteration,
            Self::InvalidSpeed => ErrorCategory::Configuration,
            Self::InvalidStateTransition | Self::Internal => ErrorCategory::Internal,
        }
    }

    /// Short lowercase name used in display output.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Step => "step failed",
            Self::User => "user error",
            Self::Panicked => "callback panicked",
            Self::Cancelled => "cancelled",
            Self::Unhandled => "unhandled failure",
            Self::NotIterable => "not iterable",
            Self::InvalidBound => "invalid bound",
            Self::InvalidSpeed => "invalid speed",
            Self::InvalidStateTransition => "invalid state transition",
            Self::Internal => "internal error",
        }
    }
}

/// High-level error category for grouping related errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Failures raised by user callbacks.
    Step,
    /// Cancellation and unhandled-failure reports.
    Cancellation,
    /// Iteration driver input errors.
    Iteration,
    /// Configuration errors.
    Configuration,
    /// Internal engine errors.
    Internal,
}

/// The main error type for Lightloop operations.
///
/// Errors are cheap to clone: a Failure result is handed to every errback in
/// the chain and may also be retained for an unhandled-failure report.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    payload: Option<Box<Value>>,
    source: Option<Arc<dyn std::error::Error + Send + Sync>>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            payload: None,
            source: None,
        }
    }

    /// Creates a user error with a message.
    #[must_use]
    pub fn user(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::User).with_message(msg)
    }

    /// Creates a step error with a message.
    #[must_use]
    pub fn step(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Step).with_message(msg)
    }

    /// Wraps an arbitrary value into an error.
    ///
    /// A `Value::Error` is unwrapped as-is; any other value becomes the
    /// payload of a [`ErrorKind::Step`] error.
    #[must_use]
    pub fn wrap(value: Value) -> Self {
        match value {
            Value::Error(err) => err,
            other => {
                let message = format!("raised {}", other.type_name());
                Self::new(ErrorKind::Step)
                    .with_message(message)
                    .with_payload(other)
            }
        }
    }

    /// Creates a cancellation error from a structured reason.
    #[must_use]
    pub fn cancelled(reason: &CancelReason) -> Self {
        Self::new(ErrorKind::Cancelled).with_message(format!("{reason}"))
    }

    /// Creates an error from a caught panic payload.
    #[must_use]
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_string());
        Self::new(ErrorKind::Panicked).with_message(message)
    }

    /// Creates a not-iterable error for the given value.
    #[must_use]
    pub fn not_iterable(value: &Value) -> Self {
        Self::new(ErrorKind::NotIterable)
            .with_message(format!("cannot iterate over {}", value.type_name()))
    }

    /// Creates an invalid bound error.
    #[must_use]
    pub fn invalid_bound(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidBound).with_message(detail)
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error category.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        self.kind.category()
    }

    /// Returns true if this error represents cancellation.
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.kind, ErrorKind::Cancelled)
    }

    /// Adds a message description to the error.
    #[must_use]
    pub fn with_message(mut self, msg: impl Into<String>) -> Self {
        self.message = Some(msg.into());
        self
    }

    /// Attaches the raised value that produced this error.
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(Box::new(payload));
        self
    }

    /// Adds a source error to the chain.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Arc::new(source));
        self
    }

    /// Returns the error message, if any.
    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns the wrapped payload, if this error was raised from a plain value.
    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_deref()
    }
}

impl PartialEq for Error {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.message == other.message && self.payload == other.payload
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind.as_str())?;
        if let Some(msg) = &self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        let kind = match err {
            ConfigError::UnknownSpeed(_) | ConfigError::NegativeDelay { .. } => {
                ErrorKind::InvalidSpeed
            }
            _ => ErrorKind::Internal,
        };
        Self::new(kind).with_message(err.to_string())
    }
}

/// Errors produced while building an [`EngineConfig`](crate::EngineConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A speed name did not match any profile.
    #[error("unknown speed name {0:?} (expected limp, doze, slow, normal, fast, rapid or ninja)")]
    UnknownSpeed(String),
    /// A delay was configured as a negative number of milliseconds.
    #[error("negative delay for speed {name}: {value} ms")]
    NegativeDelay {
        /// Speed profile name.
        name: String,
        /// Offending value.
        value: i64,
    },
    /// An environment variable held an unparseable value.
    #[error("invalid value for {var}: expected {expected}, got {value:?}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Expected type description.
        expected: &'static str,
        /// The raw value.
        value: String,
    },
    /// The configuration file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// File path.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The configuration file could not be parsed.
    #[error("failed to parse TOML config: {0}")]
    Parse(String),
}

/// A specialized Result type for Lightloop operations.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CancelKind;

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::user("boom");
        assert_eq!(err.to_string(), "user error: boom");
        assert_eq!(err.category(), ErrorCategory::Step);
    }

    #[test]
    fn wrap_keeps_existing_error() {
        let err = Error::user("inner");
        let wrapped = Error::wrap(Value::Error(err.clone()));
        assert_eq!(wrapped, err);
    }

    #[test]
    fn wrap_plain_value_records_payload() {
        let wrapped = Error::wrap(Value::from("oops"));
        assert_eq!(wrapped.kind(), ErrorKind::Step);
        assert_eq!(wrapped.payload(), Some(&Value::from("oops")));
        assert_eq!(wrapped.message(), Some("raised string"));
    }

    #[test]
    fn cancelled_error_is_cancellation() {
        let err = Error::cancelled(&CancelReason::new(CancelKind::User));
        assert!(err.is_cancelled());
        assert_eq!(err.category(), ErrorCategory::Cancellation);
    }

    #[test]
    fn panic_payload_string_is_extracted() {
        let payload: Box<dyn std::any::Any + Send> = Box::new(String::from("bad state"));
        let err = Error::panicked(payload.as_ref());
        assert_eq!(err.kind(), ErrorKind::Panicked);
        assert_eq!(err.message(), Some("bad state"));
    }

    #[test]
    fn config_error_converts_to_invalid_speed() {
        let err: Error = ConfigError::UnknownSpeed("warp".into()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidSpeed);
    }
}
