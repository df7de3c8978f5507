//! Speed profiles shared by the Deferred engine and the iteration driver.
//!
//! A speed is either one of seven symbolic names or a raw millisecond value.
//! Each name maps to a [`SpeedProfile`] with two thresholds:
//!
//! - `delay`: how long a Deferred in async mode waits between chain ticks,
//!   and how long chain debris waits before reporting an unhandled failure
//! - `interval_ms`: the slice budget of one iteration burst; `-1` means
//!   "yield after every step"
//!
//! The [`SpeedTable`] is built once (defaults, env, TOML) and then shared
//! immutably through the [`Cx`](crate::Cx).

use core::fmt;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// Symbolic speed names, slowest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub enum SpeedName {
    /// Slowest: one-second chain ticks, yield after every iteration step.
    Limp,
    /// Very slow.
    Doze,
    /// Slow.
    Slow,
    /// The default.
    #[default]
    Normal,
    /// Fast.
    Fast,
    /// Very fast.
    Rapid,
    /// Fastest: zero-delay chain ticks, 60 ms iteration bursts.
    Ninja,
}

impl SpeedName {
    /// Every speed name in table order.
    pub const ALL: [Self; 7] = [
        Self::Limp,
        Self::Doze,
        Self::Slow,
        Self::Normal,
        Self::Fast,
        Self::Rapid,
        Self::Ninja,
    ];

    /// Returns the lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Limp => "limp",
            Self::Doze => "doze",
            Self::Slow => "slow",
            Self::Normal => "normal",
            Self::Fast => "fast",
            Self::Rapid => "rapid",
            Self::Ninja => "ninja",
        }
    }

    const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for SpeedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpeedName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str() == lowered)
            .ok_or_else(|| ConfigError::UnknownSpeed(s.to_string()))
    }
}

/// Numeric thresholds for one speed name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpeedProfile {
    /// Delay between async chain ticks and before a debris report.
    pub delay: Duration,
    /// Iteration slice budget in milliseconds (`-1` yields after every step).
    pub interval_ms: i64,
}

impl SpeedProfile {
    /// Creates a profile from millisecond values.
    #[must_use]
    pub const fn from_millis(delay_ms: u64, interval_ms: i64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            interval_ms,
        }
    }
}

/// Immutable mapping from speed names to profiles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeedTable {
    profiles: [SpeedProfile; 7],
}

impl SpeedTable {
    /// The built-in profile table.
    #[must_use]
    pub const fn standard() -> Self {
        Self {
            profiles: [
                SpeedProfile::from_millis(1000, -1),
                SpeedProfile::from_millis(100, 0),
                SpeedProfile::from_millis(36, 2),
                SpeedProfile::from_millis(18, 5),
                SpeedProfile::from_millis(8, 12),
                SpeedProfile::from_millis(2, 36),
                SpeedProfile::from_millis(0, 60),
            ],
        }
    }

    /// Returns the profile for a name.
    #[must_use]
    pub const fn profile(&self, name: SpeedName) -> SpeedProfile {
        self.profiles[name.index()]
    }

    /// Returns a copy of this table with one profile replaced.
    ///
    /// Used while building configuration; a table handed to a `Cx` is never
    /// mutated.
    #[must_use]
    pub fn with_profile(mut self, name: SpeedName, profile: SpeedProfile) -> Self {
        self.profiles[name.index()] = profile;
        self
    }

    /// Slice budget of the `normal` profile.
    #[must_use]
    pub const fn normal_interval(&self) -> i64 {
        self.profile(SpeedName::Normal).interval_ms
    }

    /// Resolves a speed to a Deferred delay.
    #[must_use]
    pub const fn delay(&self, speed: Speed) -> Duration {
        match speed {
            Speed::Named(name) => self.profile(name).delay,
            Speed::Millis(ms) => Duration::from_millis(ms),
        }
    }

    /// Resolves a speed to an iteration slice budget in milliseconds.
    #[must_use]
    pub fn interval(&self, speed: Speed) -> i64 {
        match speed {
            Speed::Named(name) => self.profile(name).interval_ms,
            Speed::Millis(ms) => i64::try_from(ms).unwrap_or(i64::MAX),
        }
    }
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// A requested speed: symbolic or raw milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Speed {
    /// A named profile from the table.
    Named(SpeedName),
    /// A raw millisecond value used for both delay and slice budget.
    Millis(u64),
}

impl Default for Speed {
    fn default() -> Self {
        Self::Named(SpeedName::Normal)
    }
}

impl From<SpeedName> for Speed {
    fn from(name: SpeedName) -> Self {
        Self::Named(name)
    }
}

impl From<u64> for Speed {
    fn from(ms: u64) -> Self {
        Self::Millis(ms)
    }
}

impl FromStr for Speed {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().parse::<u64>() {
            Ok(ms) => Ok(Self::Millis(ms)),
            Err(_) => s.parse::<SpeedName>().map(Self::Named),
        }
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Named(name) => write!(f, "{name}"),
            Self::Millis(ms) => write!(f, "{ms}ms"),
        }
    }
}
