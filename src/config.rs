//! Engine configuration.
//!
//! [`EngineConfig`] is assembled once and then frozen inside a [`Cx`](crate::Cx);
//! nothing in the engine mutates it afterwards.
//!
//! # Configuration Precedence
//!
//! Settings are resolved in this order (highest priority first):
//!
//! 1. **Programmatic**: builder methods (`.seed(7)`) applied last
//! 2. **Environment variables**: `LIGHTLOOP_*` via [`EngineConfig::with_env_overrides`]
//! 3. **Config file**: TOML via [`EngineConfig::from_toml_file`] (requires `config-file`)
//! 4. **Defaults**: [`EngineConfig::new`]
//!
//! ```ignore
//! let config = EngineConfig::from_toml_file("lightloop.toml".as_ref())?
//!     .with_env_overrides()?
//!     .seed(7);
//! ```
//!
//! # Supported Environment Variables
//!
//! | Variable | Type | Maps to |
//! |----------|------|---------|
//! | `LIGHTLOOP_DEFAULT_SPEED` | speed name | `default_speed` |
//! | `LIGHTLOOP_ASYNC` | `bool` | `default_async` |
//! | `LIGHTLOOP_SEED` | `u64` | `seed` |
//! | `LIGHTLOOP_PANIC_ON_UNHANDLED` | `bool` | `panic_on_unhandled` |

use crate::error::ConfigError;
use crate::types::{SpeedName, SpeedTable};

/// Environment variable name for the default speed.
pub const ENV_DEFAULT_SPEED: &str = "LIGHTLOOP_DEFAULT_SPEED";
/// Environment variable name for the default async mode of new Deferreds.
pub const ENV_ASYNC: &str = "LIGHTLOOP_ASYNC";
/// Environment variable name for the yield RNG seed.
pub const ENV_SEED: &str = "LIGHTLOOP_SEED";
/// Environment variable name for panicking on unhandled failures.
pub const ENV_PANIC_ON_UNHANDLED: &str = "LIGHTLOOP_PANIC_ON_UNHANDLED";

/// Default seed for the yield RNG.
pub const DEFAULT_SEED: u64 = 0x5EED_1157;

/// Immutable engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Speed profiles.
    pub speeds: SpeedTable,
    /// Speed of new Deferreds and drivers.
    pub default_speed: SpeedName,
    /// Whether new Deferreds process one link per host tick.
    pub default_async: bool,
    /// Seed for the probabilistic yield decision.
    pub seed: u64,
    /// Panic (after logging) when chain debris reports an unhandled failure.
    pub panic_on_unhandled: bool,
}

impl EngineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            speeds: SpeedTable::standard(),
            default_speed: SpeedName::Normal,
            default_async: true,
            seed: DEFAULT_SEED,
            panic_on_unhandled: false,
        }
    }

    /// Sets the speed table.
    #[must_use]
    pub fn speeds(mut self, speeds: SpeedTable) -> Self {
        self.speeds = speeds;
        self
    }

    /// Sets the default speed.
    #[must_use]
    pub const fn default_speed(mut self, name: SpeedName) -> Self {
        self.default_speed = name;
        self
    }

    /// Sets whether new Deferreds run asynchronously.
    #[must_use]
    pub const fn default_async(mut self, value: bool) -> Self {
        self.default_async = value;
        self
    }

    /// Sets the RNG seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Sets whether unhandled failures panic.
    #[must_use]
    pub const fn panic_on_unhandled(mut self, value: bool) -> Self {
        self.panic_on_unhandled = value;
        self
    }

    /// Applies `LIGHTLOOP_*` environment variables on top of this config.
    pub fn with_env_overrides(mut self) -> Result<Self, ConfigError> {
        apply_env_overrides(&mut self)?;
        Ok(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply environment variable overrides to an [`EngineConfig`].
///
/// Only variables that are set are applied. A set but unparseable variable
/// is an error.
pub fn apply_env_overrides(config: &mut EngineConfig) -> Result<(), ConfigError> {
    if let Some(val) = read_env(ENV_DEFAULT_SPEED) {
        config.default_speed = val.parse()?;
    }
    if let Some(val) = read_env(ENV_ASYNC) {
        config.default_async = parse_bool(ENV_ASYNC, &val)?;
    }
    if let Some(val) = read_env(ENV_SEED) {
        config.seed = parse_u64(ENV_SEED, &val)?;
    }
    if let Some(val) = read_env(ENV_PANIC_ON_UNHANDLED) {
        config.panic_on_unhandled = parse_bool(ENV_PANIC_ON_UNHANDLED, &val)?;
    }
    Ok(())
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok()
}

fn parse_u64(var: &'static str, val: &str) -> Result<u64, ConfigError> {
    val.trim()
        .parse::<u64>()
        .map_err(|_| ConfigError::InvalidEnv {
            var,
            expected: "unsigned integer",
            value: val.to_string(),
        })
}

fn parse_bool(var: &'static str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidEnv {
            var,
            expected: "bool (true/false/1/0/yes/no)",
            value: val.to_string(),
        }),
    }
}

// =========================================================================
// TOML config file support (feature-gated)
// =========================================================================

/// TOML-deserializable engine configuration.
///
/// ```toml
/// [engine]
/// default_speed = "fast"
/// async = true
/// seed = 42
/// panic_on_unhandled = false
///
/// [speeds.normal]
/// delay_ms = 20
/// interval_ms = 6
/// ```
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineTomlConfig {
    /// Engine settings.
    #[serde(default)]
    pub engine: EngineToml,
    /// Per-speed overrides keyed by speed name.
    #[serde(default)]
    pub speeds: std::collections::BTreeMap<String, SpeedToml>,
}

/// `[engine]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct EngineToml {
    /// Default speed name.
    pub default_speed: Option<String>,
    /// Default async mode.
    #[serde(rename = "async")]
    pub default_async: Option<bool>,
    /// RNG seed.
    pub seed: Option<u64>,
    /// Panic on unhandled failures.
    pub panic_on_unhandled: Option<bool>,
}

/// `[speeds.<name>]` section of the TOML config.
#[cfg(feature = "config-file")]
#[derive(serde::Deserialize, Default, Debug)]
pub struct SpeedToml {
    /// Deferred tick delay in milliseconds.
    pub delay_ms: Option<i64>,
    /// Iteration slice budget in milliseconds (`-1` yields every step).
    pub interval_ms: Option<i64>,
}

#[cfg(feature = "config-file")]
impl EngineConfig {
    /// Builds a config from TOML text on top of the defaults.
    pub fn from_toml_str(toml_str: &str) -> Result<Self, ConfigError> {
        let parsed = parse_toml_str(toml_str)?;
        let mut config = Self::new();
        apply_toml_config(&mut config, &parsed)?;
        Ok(config)
    }

    /// Builds a config from a TOML file on top of the defaults.
    pub fn from_toml_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let parsed = parse_toml_file(path)?;
        let mut config = Self::new();
        apply_toml_config(&mut config, &parsed)?;
        Ok(config)
    }
}

/// Apply a parsed TOML config to an [`EngineConfig`].
///
/// Only fields present in the TOML override the config.
#[cfg(feature = "config-file")]
pub fn apply_toml_config(
    config: &mut EngineConfig,
    toml: &EngineTomlConfig,
) -> Result<(), ConfigError> {
    use std::time::Duration;

    if let Some(ref name) = toml.engine.default_speed {
        config.default_speed = name.parse()?;
    }
    if let Some(v) = toml.engine.default_async {
        config.default_async = v;
    }
    if let Some(v) = toml.engine.seed {
        config.seed = v;
    }
    if let Some(v) = toml.engine.panic_on_unhandled {
        config.panic_on_unhandled = v;
    }
    for (raw_name, section) in &toml.speeds {
        let name: SpeedName = raw_name.parse()?;
        let mut profile = config.speeds.profile(name);
        if let Some(delay) = section.delay_ms {
            let millis = u64::try_from(delay).map_err(|_| ConfigError::NegativeDelay {
                name: raw_name.clone(),
                value: delay,
            })?;
            profile.delay = Duration::from_millis(millis);
        }
        if let Some(interval) = section.interval_ms {
            profile.interval_ms = interval;
        }
        config.speeds = config.speeds.clone().with_profile(name, profile);
    }
    Ok(())
}

/// Parse a TOML string into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_str(toml_str: &str) -> Result<EngineTomlConfig, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Read and parse a TOML file into an [`EngineTomlConfig`].
#[cfg(feature = "config-file")]
pub fn parse_toml_file(path: &std::path::Path) -> Result<EngineTomlConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse_toml_str(&content)
}
