//! Dispatch pipeline configuration.
//!
//! Values come from, in order of precedence: explicit overrides (the CLI),
//! `MESHLINK_*` environment variables, then the defaults below.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::command::CommandKind;
use crate::queue::QueueFullBehavior;

/// Default values.
pub mod defaults {
    pub const QUEUE_MAX_SIZE: usize = 100;
    pub const RATE_LIMIT_ENABLED: bool = true;
    /// One command every 50 seconds.
    pub const RATE_LIMIT_PER_SECOND: f64 = 0.02;
    pub const RATE_LIMIT_BURST: u32 = 2;
    pub const DEBOUNCE_ENABLED: bool = true;
    pub const DEBOUNCE_WINDOW_SECONDS: f64 = 60.0;
    pub const DEBOUNCE_CACHE_MAX_SIZE: usize = 1000;
}

/// Accepted ranges.
pub mod limits {
    /// Slowest non-zero refill rate: one token per day.
    pub const MIN_RATE_PER_SECOND: f64 = 1.0 / 86_400.0;
    /// Longest debounce window: one day.
    pub const MAX_DEBOUNCE_WINDOW_SECONDS: f64 = 86_400.0;
}

/// Environment variable names.
pub mod env_vars {
    pub const QUEUE_MAX_SIZE: &str = "MESHLINK_QUEUE_MAX_SIZE";
    pub const QUEUE_FULL_BEHAVIOR: &str = "MESHLINK_QUEUE_FULL_BEHAVIOR";
    pub const RATE_LIMIT_ENABLED: &str = "MESHLINK_RATE_LIMIT_ENABLED";
    pub const RATE_LIMIT_PER_SECOND: &str = "MESHLINK_RATE_LIMIT_PER_SECOND";
    pub const RATE_LIMIT_BURST: &str = "MESHLINK_RATE_LIMIT_BURST";
    pub const DEBOUNCE_ENABLED: &str = "MESHLINK_DEBOUNCE_ENABLED";
    pub const DEBOUNCE_WINDOW_SECONDS: &str = "MESHLINK_DEBOUNCE_WINDOW_SECONDS";
    pub const DEBOUNCE_CACHE_MAX_SIZE: &str = "MESHLINK_DEBOUNCE_CACHE_MAX_SIZE";
    pub const DEBOUNCE_COMMANDS: &str = "MESHLINK_DEBOUNCE_COMMANDS";
}

/// Configuration errors.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("queue_max_size must be at least 1")]
    ZeroQueueSize,

    #[error("rate_limit_per_second must not be negative (got {0})")]
    NegativeRate(f64),

    #[error("rate_limit_per_second must be 0 or at least {min} (got {got})", min = limits::MIN_RATE_PER_SECOND)]
    RateTooLow { got: f64 },

    #[error("rate_limit_burst must be at least 1 when rate limiting is enabled")]
    ZeroBurst,

    #[error("debounce_window_seconds must be in (0, {max}] (got {0})", max = limits::MAX_DEBOUNCE_WINDOW_SECONDS)]
    InvalidDebounceWindow(f64),

    #[error("debounce_cache_max_size must be at least 1")]
    ZeroCacheSize,
}

/// Dispatch pipeline settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Queue capacity
    pub queue_max_size: usize,
    /// Overflow policy
    pub queue_full_behavior: QueueFullBehavior,
    /// Whether the token bucket gates dispatch
    pub rate_limit_enabled: bool,
    /// Token refill rate
    pub rate_limit_per_second: f64,
    /// Bucket capacity
    pub rate_limit_burst: u32,
    /// Whether duplicate suppression is active
    pub debounce_enabled: bool,
    /// Duplicate suppression window
    pub debounce_window_seconds: f64,
    /// Maximum number of debounce records
    pub debounce_cache_max_size: usize,
    /// Kinds that participate in debouncing
    pub debounce_eligible_kinds: BTreeSet<CommandKind>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            queue_max_size: defaults::QUEUE_MAX_SIZE,
            queue_full_behavior: QueueFullBehavior::Reject,
            rate_limit_enabled: defaults::RATE_LIMIT_ENABLED,
            rate_limit_per_second: defaults::RATE_LIMIT_PER_SECOND,
            rate_limit_burst: defaults::RATE_LIMIT_BURST,
            debounce_enabled: defaults::DEBOUNCE_ENABLED,
            debounce_window_seconds: defaults::DEBOUNCE_WINDOW_SECONDS,
            debounce_cache_max_size: defaults::DEBOUNCE_CACHE_MAX_SIZE,
            debounce_eligible_kinds: CommandKind::default_debounce_kinds(),
        }
    }
}

impl DispatchConfig {
    /// Load from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load using `lookup` to resolve variable names. Unset or unparsable
    /// values fall back to the defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(v) = parse_var(&lookup, env_vars::QUEUE_MAX_SIZE) {
            config.queue_max_size = v;
        }
        if let Some(raw) = lookup(env_vars::QUEUE_FULL_BEHAVIOR) {
            match raw.parse() {
                Ok(behavior) => config.queue_full_behavior = behavior,
                Err(e) => tracing::warn!(var = env_vars::QUEUE_FULL_BEHAVIOR, "{}", e),
            }
        }
        if let Some(v) = parse_bool_var(&lookup, env_vars::RATE_LIMIT_ENABLED) {
            config.rate_limit_enabled = v;
        }
        if let Some(v) = parse_var(&lookup, env_vars::RATE_LIMIT_PER_SECOND) {
            config.rate_limit_per_second = v;
        }
        if let Some(v) = parse_var(&lookup, env_vars::RATE_LIMIT_BURST) {
            config.rate_limit_burst = v;
        }
        if let Some(v) = parse_bool_var(&lookup, env_vars::DEBOUNCE_ENABLED) {
            config.debounce_enabled = v;
        }
        if let Some(v) = parse_var(&lookup, env_vars::DEBOUNCE_WINDOW_SECONDS) {
            config.debounce_window_seconds = v;
        }
        if let Some(v) = parse_var(&lookup, env_vars::DEBOUNCE_CACHE_MAX_SIZE) {
            config.debounce_cache_max_size = v;
        }
        if let Some(raw) = lookup(env_vars::DEBOUNCE_COMMANDS) {
            config.debounce_eligible_kinds = parse_kind_list(&raw);
        }

        config
    }

    /// Check that the settings describe a usable pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.queue_max_size == 0 {
            return Err(ConfigError::ZeroQueueSize);
        }
        if self.rate_limit_per_second < 0.0 || self.rate_limit_per_second.is_nan() {
            return Err(ConfigError::NegativeRate(self.rate_limit_per_second));
        }
        if self.rate_limit_per_second > 0.0
            && self.rate_limit_per_second < limits::MIN_RATE_PER_SECOND
        {
            return Err(ConfigError::RateTooLow {
                got: self.rate_limit_per_second,
            });
        }
        if self.rate_limit_enabled && self.rate_limit_burst == 0 {
            return Err(ConfigError::ZeroBurst);
        }
        if self.debounce_enabled {
            let window = self.debounce_window_seconds;
            if window <= 0.0 || window.is_nan() || window > limits::MAX_DEBOUNCE_WINDOW_SECONDS {
                return Err(ConfigError::InvalidDebounceWindow(self.debounce_window_seconds));
            }
            if self.debounce_cache_max_size == 0 {
                return Err(ConfigError::ZeroCacheSize);
            }
        }
        Ok(())
    }

    /// Debounce window as a `Duration`. Negative or NaN values map to zero,
    /// values too large for a `Duration` saturate.
    pub fn debounce_window(&self) -> Duration {
        if self.debounce_window_seconds.is_nan() || self.debounce_window_seconds <= 0.0 {
            return Duration::ZERO;
        }
        Duration::try_from_secs_f64(self.debounce_window_seconds).unwrap_or(Duration::MAX)
    }
}

/// Parse a boolean the way the environment spells it.
pub fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a comma-separated list of command kinds. Unknown names are
/// logged and skipped.
pub fn parse_kind_list(raw: &str) -> BTreeSet<CommandKind> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|name| match name.parse::<CommandKind>() {
            Ok(kind) => Some(kind),
            Err(_) => {
                tracing::warn!(kind = name, "Ignoring unknown command kind in debounce list");
                None
            }
        })
        .collect()
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Option<T>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparsable value");
            None
        }
    }
}

fn parse_bool_var<F>(lookup: &F, name: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    let parsed = parse_bool(&raw);
    if parsed.is_none() {
        tracing::warn!(var = name, value = %raw, "Ignoring unparsable boolean");
    }
    parsed
}
