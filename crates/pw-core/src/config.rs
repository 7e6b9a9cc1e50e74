//! Configuration structures for pathwatch.
//!
//! - [`WatcherConfig`] - Path watcher settings (error buffering, retry and recheck cadence)
//! - [`LogConfig`] - Logging settings used by the `pathwatch` binary
//! - [`Config`] - Root configuration combining all settings
//!
//! All configuration types implement [`Default`] and deserialize with
//! `#[serde(default)]`, so a configuration file only needs to name the
//! options it overrides.

use std::time::Duration;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Configuration for a single path watcher.
///
/// # Examples
///
/// ```
/// use pw_core::WatcherConfig;
///
/// let config = WatcherConfig::default();
/// assert_eq!(config.error_buffer, 16);
/// assert_eq!(config.degraded_retry_ms, 1000);
/// assert_eq!(config.recheck_ms, 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Number of errors buffered for a consumer that is not reading them.
    ///
    /// Errors beyond this are dropped (and logged) rather than blocking the
    /// watcher's worker.
    pub error_buffer: usize,

    /// How often a watcher with no watchable ancestor retries resolution,
    /// in milliseconds.
    pub degraded_retry_ms: u64,

    /// How often a watcher checks that its subscribed directory is still the
    /// one at the subscribed path, in milliseconds. `0` disables the check.
    ///
    /// Renaming an ancestor above the subscribed directory produces no event
    /// on the subscription; this check is what notices it.
    pub recheck_ms: u64,
}

impl WatcherConfig {
    /// Returns the degraded-state retry interval as a [`Duration`].
    #[inline]
    #[must_use]
    pub const fn degraded_retry(&self) -> Duration {
        Duration::from_millis(self.degraded_retry_ms)
    }

    /// Returns the recheck interval, or `None` when rechecking is disabled.
    #[inline]
    #[must_use]
    pub const fn recheck(&self) -> Option<Duration> {
        match self.recheck_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            error_buffer: 16,
            degraded_retry_ms: 1000,
            recheck_ms: 1000,
        }
    }
}

/// Logging configuration for the `pathwatch` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log at `debug` level instead of `info`.
    pub verbose: bool,

    /// Emit ANSI colors.
    pub color: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            color: true,
        }
    }
}

/// Root configuration for pathwatch.
///
/// # Examples
///
/// ```
/// use pw_core::Config;
///
/// let config = Config::default();
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path watcher configuration.
    pub watch: WatcherConfig,

    /// Logging configuration.
    pub log: LogConfig,
}

impl Config {
    /// Loads and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Parse`] if it is not valid JSON for this structure, and
    /// [`ConfigError::InvalidOption`] if a value fails validation.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every option holds a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOption`] naming the first bad option.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.watch.error_buffer == 0 {
            return Err(ConfigError::InvalidOption {
                option: "watch.error_buffer".to_owned(),
                reason: "must be at least 1".to_owned(),
            });
        }
        if self.watch.degraded_retry_ms == 0 {
            return Err(ConfigError::InvalidOption {
                option: "watch.degraded_retry_ms".to_owned(),
                reason: "must be positive".to_owned(),
            });
        }
        Ok(())
    }
}
