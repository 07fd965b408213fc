//! Per-watcher options and their resolution against the config file.

use std::time::Duration;

use serde::Deserialize;

use crate::config::{deserialize_recipients, split_recipients, ConfigError, FileConfig};
use crate::duration;

/// Normal check cadence when neither the watcher nor the config file sets one.
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Consecutive failures tolerated before alerting.
pub const DEFAULT_RETRIES: u32 = 1;

/// The failing cadence defaults to `interval / ERROR_INTERVAL_DIVISOR`.
pub const ERROR_INTERVAL_DIVISOR: u32 = 5;

/// A check running longer than `interval / CHECK_TIMEOUT_DIVISOR` fails.
pub const CHECK_TIMEOUT_DIVISOR: u32 = 5;

/// Explicit options given when a watcher is declared.
///
/// Every field is optional; unset fields fall through to the config file
/// and then to the built-in defaults.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct WatchOptions {
    pub name: Option<String>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub interval: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub interval_error: Option<Duration>,
    pub retries: Option<u32>,
    pub from: Option<String>,
    #[serde(default, deserialize_with = "deserialize_recipients")]
    pub to: Option<Vec<String>>,
    /// Positional arguments handed to the check body on every run.
    #[serde(default)]
    pub args: Vec<String>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    pub fn interval_error(mut self, interval_error: Duration) -> Self {
        self.interval_error = Some(interval_error);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    pub fn mail_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }

    /// Comma separated recipient list.
    pub fn mail_to(mut self, to: &str) -> Self {
        self.to = Some(split_recipients(to));
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Who an alert mail is sent from and to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    pub from: Option<String>,
    pub to: Vec<String>,
}

/// Fully resolved, immutable settings of one watcher.
#[derive(Debug, Clone, PartialEq)]
pub struct WatcherConfig {
    /// Cadence while healthy.
    pub interval: Duration,
    /// Cadence while failures are pending.
    pub interval_error: Duration,
    /// Failures tolerated before the alert fires.
    pub retries: u32,
    pub recipients: Recipients,
    pub args: Vec<String>,
    /// Whether a slow check counts as a failure.
    pub check_long_running: bool,
}

impl WatcherConfig {
    /// Collapse explicit options, the config file and the defaults.
    pub fn resolve(options: &WatchOptions, file: &FileConfig) -> Result<Self, ConfigError> {
        let interval = options
            .interval
            .or(file.interval)
            .unwrap_or(DEFAULT_INTERVAL);
        if interval.is_zero() {
            return Err(ConfigError::Invalid("interval must be greater than zero".into()));
        }

        let interval_error = options
            .interval_error
            .or(file.interval_error)
            .unwrap_or(interval / ERROR_INTERVAL_DIVISOR);
        if interval_error.is_zero() {
            return Err(ConfigError::Invalid(
                "interval_error must be greater than zero".into(),
            ));
        }

        Ok(Self {
            interval,
            interval_error,
            retries: options.retries.or(file.retries).unwrap_or(DEFAULT_RETRIES),
            recipients: Recipients {
                from: options.from.clone().or_else(|| file.from.clone()),
                to: options
                    .to
                    .clone()
                    .or_else(|| file.to.clone())
                    .unwrap_or_default(),
            },
            args: options.args.clone(),
            check_long_running: !file.dont_check_long_processes,
        })
    }

    /// Longest a single check may run before it is flagged as failed.
    pub fn check_timeout(&self) -> Duration {
        self.interval / CHECK_TIMEOUT_DIVISOR
    }
}
