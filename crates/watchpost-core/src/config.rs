//! watchpost.toml configuration parser.
//!
//! The config file carries process-wide defaults for every watcher plus the
//! connection settings of the mail and SSH collaborators. A missing or
//! unreadable file is not an error for the daemon: [`FileConfig::load_or_default`]
//! falls back to the empty config and the built-in defaults apply.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer};
use thiserror::Error;
use tracing::{debug, warn};

use crate::duration;

/// Where the daemon looks for its config file unless told otherwise.
pub const DEFAULT_CONFIG_PATH: &str = "config/watchpost.toml";

/// Errors raised while loading configuration or resolving watcher options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid watcher option: {0}")]
    Invalid(String),
}

/// Process-wide defaults, read once from the config file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub interval: Option<Duration>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub interval_error: Option<Duration>,
    pub retries: Option<u32>,
    pub from: Option<String>,
    #[serde(default, deserialize_with = "deserialize_recipients")]
    pub to: Option<Vec<String>>,
    /// Turns off the "check ran for too long" assertion for every watcher.
    #[serde(default)]
    pub dont_check_long_processes: bool,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub mail: MailConfig,
}

/// Connection parameters for remote process checks.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SshConfig {
    pub user: Option<String>,
    pub port: Option<u16>,
    pub identity_file: Option<PathBuf>,
    #[serde(default, deserialize_with = "duration::deserialize_opt")]
    pub connect_timeout: Option<Duration>,
}

/// Mail transport settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct MailConfig {
    /// Path to a `sendmail -t` compatible binary. Mail is only logged when unset.
    pub sendmail: Option<PathBuf>,
}

impl FileConfig {
    /// Read and parse a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse config file contents.
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Load a config file, recovering to the empty config on any error.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => {
                debug!(path = %path.display(), "config loaded");
                config
            }
            Err(e @ ConfigError::Read { .. }) => {
                debug!(error = %e, "config file unavailable, using defaults");
                Self::default()
            }
            Err(e) => {
                warn!(error = %e, "config file ignored, using defaults");
                Self::default()
            }
        }
    }
}

/// Accept either a list of addresses or a comma separated string.
pub(crate) fn deserialize_recipients<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        List(Vec<String>),
        Joined(String),
    }

    let raw = Option::<Raw>::deserialize(deserializer)?;
    Ok(raw.map(|raw| match raw {
        Raw::List(list) => list
            .into_iter()
            .map(|addr| addr.trim().to_string())
            .filter(|addr| !addr.is_empty())
            .collect(),
        Raw::Joined(joined) => split_recipients(&joined),
    }))
}

pub(crate) fn split_recipients(joined: &str) -> Vec<String> {
    joined
        .split(',')
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .collect()
}
