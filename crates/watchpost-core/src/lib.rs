//! watchpost-core: configuration for watchpost watchers.
//!
//! Watcher settings are layered: explicit per-watcher [`WatchOptions`]
//! win over the process-wide [`FileConfig`], which wins over the built-in
//! defaults. The layers are collapsed into a [`WatcherConfig`] exactly once,
//! when a watcher is registered.
//!
//! ```text
//! WatchOptions ──┐
//! FileConfig ────┼──► WatcherConfig::resolve() ──► WatcherConfig
//! defaults ──────┘
//! ```

pub mod config;
pub mod duration;
pub mod options;

pub use config::{ConfigError, FileConfig, MailConfig, SshConfig, DEFAULT_CONFIG_PATH};
pub use duration::parse_duration;
pub use options::{Recipients, WatchOptions, WatcherConfig};
