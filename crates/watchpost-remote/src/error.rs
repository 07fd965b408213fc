//! Remote check error types.

use thiserror::Error;

/// Errors from remote command execution and process watcher setup.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("failed to spawn command for {host}: {source}")]
    Spawn {
        host: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command runner for {0} panicked")]
    Panicked(String),

    #[error("invalid process watcher: {0}")]
    InvalidOptions(String),

    #[error("invalid output pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error(transparent)]
    Watch(#[from] watchpost_watch::WatchError),
}

pub type RemoteResult<T> = Result<T, RemoteError>;
