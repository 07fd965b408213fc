//! Watcher error types.

use thiserror::Error;

use crate::failure::FailureSignal;

/// Errors raised from inside a check body.
///
/// `Assertion` is a deliberate, expected check failure. Check bodies
/// propagate it with `?`; the task folds it into its failure history.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("assertion failed: {}", .0.summary())]
    Assertion(Box<FailureSignal>),

    #[error("assert called outside of a running watcher check")]
    NoActiveTask,
}

/// Errors that can occur while registering watchers.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("invalid watcher configuration: {0}")]
    Config(#[from] watchpost_core::ConfigError),
}

pub type WatchResult<T> = Result<T, WatchError>;
