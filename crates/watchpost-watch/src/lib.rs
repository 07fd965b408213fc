//! watchpost-watch: periodic health checks with failure-driven alerting.
//!
//! A watcher is a check body plus its settings. The [`Scheduler`] runs every
//! registered watcher on its own adaptive cadence, tracks consecutive
//! failures, and mails an operator once a watcher fails more than `retries`
//! times in a row.
//!
//! # Architecture
//!
//! ```text
//! Scheduler
//!   ├── ExecutionContext (current-task slot, routes assert calls)
//!   ├── Mailer (alert + recovery mails)
//!   └── Task per watcher
//!       ├── check body → CheckOutcome
//!       └── AlertState (recent failures, cadence, cooldown)
//! ```
//!
//! # Failure handling
//!
//! Check bodies fail deliberately through [`ExecutionContext::assert`],
//! which records a [`FailureSignal`] and returns [`CheckError::Assertion`].
//! Any other error or panic from a body is folded into the same failure
//! path. While failures are pending the task rechecks at `interval_error`;
//! the first passing check restores `interval` and clears the history.
//!
//! Alert mails are spaced by [`ALERT_COOLDOWN`]; recovery mails always go out.

pub mod alert;
pub mod context;
pub mod error;
pub mod failure;
pub mod location;
pub mod scheduler;
pub mod task;

pub use alert::{AlertState, Notice, TaskStatus, ALERT_COOLDOWN};
pub use context::ExecutionContext;
pub use error::{CheckError, WatchError, WatchResult};
pub use failure::{CheckOutcome, FailureSignal};
pub use location::Location;
pub use scheduler::Scheduler;
pub use task::{CheckFn, Task, TaskId};
