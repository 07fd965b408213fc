//! Execution context: routes assertions to the task whose check is running.
//!
//! Check bodies hold a clone of the scheduler's [`ExecutionContext`] and call
//! [`ExecutionContext::assert`] without naming a task. While a task runs its
//! check, the context's single slot points at that task; outside of a check
//! the slot is empty and assertions fail with [`CheckError::NoActiveTask`].
//!
//! The slot holds one task at a time. This is sound only because the
//! scheduler never runs two check bodies at once.

use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{error, warn};

use crate::error::CheckError;
use crate::failure::FailureSignal;
use crate::location::Location;
use crate::task::TaskId;

/// The task currently running its check.
#[derive(Debug)]
struct ActiveCheck {
    task: TaskId,
    watcher: String,
    /// First assertion that failed during this run.
    failure: Option<FailureSignal>,
}

/// Handle to the scheduler's current-task slot. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ExecutionContext {
    slot: Arc<Mutex<Option<ActiveCheck>>>,
}

/// Value returned by a scoped run, with the assertion failure it recorded.
#[derive(Debug)]
pub struct Scoped<R> {
    pub value: R,
    pub failure: Option<FailureSignal>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` with `task` as the current task.
    ///
    /// The slot is cleared on every exit path, including a panic unwinding
    /// out of `f`.
    pub fn with_task<R>(&self, task: TaskId, watcher: &str, f: impl FnOnce() -> R) -> Scoped<R> {
        let guard = SlotGuard::enter(self, task, watcher);
        let value = f();
        let failure = guard.finish();
        Scoped { value, failure }
    }

    /// The task currently running its check, if any.
    pub fn current_task(&self) -> Option<TaskId> {
        self.lock().as_ref().map(|active| active.task)
    }

    /// Fail the running check unless `condition` holds.
    ///
    /// The failure is logged and recorded on the running task even if the
    /// returned error is dropped by the check body.
    #[track_caller]
    pub fn assert(&self, condition: bool, message: impl Into<String>) -> Result<(), CheckError> {
        self.assert_at(condition, Some(message.into()), std::panic::Location::caller())
    }

    /// Like [`assert`](Self::assert), reporting only the call site.
    #[track_caller]
    pub fn ensure(&self, condition: bool) -> Result<(), CheckError> {
        self.assert_at(condition, None, std::panic::Location::caller())
    }

    /// Fail the running check unconditionally.
    #[track_caller]
    pub fn fail(&self, message: impl Into<String>) -> Result<(), CheckError> {
        self.assert_at(false, Some(message.into()), std::panic::Location::caller())
    }

    fn assert_at(
        &self,
        condition: bool,
        message: Option<String>,
        caller: &'static std::panic::Location<'static>,
    ) -> Result<(), CheckError> {
        let mut slot = self.lock();
        let Some(active) = slot.as_mut() else {
            return Err(CheckError::NoActiveTask);
        };
        if condition {
            return Ok(());
        }

        let signal = FailureSignal::new(message, Location::from(caller));
        warn!(watcher = %active.watcher, "check failed: {}", signal.log());
        if active.failure.is_none() {
            active.failure = Some(signal.clone());
        }
        Err(CheckError::Assertion(Box::new(signal)))
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveCheck>> {
        // A panicking check body never holds the lock, so poisoning is benign.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Occupies the slot for the duration of one check run.
struct SlotGuard<'a> {
    context: &'a ExecutionContext,
}

impl<'a> SlotGuard<'a> {
    fn enter(context: &'a ExecutionContext, task: TaskId, watcher: &str) -> Self {
        let mut slot = context.lock();
        if let Some(previous) = slot.as_ref() {
            error!(
                running = %previous.watcher,
                entering = %watcher,
                "execution context already occupied, check runs overlap"
            );
        }
        *slot = Some(ActiveCheck {
            task,
            watcher: watcher.to_string(),
            failure: None,
        });
        Self { context }
    }

    fn finish(self) -> Option<FailureSignal> {
        self.context.lock().take().and_then(|active| active.failure)
    }
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        self.context.lock().take();
    }
}
