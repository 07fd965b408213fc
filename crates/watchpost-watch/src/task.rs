//! A single watcher and its life cycle.
//!
//! A [`Task`] owns the check body, the resolved [`WatcherConfig`], and the
//! [`AlertState`]. Each tick runs the body to completion, folds whatever
//! happened into one [`CheckOutcome`], and mails on alert transitions.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, error, warn};

use watchpost_core::WatcherConfig;
use watchpost_mail::{AlertMail, Mailer};

use crate::alert::{AlertState, Notice, TaskStatus};
use crate::context::{ExecutionContext, Scoped};
use crate::error::CheckError;
use crate::failure::{CheckOutcome, FailureSignal};
use crate::location::Location;

/// Separates failures in an alert mail body.
const MAIL_DELIMITER: &str = "\n=============\n";

/// A user check. Receives the watcher's positional arguments.
pub type CheckFn = Box<dyn FnMut(&[String]) -> anyhow::Result<()> + Send>;

/// Index of a task in its scheduler's registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub usize);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// The live, scheduled instance of one watcher.
pub struct Task {
    id: TaskId,
    name: String,
    config: WatcherConfig,
    /// Where the watcher was declared; used for failures with no better origin.
    declared_at: Location,
    body: CheckFn,
    state: AlertState,
}

impl Task {
    pub fn new(
        id: TaskId,
        name: String,
        config: WatcherConfig,
        declared_at: Location,
        body: CheckFn,
    ) -> Self {
        let state = AlertState::new(name.clone(), &config);
        Self {
            id,
            name,
            config,
            declared_at,
            body,
            state,
        }
    }

    /// Run the check once and update the failure history.
    ///
    /// Never fails: errors and panics from the body are folded into the
    /// returned outcome. The caller re-arms the timer with
    /// [`current_interval`](Self::current_interval).
    pub fn tick(&mut self, context: &ExecutionContext, mailer: &dyn Mailer) -> CheckOutcome {
        let start = Instant::now();
        let args = &self.config.args;
        let body = &mut self.body;

        let Scoped { value, failure } = context.with_task(self.id, &self.name, || {
            panic::catch_unwind(AssertUnwindSafe(|| body(args)))
        });

        let outcome = match (value, failure) {
            // A failed assertion counts even if the body swallowed the error.
            (_, Some(signal)) => CheckOutcome::Failed(signal),
            (Ok(Ok(())), None) => self.check_duration(start.elapsed()),
            (Ok(Err(err)), None) => CheckOutcome::Failed(self.fold_error(err)),
            (Err(panic), None) => CheckOutcome::Failed(self.fold_panic(panic)),
        };

        self.record(&outcome, Instant::now(), mailer);
        outcome
    }

    /// A clean run still fails when it took too long.
    fn check_duration(&self, elapsed: Duration) -> CheckOutcome {
        let limit = self.config.check_timeout();
        if !self.config.check_long_running || elapsed < limit {
            return CheckOutcome::Success;
        }

        let signal = FailureSignal::new(
            Some(format!(
                "Task ran for too long. Invoked every {:?}. Ran for {:?}.",
                self.config.interval, elapsed
            )),
            self.declared_at.clone(),
        );
        warn!(watcher = %self.name, "check failed: {}", signal.log());
        CheckOutcome::Failed(signal)
    }

    fn fold_error(&self, err: anyhow::Error) -> FailureSignal {
        if let Some(CheckError::Assertion(signal)) = err.downcast_ref::<CheckError>() {
            return signal.as_ref().clone();
        }

        error!(watcher = %self.name, error = ?err, "check raised an unexpected error");
        FailureSignal::new(Some(format!("{err:#}")), self.declared_at.clone())
    }

    fn fold_panic(&self, panic: Box<dyn Any + Send>) -> FailureSignal {
        let message = panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "check panicked".to_string());

        error!(watcher = %self.name, panic = %message, "check panicked");
        FailureSignal::new(Some(format!("panic: {message}")), self.declared_at.clone())
    }

    /// Apply an outcome to the alert state and mail on transitions.
    pub fn record(&mut self, outcome: &CheckOutcome, now: Instant, mailer: &dyn Mailer) {
        let notice = match outcome {
            CheckOutcome::Success => {
                debug!(watcher = %self.name, "check passed");
                self.state.record_success(now)
            }
            CheckOutcome::Failed(signal) => self.state.record_failure(signal.clone(), now),
        };

        if let Some(notice) = notice {
            let mail = self.compose(&notice);
            if let Err(e) = mailer.deliver(&mail) {
                warn!(watcher = %self.name, error = %e, "failed to deliver alert mail");
            }
        }
    }

    fn compose(&self, notice: &Notice) -> AlertMail {
        let (subject, body) = match notice {
            Notice::Alert { failures } => {
                let summary = failures
                    .last()
                    .map(FailureSignal::summary)
                    .unwrap_or_default();
                (
                    format!("watchpost: {} failed: {summary}", self.name),
                    render_failures(failures),
                )
            }
            Notice::Recovery { streak } => (
                format!("watchpost: {} recovered", self.name),
                format!(
                    "{} is passing again after {} failed checks.{MAIL_DELIMITER}{}",
                    self.name,
                    streak.len(),
                    render_failures(streak)
                ),
            ),
        };

        AlertMail {
            from: self.config.recipients.from.clone(),
            to: self.config.recipients.to.clone(),
            subject,
            body,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &WatcherConfig {
        &self.config
    }

    pub fn declared_at(&self) -> &Location {
        &self.declared_at
    }

    pub fn status(&self) -> TaskStatus {
        self.state.status()
    }

    pub fn recent_failures(&self) -> &[FailureSignal] {
        self.state.recent_failures()
    }

    pub fn alert_firing(&self) -> bool {
        self.state.alert_firing()
    }

    pub fn current_interval(&self) -> Duration {
        self.state.current_interval()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

fn render_failures(failures: &[FailureSignal]) -> String {
    failures
        .iter()
        .map(FailureSignal::log)
        .collect::<Vec<_>>()
        .join(MAIL_DELIMITER)
}
