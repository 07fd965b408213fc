//! Scheduler: the task registry and the driver loop.
//!
//! The `Scheduler` owns every registered [`Task`], the shared
//! [`ExecutionContext`], and the mailer. [`Scheduler::run`] drives all tasks
//! from a single loop: it sleeps until the earliest task is due, runs that
//! task's check to completion, re-arms it with the task's current interval,
//! and repeats until shutdown.
//!
//! Checks run synchronously inside the loop, so no two checks ever overlap.
//! The flip side: a check that blocks for a long time (slow remote I/O)
//! delays every other watcher by the same amount.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info};

use watchpost_core::{FileConfig, WatchOptions, WatcherConfig};
use watchpost_mail::Mailer;

use crate::context::ExecutionContext;
use crate::error::WatchResult;
use crate::location::Location;
use crate::task::{Task, TaskId};

/// Owns the watcher registry and drives their checks.
pub struct Scheduler {
    /// Registered tasks, indexed by `TaskId`.
    tasks: Vec<Task>,
    /// The current-task slot shared with check bodies.
    context: ExecutionContext,
    mailer: Arc<dyn Mailer>,
    /// Process-wide defaults applied at registration.
    file_config: FileConfig,
    /// Set once `run` has been entered, or by `disable`.
    started: bool,
}

impl Scheduler {
    /// Create a scheduler with no watchers.
    pub fn new(file_config: FileConfig, mailer: Arc<dyn Mailer>) -> Self {
        Self {
            tasks: Vec::new(),
            context: ExecutionContext::new(),
            mailer,
            file_config,
            started: false,
        }
    }

    /// Handle for calling `assert` from check bodies.
    pub fn context(&self) -> ExecutionContext {
        self.context.clone()
    }

    pub fn file_config(&self) -> &FileConfig {
        &self.file_config
    }

    /// Declare a watcher. Scheduling starts with [`run`](Self::run).
    ///
    /// Options are resolved against the config file once, here. Without an
    /// explicit name the watcher is named after the calling source location.
    #[track_caller]
    pub fn register<F>(&mut self, options: WatchOptions, body: F) -> WatchResult<TaskId>
    where
        F: FnMut(&[String]) -> anyhow::Result<()> + Send + 'static,
    {
        let declared_at = Location::caller();
        self.register_at(options, declared_at, Box::new(body))
    }

    /// Declare a watcher with an explicit declaration site.
    pub fn register_at(
        &mut self,
        options: WatchOptions,
        declared_at: Location,
        body: crate::task::CheckFn,
    ) -> WatchResult<TaskId> {
        let config = WatcherConfig::resolve(&options, &self.file_config)?;
        let id = TaskId(self.tasks.len());
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| declared_at.file_line());

        info!(
            watcher = %name,
            %id,
            interval = ?config.interval,
            interval_error = ?config.interval_error,
            retries = config.retries,
            "watcher registered"
        );
        self.tasks.push(Task::new(id, name, config, declared_at, body));
        Ok(id)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id.0)
    }

    /// Drop every registered watcher.
    pub fn reset(&mut self) {
        debug!(watchers = self.tasks.len(), "registry reset");
        self.tasks.clear();
    }

    /// Mark the scheduler as started (`true`) so that `run` is a no-op, or
    /// clear the flag (`false`) so that the next `run` drives the tasks.
    pub fn disable(&mut self, disabled: bool) {
        self.started = disabled;
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /// Drive all tasks until `shutdown` turns true or its sender is dropped.
    ///
    /// Returns `false` without doing anything if the scheduler was already
    /// started or is disabled. Every task's first check runs one
    /// `current_interval` after the loop starts.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> bool {
        if self.started {
            debug!("scheduler already started or disabled, not running");
            return false;
        }
        self.started = true;

        if *shutdown.borrow_and_update() {
            return true;
        }

        let start = Instant::now();
        let mut due: Vec<Instant> = self
            .tasks
            .iter()
            .map(|task| start + task.current_interval())
            .collect();

        info!(watchers = self.tasks.len(), "scheduler running");

        loop {
            let next = due
                .iter()
                .copied()
                .enumerate()
                .min_by_key(|(_, at)| *at);

            let Some((index, at)) = next else {
                // Nothing to drive; idle until shutdown.
                while shutdown.changed().await.is_ok() && !*shutdown.borrow() {}
                break;
            };

            tokio::select! {
                _ = tokio::time::sleep_until(at) => {
                    let task = &mut self.tasks[index];
                    task.tick(&self.context, self.mailer.as_ref());
                    due[index] = Instant::now() + task.current_interval();
                    debug!(
                        watcher = %task.name(),
                        status = %task.status(),
                        next_in = ?task.current_interval(),
                        "check re-armed"
                    );
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("scheduler stopped");
        true
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("tasks", &self.tasks)
            .field("started", &self.started)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use watchpost_mail::LogMailer;

    use super::*;

    fn scheduler() -> Scheduler {
        Scheduler::new(FileConfig::default(), Arc::new(LogMailer))
    }

    #[test]
    fn register_appends_without_starting() {
        let mut scheduler = scheduler();
        let first = scheduler.register(WatchOptions::new().name("a"), |_| Ok(())).unwrap();
        let second = scheduler.register(WatchOptions::new().name("b"), |_| Ok(())).unwrap();

        assert_eq!(first, TaskId(0));
        assert_eq!(second, TaskId(1));
        assert_eq!(scheduler.tasks().len(), 2);
        assert_eq!(scheduler.task(second).unwrap().name(), "b");
        assert!(!scheduler.is_started());
    }

    #[test]
    fn unnamed_watcher_is_named_after_its_declaration() {
        let mut scheduler = scheduler();
        let expected_line = line!() + 1;
        let id = scheduler.register(WatchOptions::new(), |_| Ok(())).unwrap();

        let task = scheduler.task(id).unwrap();
        assert!(task.name().ends_with(&format!("scheduler.rs:{expected_line}")));
        assert_eq!(task.declared_at().line, Some(expected_line));
    }

    #[test]
    fn registered_task_uses_defaults_without_options() {
        let mut scheduler = scheduler();
        let id = scheduler.register(WatchOptions::new(), |_| Ok(())).unwrap();

        let config = scheduler.task(id).unwrap().config();
        assert_eq!(config.interval, Duration::from_secs(300));
        assert_eq!(config.retries, 1);
    }

    #[test]
    fn invalid_options_are_rejected() {
        let mut scheduler = scheduler();
        let result = scheduler.register(WatchOptions::new().interval(Duration::ZERO), |_| Ok(()));
        assert!(result.is_err());
        assert!(scheduler.tasks().is_empty());
    }

    #[test]
    fn reset_clears_the_registry() {
        let mut scheduler = scheduler();
        scheduler.register(WatchOptions::new(), |_| Ok(())).unwrap();
        scheduler.reset();
        assert!(scheduler.tasks().is_empty());
    }

    #[tokio::test]
    async fn disabled_scheduler_does_not_run() {
        let mut scheduler = scheduler();
        scheduler.disable(true);
        let (_tx, rx) = watch::channel(false);
        assert!(!scheduler.run(rx).await);
    }

    #[tokio::test]
    async fn run_returns_immediately_when_already_shut_down() {
        let mut scheduler = scheduler();
        let (_tx, rx) = watch::channel(true);
        assert!(scheduler.run(rx).await);
        assert!(scheduler.is_started());

        // A second run is a no-op until the flag is cleared.
        let (_tx, rx) = watch::channel(true);
        assert!(!scheduler.run(rx).await);
        scheduler.disable(false);
        let (_tx, rx) = watch::channel(true);
        assert!(scheduler.run(rx).await);
    }

    #[test]
    fn file_config_is_kept_for_collaborators() {
        let file = FileConfig {
            retries: Some(4),
            ..FileConfig::default()
        };
        let scheduler = Scheduler::new(file.clone(), Arc::new(LogMailer));
        assert_eq!(scheduler.file_config(), &file);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_scheduler_ignores_a_false_shutdown_value() {
        let mut scheduler = scheduler();
        let (tx, rx) = watch::channel(false);
        let stop = async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            tx.send(false).unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert!(!tx.is_closed(), "scheduler stopped on a false shutdown value");
            tx.send(true).unwrap();
        };
        let (ran, ()) = tokio::join!(scheduler.run(rx), stop);
        assert!(ran);
    }

    #[tokio::test]
    async fn empty_scheduler_stops_when_sender_is_dropped() {
        let mut scheduler = scheduler();
        let (tx, rx) = watch::channel(false);
        drop(tx);
        assert!(scheduler.run(rx).await);
    }
}
