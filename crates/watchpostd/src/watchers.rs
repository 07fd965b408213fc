//! Watcher file loading and registration.
//!
//! ```toml
//! [[process]]
//! name = "web"
//! hosts = ["web-1", "web-2"]
//! port = [80, 443]
//! grep = "nginx: master"
//! interval = "1m"
//! to = "ops@example.com"
//! ```

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tracing::info;

use watchpost_core::WatchOptions;
use watchpost_remote::{ProcessOptions, RemoteExecutor, watch_process};
use watchpost_watch::{Scheduler, Task, TaskId};

/// Contents of a watcher file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WatcherFile {
    #[serde(default)]
    pub process: Vec<ProcessWatcher>,
}

/// One `[[process]]` table.
#[derive(Debug, Clone, Deserialize)]
pub struct ProcessWatcher {
    pub hosts: Vec<String>,
    #[serde(flatten)]
    pub options: WatchOptions,
    #[serde(flatten)]
    pub checks: ProcessOptions,
}

impl WatcherFile {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read watcher file {}", path.display()))?;
        Self::parse(&content)
            .with_context(|| format!("failed to parse watcher file {}", path.display()))
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Register every watcher, in file order.
    pub fn register(
        &self,
        scheduler: &mut Scheduler,
        executor: Arc<dyn RemoteExecutor>,
    ) -> anyhow::Result<Vec<TaskId>> {
        let mut ids = Vec::with_capacity(self.process.len());
        for (index, watcher) in self.process.iter().enumerate() {
            let id = watch_process(
                scheduler,
                watcher.hosts.clone(),
                watcher.options.clone(),
                &watcher.checks,
                executor.clone(),
            )
            .with_context(|| format!("process watcher #{} is invalid", index + 1))?;
            ids.push(id);
        }
        info!(watchers = ids.len(), "watchers registered");
        Ok(ids)
    }
}

/// Resolved view of a registered watcher, for `watchpostd check`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WatcherSummary {
    pub id: usize,
    pub name: String,
    pub interval_secs: f64,
    pub interval_error_secs: f64,
    pub retries: u32,
    pub from: Option<String>,
    pub to: Vec<String>,
}

impl From<&Task> for WatcherSummary {
    fn from(task: &Task) -> Self {
        let config = task.config();
        Self {
            id: task.id().0,
            name: task.name().to_string(),
            interval_secs: config.interval.as_secs_f64(),
            interval_error_secs: config.interval_error.as_secs_f64(),
            retries: config.retries,
            from: config.recipients.from.clone(),
            to: config.recipients.to.clone(),
        }
    }
}
