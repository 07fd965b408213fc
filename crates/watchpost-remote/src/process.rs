//! Process watchers: ports, pid files, process greps, and custom commands.

use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Deserializer};
use tracing::{error, info};

use watchpost_core::WatchOptions;
use watchpost_watch::{CheckError, ExecutionContext, Scheduler, TaskId};

use crate::error::{RemoteError, RemoteResult};
use crate::executor::{HostOutput, RemoteExecutor};

/// Printed by a wrapped command when the checked command fails.
pub const FAILURE_SENTINEL: &str = "BAD";

/// What a process watcher checks on each host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ProcessOptions {
    /// Ports that must be listening.
    #[serde(default, deserialize_with = "one_or_many")]
    pub port: Vec<u16>,
    /// Pid files that must point at a running process.
    #[serde(default, deserialize_with = "one_or_many")]
    pub pid_file: Vec<String>,
    /// Patterns that must match an entry of the process list.
    #[serde(default, deserialize_with = "one_or_many")]
    pub grep: Vec<String>,
    /// Custom commands that must succeed.
    #[serde(default, deserialize_with = "one_or_many")]
    pub command: Vec<String>,
    /// Logged before each `command` runs; `{hosts}` expands to the host list.
    pub check_message: Option<String>,
    /// Failure message for each `command`; `{hosts}` expands to the failing hosts.
    pub error_message: Option<String>,
}

impl ProcessOptions {
    fn validate(&self) -> RemoteResult<()> {
        if self.port.is_empty()
            && self.pid_file.is_empty()
            && self.grep.is_empty()
            && self.command.is_empty()
        {
            return Err(RemoteError::InvalidOptions(
                "must mention at least one of port, pid_file, grep, command".to_string(),
            ));
        }
        Ok(())
    }

    /// Short description used as the default watcher name.
    fn describe(&self) -> String {
        let mut parts = Vec::new();
        parts.extend(self.port.iter().map(|port| format!("port {port}")));
        parts.extend(self.pid_file.iter().map(|file| format!("pid file {file}")));
        parts.extend(self.grep.iter().map(|grep| format!("grep '{grep}'")));
        parts.extend(self.command.iter().map(|command| format!("command '{command}'")));
        parts.join(", ")
    }
}

/// One shell check: the command plus its progress and failure messages.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ShellCheck {
    command: String,
    check_message: String,
    error_message: String,
}

impl ShellCheck {
    fn port(port: u16) -> Self {
        Self {
            command: format!(
                "netstat -na | grep 'LISTEN' | grep '\\(\\:\\|\\.\\){port} ' | grep -v grep"
            ),
            check_message: format!("Checking if port {port} is open on {{hosts}}"),
            error_message: format!("Port {port} seems down on {{hosts}}"),
        }
    }

    fn pid_file(file: &str) -> Self {
        Self {
            command: format!("ps -p `cat {file}`"),
            check_message: format!("Checking if valid pidfile {file} exists in {{hosts}}"),
            error_message: format!("Pidfile {file} doesnt seem valid at {{hosts}}"),
        }
    }

    fn grep(pattern: &str) -> Self {
        Self {
            command: format!("ps aux | grep '{pattern}' | grep -v grep"),
            check_message: format!("Grepping the process list for '{pattern}' in {{hosts}}"),
            error_message: format!("Grepping the process list for '{pattern}' failed at {{hosts}}"),
        }
    }

    fn custom(command: &str, check_message: Option<&str>, error_message: Option<&str>) -> Self {
        Self {
            command: command.to_string(),
            check_message: check_message
                .map(str::to_string)
                .unwrap_or_else(|| format!("Running '{command}' on {{hosts}}")),
            error_message: error_message
                .map(str::to_string)
                .unwrap_or_else(|| format!("'{command}' failed on {{hosts}}")),
        }
    }

    /// The command with the failure sentinel appended.
    fn wrapped(&self) -> String {
        format!("{} || echo {FAILURE_SENTINEL}", self.command)
    }
}

fn expand(template: &str, hosts: &[String]) -> String {
    template.replace("{hosts}", &hosts.join(", "))
}

/// Matches the failure sentinel as a whole word.
fn sentinel() -> Result<Regex, regex::Error> {
    Regex::new(&format!(r"\b{FAILURE_SENTINEL}\b"))
}

/// Hosts whose output carries the failure sentinel.
fn bad_hosts(sentinel: &Regex, outputs: &[HostOutput]) -> Vec<String> {
    outputs
        .iter()
        .filter(|output| output.lines.iter().any(|line| sentinel.is_match(line)))
        .map(|output| output.host.clone())
        .collect()
}

/// The check body of a process watcher.
pub struct ProcessCheck {
    hosts: Vec<String>,
    checks: Vec<ShellCheck>,
    sentinel: Regex,
    executor: Arc<dyn RemoteExecutor>,
    context: ExecutionContext,
}

impl ProcessCheck {
    pub fn new(
        hosts: Vec<String>,
        options: &ProcessOptions,
        executor: Arc<dyn RemoteExecutor>,
        context: ExecutionContext,
    ) -> RemoteResult<Self> {
        if hosts.is_empty() {
            return Err(RemoteError::InvalidOptions("no hosts given".to_string()));
        }
        options.validate()?;

        let mut checks = Vec::new();
        checks.extend(options.port.iter().copied().map(ShellCheck::port));
        checks.extend(options.pid_file.iter().map(|file| ShellCheck::pid_file(file)));
        checks.extend(options.grep.iter().map(|pattern| ShellCheck::grep(pattern)));
        checks.extend(options.command.iter().map(|command| {
            ShellCheck::custom(
                command,
                options.check_message.as_deref(),
                options.error_message.as_deref(),
            )
        }));

        Ok(Self {
            hosts,
            checks,
            sentinel: sentinel()?,
            executor,
            context,
        })
    }

    /// Run every check in order, stopping at the first failing one.
    pub fn run(&self) -> Result<(), CheckError> {
        for check in &self.checks {
            self.run_check(check)?;
        }
        Ok(())
    }

    fn run_check(&self, check: &ShellCheck) -> Result<(), CheckError> {
        info!("{}", expand(&check.check_message, &self.hosts));

        match self.executor.run(&self.hosts, &check.wrapped()) {
            Ok(outputs) => {
                let bad = bad_hosts(&self.sentinel, &outputs);
                if bad.is_empty() {
                    return Ok(());
                }
                self.context.fail(expand(&check.error_message, &bad))
            }
            Err(e) => {
                error!(error = %e, command = %check.command, "remote execution failed");
                self.context.fail(format!(
                    "{} with exception {e}",
                    expand(&check.error_message, &self.hosts)
                ))
            }
        }
    }
}

/// Register a watcher that checks processes on `hosts`.
///
/// Unnamed watchers are named after what they check.
#[track_caller]
pub fn watch_process(
    scheduler: &mut Scheduler,
    hosts: Vec<String>,
    mut options: WatchOptions,
    process: &ProcessOptions,
    executor: Arc<dyn RemoteExecutor>,
) -> RemoteResult<TaskId> {
    if options.name.is_none() {
        options.name = Some(format!("{} on {}", process.describe(), hosts.join(",")));
    }
    let check = ProcessCheck::new(hosts, process, executor, scheduler.context())?;
    let id = scheduler.register(options, move |_| {
        check.run()?;
        Ok(())
    })?;
    Ok(id)
}

/// Accept a single value or a list.
fn one_or_many<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw<T> {
        One(T),
        Many(Vec<T>),
    }

    Ok(match Option::<Raw<T>>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(Raw::One(value)) => vec![value],
        Some(Raw::Many(values)) => values,
    })
}
