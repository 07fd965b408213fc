//! Running shell commands on a set of hosts.

use std::process::{Command, Output};
use std::thread;

use tracing::{debug, info};

use watchpost_core::SshConfig;

use crate::error::{RemoteError, RemoteResult};

/// Hosts that run commands directly instead of over SSH.
const LOCAL_HOSTS: &[&str] = &["localhost", "127.0.0.1", "::1"];

/// Captured output of one command on one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostOutput {
    pub host: String,
    /// Combined stdout and stderr, one entry per line.
    pub lines: Vec<String>,
}

impl HostOutput {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.iter().any(|line| line.contains(needle))
    }
}

/// Executes a shell command on every host, returning outputs in host order.
pub trait RemoteExecutor: Send + Sync {
    fn run(&self, hosts: &[String], command: &str) -> RemoteResult<Vec<HostOutput>>;
}

/// Runs commands through the `ssh` binary, all hosts in parallel.
#[derive(Debug, Clone, Default)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Build the command that runs `command` on `host`.
    pub fn command_for(&self, host: &str, command: &str) -> Command {
        if LOCAL_HOSTS.contains(&host) {
            let mut cmd = Command::new("sh");
            cmd.arg("-c").arg(command);
            return cmd;
        }

        let mut cmd = Command::new("ssh");
        cmd.args(["-o", "BatchMode=yes"]);
        if let Some(timeout) = self.config.connect_timeout {
            cmd.arg("-o")
                .arg(format!("ConnectTimeout={}", timeout.as_secs().max(1)));
        }
        if let Some(port) = self.config.port {
            cmd.arg("-p").arg(port.to_string());
        }
        if let Some(identity) = &self.config.identity_file {
            cmd.arg("-i").arg(identity);
        }
        let target = match &self.config.user {
            Some(user) => format!("{user}@{host}"),
            None => host.to_string(),
        };
        cmd.arg(target).arg(command);
        cmd
    }

    fn run_on(&self, host: &str, command: &str) -> RemoteResult<HostOutput> {
        let output = self
            .command_for(host, command)
            .output()
            .map_err(|source| RemoteError::Spawn {
                host: host.to_string(),
                source,
            })?;
        Ok(HostOutput {
            host: host.to_string(),
            lines: output_lines(&output),
        })
    }
}

impl RemoteExecutor for SshExecutor {
    fn run(&self, hosts: &[String], command: &str) -> RemoteResult<Vec<HostOutput>> {
        info!(hosts = %hosts.join(", "), %command, "executing");

        let results: Vec<RemoteResult<HostOutput>> = thread::scope(|scope| {
            let handles: Vec<_> = hosts
                .iter()
                .map(|host| (host, scope.spawn(move || self.run_on(host, command))))
                .collect();
            handles
                .into_iter()
                .map(|(host, handle)| {
                    handle
                        .join()
                        .unwrap_or_else(|_| Err(RemoteError::Panicked(host.clone())))
                })
                .collect()
        });

        let outputs = results.into_iter().collect::<RemoteResult<Vec<_>>>()?;
        for output in &outputs {
            debug!(host = %output.host, "output:\n{}", output.lines.join("\n"));
        }
        Ok(outputs)
    }
}

fn output_lines(output: &Output) -> Vec<String> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    stdout
        .lines()
        .chain(stderr.lines())
        .map(str::to_string)
        .collect()
}
