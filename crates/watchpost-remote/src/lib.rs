//! watchpost-remote: process watchers backed by shell commands.
//!
//! A process watcher checks that something is alive on a set of hosts:
//! a listening port, a pid file pointing at a running process, a matching
//! entry in the process list, or an arbitrary command. Every check is a
//! shell command run on each host through a [`RemoteExecutor`]; a host
//! fails when its output carries the `BAD` sentinel.
//!
//! ```text
//! watch_process()
//!   └── Scheduler::register(check body)
//!       └── ProcessCheck::run()
//!           ├── port / pid_file / grep / command → shell command
//!           ├── RemoteExecutor::run(hosts, "CMD || echo BAD")
//!           └── ExecutionContext::assert(no bad hosts)
//! ```

pub mod error;
pub mod executor;
pub mod process;

pub use error::{RemoteError, RemoteResult};
pub use executor::{HostOutput, RemoteExecutor, SshExecutor};
pub use process::{watch_process, ProcessCheck, ProcessOptions, FAILURE_SENTINEL};
