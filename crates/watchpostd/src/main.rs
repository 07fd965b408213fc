//! watchpostd: the watchpost daemon.
//!
//! Loads the config file and a watcher file, registers one process watcher
//! per `[[process]]` table, and drives them until Ctrl-C.
//!
//! # Usage
//!
//! ```text
//! watchpostd run --config config/watchpost.toml --watchers config/watchers.toml
//! watchpostd check --watchers config/watchers.toml --format json
//! ```

mod watchers;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{error, info, warn};

use watchpost_core::{DEFAULT_CONFIG_PATH, FileConfig};
use watchpost_mail::{LogMailer, Mailer, SendmailMailer};
use watchpost_remote::SshExecutor;
use watchpost_watch::Scheduler;

use crate::watchers::{WatcherFile, WatcherSummary};

#[derive(Parser)]
#[command(name = "watchpostd", about = "watchpost daemon", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run every watcher until interrupted.
    Run {
        /// Config file with process-wide defaults.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Watcher definitions.
        #[arg(long)]
        watchers: PathBuf,

        /// Log alert mails instead of sending them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a watcher file and list the resolved watchers.
    Check {
        /// Config file with process-wide defaults.
        #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
        config: PathBuf,

        /// Watcher definitions.
        #[arg(long)]
        watchers: PathBuf,

        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,watchpost=debug")),
        )
        // stdout carries `check` output.
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            watchers,
            dry_run,
        } => run(&config, &watchers, dry_run).await,
        Command::Check {
            config,
            watchers,
            format,
        } => check(&config, &watchers, &format),
    }
}

/// The sendmail binary to deliver through, if alerts should really be sent.
fn sendmail_program(config: &FileConfig, dry_run: bool) -> Option<&Path> {
    if dry_run {
        return None;
    }
    config.mail.sendmail.as_deref()
}

/// Pick the alert transport for this run.
fn mailer_for(config: &FileConfig, dry_run: bool) -> Arc<dyn Mailer> {
    match sendmail_program(config, dry_run) {
        Some(program) => {
            info!(sendmail = %program.display(), "mailing alerts through sendmail");
            Arc::new(SendmailMailer::new(program))
        }
        None if dry_run => {
            info!("dry run, alert mails are only logged");
            Arc::new(LogMailer)
        }
        None => {
            warn!("no sendmail configured, alert mails are only logged");
            Arc::new(LogMailer)
        }
    }
}

/// Build a scheduler with every watcher from `watchers` registered.
fn load(file_config: FileConfig, watchers: &Path, mailer: Arc<dyn Mailer>) -> anyhow::Result<Scheduler> {
    let watcher_file = WatcherFile::load(watchers)?;
    let mut scheduler = Scheduler::new(file_config, mailer);
    let executor = Arc::new(SshExecutor::new(scheduler.file_config().ssh.clone()));
    watcher_file.register(&mut scheduler, executor)?;
    Ok(scheduler)
}

async fn run(config: &Path, watchers: &Path, dry_run: bool) -> anyhow::Result<()> {
    info!("watchpost daemon starting");

    let file_config = FileConfig::load_or_default(config);
    let mailer = mailer_for(&file_config, dry_run);
    let mut scheduler = load(file_config, watchers, mailer)?;
    if scheduler.tasks().is_empty() {
        warn!(path = %watchers.display(), "watcher file declares no watchers");
    }

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // Keep the sender alive so the scheduler is not stopped.
                error!(error = %e, "failed to install Ctrl-C handler");
                std::future::pending::<()>().await;
            }
        }
    });

    scheduler.run(shutdown_rx).await;

    info!("watchpost daemon stopped");
    Ok(())
}

fn check(config: &Path, watchers: &Path, format: &str) -> anyhow::Result<()> {
    let scheduler = load(FileConfig::load_or_default(config), watchers, Arc::new(LogMailer))?;
    let summaries: Vec<WatcherSummary> = scheduler.tasks().iter().map(WatcherSummary::from).collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        "text" => {
            for summary in &summaries {
                println!(
                    "{:>3}  {}  every {}s ({}s failing), retries {}, to [{}]",
                    summary.id,
                    summary.name,
                    summary.interval_secs,
                    summary.interval_error_secs,
                    summary.retries,
                    summary.to.join(", ")
                );
            }
            println!("{} watcher(s) OK", summaries.len());
        }
        other => anyhow::bail!("unknown output format '{other}', expected text or json"),
    }
    Ok(())
}
