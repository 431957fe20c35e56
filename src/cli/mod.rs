//! Command-line interface for nota.
//!
//! The transcription service is managed through the `transcribe` command
//! group: `start` (foreground or `--daemon`), `stop` and `status`.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::daemon::{self, PidFile, PidStatus, StopOutcome};
use crate::service::Service;
use crate::{status, vault};

/// nota - personal knowledge vault tooling
#[derive(Parser, Debug)]
#[command(name = "nota")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the audio transcription service
    Transcribe {
        #[command(subcommand)]
        command: TranscribeCommands,
    },
}

/// Transcription service subcommands
#[derive(Subcommand, Debug)]
pub enum TranscribeCommands {
    /// Run the transcription pipeline
    Start {
        /// Detach and run in the background
        #[arg(long)]
        daemon: bool,

        /// Internal: this process is the detached daemon child
        #[arg(long, hide = true)]
        daemon_child: bool,
    },

    /// Stop the background transcription service
    Stop,

    /// Show service liveness and today's stats
    Status,
}

impl Cli {
    /// Execute the parsed command.
    pub async fn execute(self) -> Result<()> {
        match self.command {
            Commands::Transcribe { command } => match command {
                TranscribeCommands::Start {
                    daemon,
                    daemon_child,
                } => {
                    if daemon_child {
                        execute_daemon_child().await
                    } else if daemon {
                        execute_start_daemon()
                    } else {
                        execute_start_foreground().await
                    }
                }
                TranscribeCommands::Stop => execute_stop().await,
                TranscribeCommands::Status => execute_status(),
            },
        }
    }
}

/// Run the service in the current process until interrupted.
async fn execute_start_foreground() -> Result<()> {
    let config = Config::load().context("load config")?;
    let service = Service::new(config).context("create service")?;

    println!("Starting transcription service...");
    println!("Watching: {}", service.config().watch_dir);
    println!("Output:   {}", service.config().output_dir);
    println!("Press Ctrl+C to stop");
    println!();

    Arc::new(service).run().await
}

/// Spawn the detached daemon child and report where it lives.
fn execute_start_daemon() -> Result<()> {
    let vault_root = vault::find_vault_root().context("locate vault")?;

    // Fail on config problems here, before a child is spawned.
    let mut config = Config::load_from_vault(&vault_root).context("load config")?;
    config.apply_defaults();
    config.validate().context("invalid config")?;

    let pid_file = PidFile::default_location()?;
    let log_path = status::today_log_path();

    let pid = daemon::start_daemon(&pid_file, &vault_root, &log_path)?;

    println!("Transcription service started (PID {pid})");
    println!("Log: {}", log_path.display());
    Ok(())
}

/// Entry point of the detached child: record our PID, run the service,
/// clean the PID file up on a clean exit.
async fn execute_daemon_child() -> Result<()> {
    let config = Config::load().context("load config")?;
    let service = Service::new(config).context("create service")?;

    let pid_file = PidFile::default_location()?;
    // Idempotent with the parent's write: same PID, same content.
    pid_file.write(std::process::id())?;

    let result = Arc::new(service).run().await;

    pid_file.remove()?;
    result
}

/// Stop the daemon. Reporting "not running" is a success.
async fn execute_stop() -> Result<()> {
    let pid_file = PidFile::default_location()?;

    match daemon::stop(&pid_file).await? {
        StopOutcome::NotRunning => {
            println!("not running");
        }
        StopOutcome::Stopped { pid, forced } => {
            if forced {
                println!("Process {pid} did not exit gracefully, sent SIGKILL");
            }
            println!("Transcription service stopped");
        }
    }
    Ok(())
}

/// Report liveness and today's pipeline stats.
fn execute_status() -> Result<()> {
    let pid_file = PidFile::default_location()?;

    let pid = match pid_file.status()? {
        PidStatus::NotRunning => {
            println!("not running");
            return Ok(());
        }
        PidStatus::Stale(_) => {
            pid_file.remove()?;
            println!("not running");
            return Ok(());
        }
        PidStatus::Running(pid) => pid,
    };

    println!("Transcription service is running (PID {pid})");

    if let Ok(config) = Config::load() {
        println!("Watching: {}", config.watch_dir);
    }

    let stats = status::parse_today_stats().context("parse today's log")?;
    println!();
    println!("Today:");
    println!("  Completed: {}", stats.files_processed);
    println!("  Errors:    {}", stats.errors);

    if let Some(last) = &stats.last_processed {
        println!();
        println!("Last completed:");
        println!("  Time:   {}", last.timestamp.format("%Y-%m-%dT%H:%M:%SZ"));
        println!("  Source: {}", last.path);
        println!("  Output: {}", last.output);
    }

    Ok(())
}
