//! `dockhand daemon` — background daemon lifecycle and launchd management.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Subcommand};

use dockhand_daemon::paths::{socket_path, stderr_log_path, stdout_log_path};
use dockhand_daemon::{
    install_launchd, request_status, request_stop, start_blocking, uninstall_launchd, DaemonError,
};

#[derive(Subcommand, Debug)]
pub enum DaemonCommand {
    /// Run the daemon in the foreground (watcher + socket server).
    Start,
    /// Request graceful daemon shutdown over the Unix socket.
    Stop,
    /// Query daemon runtime status over the Unix socket.
    Status(DaemonStatusArgs),
    /// Install and bootstrap the launchd agent.
    Install,
    /// Boot out and remove the launchd agent.
    Uninstall,
    /// Print recent daemon log lines.
    Logs(DaemonLogsArgs),
}

/// Arguments for `dockhand daemon status`.
#[derive(Args, Debug)]
pub struct DaemonStatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `dockhand daemon logs`.
#[derive(Args, Debug)]
pub struct DaemonLogsArgs {
    /// Number of trailing lines to show.
    #[arg(long, default_value_t = 100)]
    pub lines: usize,

    /// Show only the stderr log file.
    #[arg(long)]
    pub stderr_only: bool,
}

pub fn run(command: DaemonCommand) -> Result<()> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

    match command {
        DaemonCommand::Start => {
            start_blocking(&home).context("daemon exited with error")?;
        }
        DaemonCommand::Stop => match request_stop(&home) {
            Ok(()) => println!("daemon stop requested"),
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
            }
            Err(err) => return Err(err).context("failed to stop daemon"),
        },
        DaemonCommand::Status(args) => status(&home, args)?,
        DaemonCommand::Install => {
            let path = install_launchd(&home).context("failed to install launchd agent")?;
            println!("installed launchd agent: {}", path.display());
        }
        DaemonCommand::Uninstall => {
            uninstall_launchd(&home).context("failed to uninstall launchd agent")?;
            println!("uninstalled launchd agent");
        }
        DaemonCommand::Logs(args) => {
            if args.stderr_only {
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            } else {
                print_tail(&stdout_log_path(&home), args.lines)
                    .context("failed to read daemon stdout log")?;
                print_tail(&stderr_log_path(&home), args.lines)
                    .context("failed to read daemon stderr log")?;
            }
        }
    }

    Ok(())
}

fn status(home: &Path, args: DaemonStatusArgs) -> Result<()> {
    let payload = match request_status(home) {
        Ok(status) => status,
        Err(DaemonError::DaemonNotRunning { .. }) => serde_json::json!({
            "running": false,
            "socket": socket_path(home).display().to_string(),
        }),
        Err(err) => return Err(err).context("failed to query daemon status"),
    };

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to render daemon status")?
        );
        return Ok(());
    }

    print_status(&payload);
    Ok(())
}

fn print_status(payload: &serde_json::Value) {
    let running = payload
        .get("running")
        .and_then(|value| value.as_bool())
        .unwrap_or(false);
    if !running {
        println!("daemon: not running");
        if let Some(socket) = payload.get("socket").and_then(|value| value.as_str()) {
            println!("  socket:  {socket}");
        }
        return;
    }

    println!("daemon: running");
    if let Some(label) = payload.get("label").and_then(|value| value.as_str()) {
        println!("  label:   {label}");
    }
    if let Some(started) = payload.get("started_at_unix").and_then(|value| value.as_u64()) {
        println!("  started: {}", format_started(started));
    }
    if let Some(watcher) = payload.get("watcher") {
        let enabled = watcher
            .get("enabled")
            .and_then(|value| value.as_bool())
            .unwrap_or(false);
        let dir = watcher
            .get("dir")
            .and_then(|value| value.as_str())
            .unwrap_or("?");
        let seen = watcher
            .get("seen")
            .and_then(|value| value.as_u64())
            .unwrap_or(0);
        println!(
            "  watcher: {} ({dir}, {seen} images seen)",
            if enabled { "on" } else { "off" }
        );
    }
    if let Some(pending) = payload
        .get("pending_notices")
        .and_then(|value| value.as_u64())
    {
        println!("  notices: {pending} pending");
    }
    if let Some(socket) = payload.get("socket").and_then(|value| value.as_str()) {
        println!("  socket:  {socket}");
    }
}

fn format_started(unix_seconds: u64) -> String {
    chrono::DateTime::from_timestamp(unix_seconds as i64, 0)
        .map(|at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| unix_seconds.to_string())
}

fn print_tail(path: &Path, lines: usize) -> Result<()> {
    if !path.exists() {
        println!("log file not found: {}", path.display());
        return Ok(());
    }

    // Rotation keeps the live file at 10 MiB or less; reading it whole is fine.
    let content =
        std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let all: Vec<&str> = content.lines().collect();
    let start = all.len().saturating_sub(lines);

    println!("==> {} <==", path.display());
    for line in &all[start..] {
        println!("{line}");
    }
    Ok(())
}
