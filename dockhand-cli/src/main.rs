//! Dockhand — install macOS applications from downloaded disk images.
//!
//! # Usage
//!
//! ```text
//! dockhand install <image.dmg> [--cleanup] [--json]
//! dockhand disks list [--json]
//! dockhand disks eject-all
//! dockhand config show [--json]
//! dockhand config set [--cleanup on|off] [--watch on|off] [--downloads-dir <path>] ...
//! dockhand watcher on|off
//! dockhand notices [--clear] [--launch] [--json]
//! dockhand daemon start|stop|status|install|uninstall|logs
//! ```

mod commands;

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    config::ConfigCommand, daemon::DaemonCommand, disks::DisksCommand, install::InstallArgs,
    notices::NoticesArgs, watcher::WatcherArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "dockhand",
    version,
    about = "Install applications from downloaded disk images",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Mount a disk image, install its applications, and optionally clean up.
    Install(InstallArgs),

    /// List disks or eject everything mounted under the volumes root.
    Disks {
        #[command(subcommand)]
        command: DisksCommand,
    },

    /// Show or change persisted preferences.
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Turn the downloads watcher on or off.
    Watcher(WatcherArgs),

    /// List queued install notices from the daemon.
    Notices(NoticesArgs),

    /// Manage the Dockhand background daemon and launchd integration.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Shared on/off argument — parsed from CLI strings, converts to bool
// ---------------------------------------------------------------------------

/// Thin wrapper so clap can parse on/off toggles (also accepts true/false).
#[derive(Debug, Clone, Copy)]
pub struct ToggleArg(pub bool);

impl FromStr for ToggleArg {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(Self(true)),
            "off" | "false" => Ok(Self(false)),
            other => Err(format!("expected 'on' or 'off', got '{other}'")),
        }
    }
}

impl fmt::Display for ToggleArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.0 { "on" } else { "off" })
    }
}

impl From<ToggleArg> for bool {
    fn from(t: ToggleArg) -> Self {
        t.0
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Install(args) => args.run(),
        Commands::Disks { command } => commands::disks::run(command),
        Commands::Config { command } => commands::config::run(command),
        Commands::Watcher(args) => args.run(),
        Commands::Notices(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}
