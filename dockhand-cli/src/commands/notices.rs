//! `dockhand notices` — read the daemon's queued install notices.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use dockhand_daemon::{request_launch, request_notices, DaemonError, InstallNotice};

/// Arguments for `dockhand notices`.
#[derive(Args, Debug)]
pub struct NoticesArgs {
    /// Drain the queue after reading.
    #[arg(long)]
    pub clear: bool,

    /// Open the first application installed by the newest notice.
    #[arg(long)]
    pub launch: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl NoticesArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;

        let notices = match request_notices(&home, self.clear) {
            Ok(notices) => notices,
            Err(DaemonError::DaemonNotRunning { .. }) => {
                println!("daemon is not running");
                return Ok(());
            }
            Err(err) => return Err(err).context("failed to fetch notices"),
        };

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&notices).context("failed to serialize notices")?
            );
        } else if notices.is_empty() {
            println!("No pending notices.");
        } else {
            for notice in &notices {
                print_notice(notice);
            }
        }

        if self.launch {
            launch_newest(&home, &notices)?;
        }

        Ok(())
    }
}

fn print_notice(notice: &InstallNotice) {
    println!(
        "{} {}",
        notice
            .at
            .format("%Y-%m-%d %H:%M:%S")
            .to_string()
            .bright_black(),
        notice.image.display()
    );
    for app in &notice.installed {
        println!("  ✎  {}", app.display());
    }
    if notice.failed > 0 {
        println!("  ✗  {} bundle(s) failed", notice.failed);
    }
}

fn launch_newest(home: &Path, notices: &[InstallNotice]) -> Result<()> {
    // Newest notice sits at the back of the queue.
    let app = notices
        .iter()
        .rev()
        .find_map(|notice| notice.installed.first())
        .context("no installed application to launch")?;

    request_launch(home, app.clone()).context("failed to launch application")?;
    println!("✓ launched {}", app.display());
    Ok(())
}
