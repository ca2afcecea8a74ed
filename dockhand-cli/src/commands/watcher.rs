//! `dockhand watcher` — live toggle for the downloads watcher.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use dockhand_core::settings;
use dockhand_daemon::{request_watcher, DaemonError};

use super::super::ToggleArg;

/// Arguments for `dockhand watcher`.
#[derive(Args, Debug)]
pub struct WatcherArgs {
    /// Desired watcher state: on | off.
    pub state: ToggleArg,
}

impl WatcherArgs {
    pub fn run(self) -> Result<()> {
        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let enabled: bool = self.state.into();

        match request_watcher(&home, enabled) {
            Ok(snapshot) => {
                let dir = snapshot
                    .get("dir")
                    .and_then(|value| value.as_str())
                    .unwrap_or("?");
                if enabled {
                    println!("✓ watcher on, watching {dir}");
                } else {
                    println!("✓ watcher off");
                }
            }
            Err(DaemonError::DaemonNotRunning { .. }) => {
                // The daemon persists the preference itself when it handles
                // the toggle; without one we save it so the next start obeys.
                settings::update_at(&home, |s| s.watch_downloads = enabled)
                    .context("failed to save settings")?;
                println!("daemon is not running; saved watch_downloads: {}", self.state);
            }
            Err(err) => return Err(err).context("failed to toggle watcher"),
        }

        Ok(())
    }
}
