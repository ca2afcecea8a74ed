//! `dockhand config` — show and change persisted preferences.

use std::path::{Path, PathBuf};

use anyhow::{ensure, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;

use dockhand_core::{settings, Settings};

use super::super::ToggleArg;

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Print the effective settings, overrides resolved.
    Show(ConfigShowArgs),

    /// Change one or more settings.
    Set(ConfigSetArgs),
}

/// Arguments for `dockhand config show`.
#[derive(Args, Debug)]
pub struct ConfigShowArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

/// Arguments for `dockhand config set`.
#[derive(Args, Debug)]
pub struct ConfigSetArgs {
    /// Detach the volume and delete the image after installing: on | off.
    #[arg(long, value_name = "on|off")]
    pub cleanup: Option<ToggleArg>,

    /// Watch the downloads directory for new disk images: on | off.
    #[arg(long, value_name = "on|off")]
    pub watch: Option<ToggleArg>,

    /// Override the watched downloads directory.
    #[arg(long, value_name = "PATH")]
    pub downloads_dir: Option<PathBuf>,

    /// Override the install destination directory.
    #[arg(long, value_name = "PATH")]
    pub install_dir: Option<PathBuf>,

    /// Override the mounted-volumes root.
    #[arg(long, value_name = "PATH")]
    pub volumes_root: Option<PathBuf>,
}

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show(args) => show(args),
        ConfigCommand::Set(args) => set(args),
    }
}

#[derive(Serialize)]
struct SettingsJson {
    cleanup_after_install: bool,
    watch_downloads: bool,
    downloads_dir: Option<String>,
    install_dir: String,
    volumes_root: String,
}

fn show(args: ConfigShowArgs) -> Result<()> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let settings = settings::load_at(&home).context("failed to load settings")?;

    if args.json {
        let payload = SettingsJson {
            cleanup_after_install: settings.cleanup_after_install,
            watch_downloads: settings.watch_downloads,
            downloads_dir: settings.watched_dir().map(|p| p.display().to_string()),
            install_dir: settings.applications_dir().display().to_string(),
            volumes_root: settings.volumes_dir().display().to_string(),
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to serialize settings")?
        );
        return Ok(());
    }

    print_settings(&settings);
    Ok(())
}

fn print_settings(settings: &Settings) {
    println!(
        "cleanup_after_install: {}",
        on_off(settings.cleanup_after_install)
    );
    println!("watch_downloads:       {}", on_off(settings.watch_downloads));
    println!(
        "downloads_dir:         {}",
        display_or(settings.watched_dir().as_deref(), "(unresolvable)")
    );
    println!(
        "install_dir:           {}",
        settings.applications_dir().display()
    );
    println!(
        "volumes_root:          {}",
        settings.volumes_dir().display()
    );
}

fn set(args: ConfigSetArgs) -> Result<()> {
    ensure!(
        args.cleanup.is_some()
            || args.watch.is_some()
            || args.downloads_dir.is_some()
            || args.install_dir.is_some()
            || args.volumes_root.is_some(),
        "nothing to change; pass at least one of --cleanup, --watch, \
         --downloads-dir, --install-dir, --volumes-root"
    );

    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let updated = settings::update_at(&home, |s| {
        if let Some(cleanup) = args.cleanup {
            s.cleanup_after_install = cleanup.into();
        }
        if let Some(watch) = args.watch {
            s.watch_downloads = watch.into();
        }
        if let Some(dir) = args.downloads_dir {
            s.downloads_dir = Some(dir);
        }
        if let Some(dir) = args.install_dir {
            s.install_dir = Some(dir);
        }
        if let Some(dir) = args.volumes_root {
            s.volumes_root = Some(dir);
        }
    })
    .context("failed to save settings")?;

    println!("✓ settings saved");
    print_settings(&updated);
    Ok(())
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

fn display_or(path: Option<&Path>, fallback: &str) -> String {
    path.map(|p| p.display().to_string())
        .unwrap_or_else(|| fallback.to_string())
}
