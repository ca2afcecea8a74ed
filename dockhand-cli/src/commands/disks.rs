//! `dockhand disks` — disk visibility and bulk eject via `diskutil`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use dockhand_core::settings;
use dockhand_install::disks::{eject_all, list_disks, DiskEntry};
use dockhand_install::exec::SystemRunner;

#[derive(Subcommand, Debug)]
pub enum DisksCommand {
    /// List every disk the system reports, with its mounted volumes.
    List(DisksListArgs),

    /// Eject all disks that have a volume mounted under the volumes root.
    EjectAll,
}

/// Arguments for `dockhand disks list`.
#[derive(Args, Debug)]
pub struct DisksListArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

pub fn run(command: DisksCommand) -> Result<()> {
    match command {
        DisksCommand::List(args) => list(args),
        DisksCommand::EjectAll => eject(),
    }
}

#[derive(Tabled)]
struct DiskTableRow {
    #[tabled(rename = "disk")]
    disk: String,
    #[tabled(rename = "content")]
    content: String,
    #[tabled(rename = "mounted volumes")]
    volumes: String,
}

fn list(args: DisksListArgs) -> Result<()> {
    let disks = list_disks(&SystemRunner).context("failed to list disks")?;

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&disks).context("failed to serialize disk list")?
        );
        return Ok(());
    }

    if disks.is_empty() {
        println!("No disks reported.");
        return Ok(());
    }

    let rows: Vec<DiskTableRow> = disks.iter().map(disk_row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn disk_row(disk: &DiskEntry) -> DiskTableRow {
    let mut volumes: Vec<String> = disk
        .mount_point
        .iter()
        .map(|mount| mount.display().to_string())
        .collect();
    volumes.extend(
        disk.apfs_volumes
            .iter()
            .filter_map(|volume| volume.mount_point.as_ref())
            .map(|mount| mount.display().to_string()),
    );

    DiskTableRow {
        disk: disk.title(),
        content: disk.content.clone().unwrap_or_default(),
        volumes: if volumes.is_empty() {
            "-".to_string()
        } else {
            volumes.join(", ")
        },
    }
}

fn eject() -> Result<()> {
    let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
    let settings = settings::load_at(&home).context("failed to load settings")?;
    let volumes_root = settings.volumes_dir();

    let outcomes =
        eject_all(&SystemRunner, &volumes_root).context("failed to eject mounted disks")?;
    if outcomes.is_empty() {
        println!("No disks mounted under {}.", volumes_root.display());
        return Ok(());
    }

    for outcome in &outcomes {
        if outcome.ejected {
            println!("  ✓  ejected {}", outcome.device.green());
        } else {
            println!("  ✗  {} refused to eject", outcome.device.red());
        }
    }
    Ok(())
}
