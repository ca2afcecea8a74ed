//! `dockhand install` — run the install pipeline for one disk image.

use std::path::PathBuf;

use anyhow::{ensure, Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use dockhand_core::settings;
use dockhand_install::exec::SystemRunner;
use dockhand_install::{process_image, CleanupOutcome, ImageReport, InstallContext};

/// Arguments for `dockhand install`.
#[derive(Args, Debug)]
pub struct InstallArgs {
    /// Path to the disk image.
    pub image: PathBuf,

    /// Detach and delete the image afterwards, regardless of the saved preference.
    #[arg(long)]
    pub cleanup: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl InstallArgs {
    pub fn run(self) -> Result<()> {
        ensure!(
            self.image.exists(),
            "disk image not found: {}",
            self.image.display()
        );

        let home: PathBuf = dirs::home_dir().context("could not determine home directory")?;
        let settings = settings::load_at(&home).context("failed to load settings")?;

        let mut ctx = InstallContext::from_settings(&settings);
        if self.cleanup {
            ctx.cleanup_after_install = true;
        }

        let report = process_image(&SystemRunner, &ctx, &self.image)
            .with_context(|| format!("install failed for '{}'", self.image.display()))?;

        if self.json {
            print_json(&report)?;
        } else {
            print_report(&report);
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct InstallReportJson {
    image: String,
    volumes: Vec<String>,
    installed: Vec<String>,
    failed: Vec<InstallFailureJson>,
    cleanup: CleanupJson,
}

#[derive(Serialize)]
struct InstallFailureJson {
    bundle: String,
    reason: String,
}

#[derive(Serialize)]
struct CleanupJson {
    enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    detached: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deleted: Option<bool>,
}

fn print_json(report: &ImageReport) -> Result<()> {
    let cleanup = match report.cleanup {
        CleanupOutcome::Disabled => CleanupJson {
            enabled: false,
            detached: None,
            deleted: None,
        },
        CleanupOutcome::Attempted { detached, deleted } => CleanupJson {
            enabled: true,
            detached: Some(detached),
            deleted: Some(deleted),
        },
    };
    let payload = InstallReportJson {
        image: report.image.display().to_string(),
        volumes: report
            .volumes
            .iter()
            .map(|v| v.display().to_string())
            .collect(),
        installed: report
            .installed
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        failed: report
            .failed
            .iter()
            .map(|f| InstallFailureJson {
                bundle: f.bundle.clone(),
                reason: f.reason.clone(),
            })
            .collect(),
        cleanup,
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize install report")?
    );
    Ok(())
}

fn print_report(report: &ImageReport) {
    if report.installed.is_empty() && report.failed.is_empty() {
        println!(
            "✓ '{}' — no application bundles found",
            report.image.display()
        );
    } else {
        println!(
            "✓ '{}' processed ({} installed, {} failed)",
            report.image.display(),
            report.installed.len(),
            report.failed.len()
        );
        for dest in &report.installed {
            println!("  ✎  {}", dest.display());
        }
        for failure in &report.failed {
            println!("  ✗  {} — {}", failure.bundle.red(), failure.reason);
        }
    }

    if let CleanupOutcome::Attempted { detached, deleted } = report.cleanup {
        println!("  cleanup: detached={detached} deleted={deleted}");
    }
}
