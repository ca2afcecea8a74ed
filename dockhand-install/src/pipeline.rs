//! Shared install pipeline entrypoint used by CLI and daemon.
//!
//! Stage order for one image: attach → scan → copy → cleanup. Only a failed
//! attach ends the run with an error; every later stage records what
//! happened in the report and keeps going.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use dockhand_core::Settings;

use crate::copy::{self, CopyOutcome};
use crate::error::InstallError;
use crate::exec::CommandRunner;
use crate::mount;
use crate::scan;

/// Everything the pipeline needs besides the image path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallContext {
    /// Root under which mounted volumes appear.
    pub volumes_root: PathBuf,
    /// Directory application bundles are copied into.
    pub install_dir: PathBuf,
    /// Detach the volume and delete the source image after installing.
    pub cleanup_after_install: bool,
}

impl InstallContext {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            volumes_root: settings.volumes_dir(),
            install_dir: settings.applications_dir(),
            cleanup_after_install: settings.cleanup_after_install,
        }
    }
}

/// A bundle that could not be copied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyFailure {
    pub bundle: String,
    pub reason: String,
}

/// What cleanup did for this image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The cleanup preference is off; volume and image were left alone.
    Disabled,
    /// Detach and delete were attempted; each flag records whether it stuck.
    Attempted { detached: bool, deleted: bool },
}

/// Batch result for one image run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReport {
    pub image: PathBuf,
    /// Volumes that appeared while attaching this image.
    pub volumes: Vec<PathBuf>,
    /// Destination paths of successfully copied bundles.
    pub installed: Vec<PathBuf>,
    pub failed: Vec<CopyFailure>,
    pub cleanup: CleanupOutcome,
}

impl ImageReport {
    /// True when at least one bundle landed in the install directory.
    pub fn any_installed(&self) -> bool {
        !self.installed.is_empty()
    }
}

/// Run the full pipeline for one disk image.
///
/// This is the canonical entrypoint for both `dockhand install` and the
/// daemon's watcher-triggered processor.
pub fn process_image(
    runner: &dyn CommandRunner,
    ctx: &InstallContext,
    image: &Path,
) -> Result<ImageReport, InstallError> {
    tracing::info!(image = %image.display(), "processing disk image");

    // Quiet attach reports nothing but an exit status; the volumes that
    // appear across the attach are the ones attributed to this image.
    let before = volume_snapshot(&ctx.volumes_root);
    mount::attach(runner, image)?;
    let after = volume_snapshot(&ctx.volumes_root);

    let volumes: Vec<PathBuf> = after
        .difference(&before)
        .map(|name| ctx.volumes_root.join(name))
        .collect();
    if volumes.is_empty() {
        tracing::warn!(image = %image.display(), "no new volume appeared after attach");
    }

    // Enumeration failure downgrades to "no applications found".
    let scanned = match scan::scan_volumes(&ctx.volumes_root) {
        Ok(scanned) => scanned,
        Err(err) => {
            tracing::warn!(error = %err, "volume scan failed; treating as empty");
            Vec::new()
        }
    };

    let mut installed = Vec::new();
    let mut failed = Vec::new();
    for outcome in copy::install_bundles(&scanned, &ctx.install_dir) {
        match outcome {
            CopyOutcome::Installed { dest } => installed.push(dest),
            CopyOutcome::Failed { bundle, reason } => failed.push(CopyFailure { bundle, reason }),
        }
    }

    let cleanup = run_cleanup(runner, &volumes, image, ctx.cleanup_after_install);

    let report = ImageReport {
        image: image.to_path_buf(),
        volumes,
        installed,
        failed,
        cleanup,
    };
    tracing::info!(
        image = %image.display(),
        installed = report.installed.len(),
        failed = report.failed.len(),
        "disk image processed"
    );
    Ok(report)
}

/// Apply the cleanup policy: detach first, then delete the source image.
///
/// The delete is attempted even when detach failed; neither failure is
/// fatal to the run.
fn run_cleanup(
    runner: &dyn CommandRunner,
    volumes: &[PathBuf],
    image: &Path,
    enabled: bool,
) -> CleanupOutcome {
    if !enabled {
        return CleanupOutcome::Disabled;
    }

    let mut detached = !volumes.is_empty();
    for volume in volumes {
        if let Err(err) = mount::detach(runner, volume) {
            tracing::warn!(volume = %volume.display(), error = %err, "detach failed");
            detached = false;
        }
    }

    let deleted = match std::fs::remove_file(image) {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(image = %image.display(), error = %err, "could not delete source image");
            false
        }
    };

    CleanupOutcome::Attempted { detached, deleted }
}

/// Names under `volumes_root`; an unreadable root snapshots as empty.
fn volume_snapshot(volumes_root: &Path) -> BTreeSet<OsString> {
    scan::volume_names(volumes_root).unwrap_or_default()
}
