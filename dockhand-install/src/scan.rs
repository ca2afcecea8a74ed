//! Mounted-volume enumeration and application discovery.

use std::collections::BTreeSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{io_err, InstallError};

/// File-name suffix that marks a directory entry as an application bundle.
pub const BUNDLE_SUFFIX: &str = ".app";

/// Applications discovered on a single mounted volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeApps {
    /// Mount point of the volume the bundles were found on.
    pub volume: PathBuf,
    /// Bundle file names (e.g. `MyApp.app`) directly at the volume root.
    pub bundles: Vec<String>,
}

/// List every volume under `volumes_root` and the `.app` bundles at its root.
///
/// Deliberately enumerates all currently mounted volumes, not only the one
/// just attached: concurrent mounts are tolerated at the cost of sometimes
/// picking up bundles from an unrelated volume. Volumes whose contents
/// cannot be read (permissions, auto-unmounted) are skipped, never fatal.
pub fn scan_volumes(volumes_root: &Path) -> Result<Vec<VolumeApps>, InstallError> {
    let mut found = Vec::new();
    for name in volume_names(volumes_root)? {
        let volume = volumes_root.join(&name);
        match bundle_names(&volume) {
            Ok(bundles) => found.push(VolumeApps { volume, bundles }),
            Err(err) => {
                tracing::warn!(volume = %volume.display(), error = %err, "skipping unreadable volume");
            }
        }
    }
    Ok(found)
}

/// Names of the directories directly under `volumes_root`, sorted.
///
/// Also serves as the pipeline's before/after attach snapshot.
pub fn volume_names(volumes_root: &Path) -> Result<BTreeSet<OsString>, InstallError> {
    let entries = std::fs::read_dir(volumes_root).map_err(|e| io_err(volumes_root, e))?;
    let mut names = BTreeSet::new();
    for entry in entries.filter_map(|e| e.ok()) {
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            names.insert(entry.file_name());
        }
    }
    Ok(names)
}

/// `.app` entries directly under `volume`, sorted.
fn bundle_names(volume: &Path) -> Result<Vec<String>, InstallError> {
    let entries = std::fs::read_dir(volume).map_err(|e| io_err(volume, e))?;
    let mut bundles: Vec<String> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(BUNDLE_SUFFIX))
        .collect();
    bundles.sort();
    Ok(bundles)
}
