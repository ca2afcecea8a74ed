//! Disk listing and ejection via `diskutil`.
//!
//! `diskutil list -plist` is the only structured output dockhand parses;
//! everything else is exit-status-only. The shapes below map just the keys
//! we read, unknown keys are ignored by serde.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::InstallError;
use crate::exec::CommandRunner;

/// Disk tool invoked for listing and ejecting.
pub const DISKUTIL: &str = "/usr/sbin/diskutil";

/// Top-level shape of `diskutil list -plist`.
#[derive(Debug, Clone, Deserialize)]
struct DiskListing {
    #[serde(rename = "AllDisksAndPartitions", default)]
    disks: Vec<DiskEntry>,
}

/// One whole disk with the volume information dockhand cares about.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiskEntry {
    #[serde(rename = "DeviceIdentifier")]
    pub device: String,
    #[serde(rename = "Content")]
    pub content: Option<String>,
    #[serde(rename = "VolumeName")]
    pub volume_name: Option<String>,
    #[serde(rename = "MountPoint")]
    pub mount_point: Option<PathBuf>,
    #[serde(rename = "APFSVolumes", default)]
    pub apfs_volumes: Vec<ApfsVolume>,
}

/// A volume nested inside an APFS container disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ApfsVolume {
    #[serde(rename = "DeviceIdentifier")]
    pub device: String,
    #[serde(rename = "VolumeName")]
    pub volume_name: Option<String>,
    #[serde(rename = "MountPoint")]
    pub mount_point: Option<PathBuf>,
}

impl DiskEntry {
    /// Display label: `<volume name> (<device>)`, falling back to the bare
    /// device identifier.
    ///
    /// Partition-scheme containers keep the bare identifier even when they
    /// carry a name; a named APFS child is used when the disk itself has
    /// no volume name.
    pub fn title(&self) -> String {
        let named = match &self.content {
            Some(content) if content != "Apple_partition_scheme" => true,
            Some(_) | None => false,
        };
        if named {
            if let Some(name) = &self.volume_name {
                return format!("{} ({})", name, self.device);
            }
            if let Some(name) = self
                .apfs_volumes
                .first()
                .and_then(|v| v.volume_name.as_deref())
            {
                return format!("{} ({})", name, self.device);
            }
        }
        self.device.clone()
    }

    /// True when any APFS volume of this disk is mounted under `volumes_root`.
    ///
    /// This is the "user-ejectable" test: the boot volume mounts at `/`, so
    /// only removable and image-backed volumes land under the volumes root.
    pub fn ejectable_under(&self, volumes_root: &Path) -> bool {
        self.apfs_volumes.iter().any(|volume| {
            volume
                .mount_point
                .as_deref()
                .map(|mount| mount.starts_with(volumes_root))
                .unwrap_or(false)
        })
    }
}

/// Run `diskutil list -plist` and parse the result.
pub fn list_disks(runner: &dyn CommandRunner) -> Result<Vec<DiskEntry>, InstallError> {
    let output = runner.run(DISKUTIL, &["list", "-plist"])?;
    if !output.success() {
        return Err(InstallError::DiskList {
            detail: output.describe_failure(),
        });
    }
    let listing: DiskListing = plist::from_bytes(&output.stdout)?;
    Ok(listing.disks)
}

/// Outcome of one eject attempt.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EjectOutcome {
    pub device: String,
    pub ejected: bool,
}

/// Eject every disk that has an APFS volume mounted under `volumes_root`.
///
/// One eject per matching disk; a refusal (disk in use) is recorded in the
/// outcome and the rest of the disks are still attempted.
pub fn eject_all(
    runner: &dyn CommandRunner,
    volumes_root: &Path,
) -> Result<Vec<EjectOutcome>, InstallError> {
    let mut outcomes = Vec::new();
    for disk in list_disks(runner)? {
        if !disk.ejectable_under(volumes_root) {
            continue;
        }
        let output = runner.run(DISKUTIL, &["eject", &disk.device])?;
        let ejected = output.success();
        if ejected {
            tracing::info!(device = %disk.device, "ejected disk");
        } else {
            tracing::warn!(device = %disk.device, detail = %output.describe_failure(), "eject refused");
        }
        outcomes.push(EjectOutcome {
            device: disk.device,
            ejected,
        });
    }
    Ok(outcomes)
}
