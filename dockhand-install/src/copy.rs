//! Copying application bundles into the install directory.
//!
//! ## Staged copy protocol
//!
//! 1. Refuse if the destination already exists (no overwrite, no merge).
//! 2. Copy the bundle tree to a `.dockhand-partial` sibling.
//! 3. Rename into place (atomic on POSIX).
//! 4. On any failure, remove the partial tree.
//!
//! A half-copied bundle therefore never appears under the install directory.

use std::io;
use std::path::{Path, PathBuf};

use crate::scan::VolumeApps;

/// Suffix of the staging directory a bundle is copied into before the rename.
const PARTIAL_SUFFIX: &str = ".dockhand-partial";

/// Outcome of one bundle copy attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CopyOutcome {
    /// The bundle tree was fully copied to `dest`.
    Installed { dest: PathBuf },
    /// This bundle failed; the batch continues with the next one.
    Failed { bundle: String, reason: String },
}

/// Copy every discovered bundle into `install_dir`.
///
/// One failing item never aborts the batch. An already-present destination
/// fails that item, so re-running against an installed bundle reports the
/// conflict instead of silently succeeding.
pub fn install_bundles(volumes: &[VolumeApps], install_dir: &Path) -> Vec<CopyOutcome> {
    let mut outcomes = Vec::new();
    for volume in volumes {
        for bundle in &volume.bundles {
            let source = volume.volume.join(bundle);
            let dest = install_dir.join(bundle);
            match copy_bundle(&source, &dest) {
                Ok(()) => {
                    tracing::info!(bundle = %bundle, dest = %dest.display(), "installed application");
                    outcomes.push(CopyOutcome::Installed { dest });
                }
                Err(err) => {
                    tracing::warn!(bundle = %bundle, error = %err, "bundle copy failed");
                    outcomes.push(CopyOutcome::Failed {
                        bundle: bundle.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
    }
    outcomes
}

/// Copy one bundle with the staged protocol described in the module docs.
fn copy_bundle(source: &Path, dest: &Path) -> io::Result<()> {
    if std::fs::symlink_metadata(dest).is_ok() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", dest.display()),
        ));
    }

    let staging = partial_path(dest);
    if std::fs::symlink_metadata(&staging).is_ok() {
        // Leftover from a crashed run; the rename below needs it gone.
        remove_tree(&staging)?;
    }

    if let Err(err) = copy_tree(source, &staging) {
        let _ = remove_tree(&staging);
        return Err(err);
    }
    if let Err(err) = std::fs::rename(&staging, dest) {
        let _ = remove_tree(&staging);
        return Err(err);
    }
    Ok(())
}

/// `<dest>.dockhand-partial`, always a sibling of `dest` (same filesystem).
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(PARTIAL_SUFFIX);
    dest.with_file_name(name)
}

/// Recursive copy preserving symlinks.
///
/// App bundles link frameworks and nested executables by relative symlink;
/// resolving those would break code signatures. Permission bits on regular
/// files survive via `fs::copy`.
fn copy_tree(source: &Path, dest: &Path) -> io::Result<()> {
    let file_type = std::fs::symlink_metadata(source)?.file_type();
    if file_type.is_symlink() {
        return copy_symlink(source, dest);
    }
    if !file_type.is_dir() {
        std::fs::copy(source, dest)?;
        return Ok(());
    }
    std::fs::create_dir(dest)?;
    for entry in std::fs::read_dir(source)? {
        let entry = entry?;
        copy_tree(&entry.path(), &dest.join(entry.file_name()))?;
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    let target = std::fs::read_link(source)?;
    std::os::unix::fs::symlink(target, dest)
}

#[cfg(not(unix))]
fn copy_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    std::fs::copy(source, dest).map(|_| ())
}

/// Remove a staging path whether it ended up as a directory, file or link.
fn remove_tree(path: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if meta.file_type().is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    }
}
