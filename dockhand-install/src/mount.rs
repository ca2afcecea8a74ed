//! Disk image attach/detach via `hdiutil`.
//!
//! Quiet mode is deliberate: attach prints nothing we would want to parse,
//! so success/failure is judged on exit status alone and mount points are
//! discovered by listing the volumes root (see `pipeline`).

use std::path::Path;

use crate::error::InstallError;
use crate::exec::CommandRunner;

/// Disk-image tool invoked for attach/detach.
pub const HDIUTIL: &str = "/usr/bin/hdiutil";

/// Attach `image` without surfacing it in the Finder.
///
/// Blocks until `hdiutil` exits. A spawn failure or non-zero exit means the
/// image could not be mounted and the caller abandons this image's run.
pub fn attach(runner: &dyn CommandRunner, image: &Path) -> Result<(), InstallError> {
    let image_arg = image.to_string_lossy();
    let output = runner.run(HDIUTIL, &["attach", image_arg.as_ref(), "-nobrowse", "-quiet"])?;
    if output.success() {
        tracing::debug!(image = %image.display(), "attached disk image");
        return Ok(());
    }
    Err(InstallError::Attach {
        image: image.to_path_buf(),
        detail: output.describe_failure(),
    })
}

/// Detach the volume mounted at `volume`.
pub fn detach(runner: &dyn CommandRunner, volume: &Path) -> Result<(), InstallError> {
    let volume_arg = volume.to_string_lossy();
    let output = runner.run(HDIUTIL, &["detach", volume_arg.as_ref(), "-quiet"])?;
    if output.success() {
        tracing::debug!(volume = %volume.display(), "detached volume");
        return Ok(());
    }
    Err(InstallError::Detach {
        volume: volume.to_path_buf(),
        detail: output.describe_failure(),
    })
}
