//! Size-based rotation for the daemon log files.
//!
//! When `dockhand.log` or `dockhand-err.log` reaches 10 MiB the live file
//! is renamed to `<name>.old` (replacing any previous backup) and a fresh
//! empty file takes its place.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Rotate `log_path` when its size is at least `max_bytes`.
///
/// Returns `true` when a rotation happened. A missing file is `false`, not
/// an error.
pub fn rotate_if_oversize(log_path: &Path, max_bytes: u64) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };

    if size < max_bytes {
        return Ok(false);
    }

    // rename replaces an existing .old in one step on the same filesystem
    fs::rename(log_path, backup_path(log_path))?;

    // Recreate the live file so launchd's redirect always has a target.
    let _ = fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;

    Ok(true)
}

/// Rotate both daemon log files under `home`.
///
/// A failure on one file is logged and does not block the other.
pub fn rotate_logs(home: &Path) {
    let stdout_log = crate::paths::stdout_log_path(home);
    let stderr_log = crate::paths::stderr_log_path(home);

    for log_path in [&stdout_log, &stderr_log] {
        match rotate_if_oversize(log_path, MAX_LOG_BYTES) {
            Ok(true) => tracing::info!(path = %log_path.display(), "log file rotated"),
            Ok(false) => {}
            Err(err) => {
                tracing::warn!(path = %log_path.display(), error = %err, "log rotation failed")
            }
        }
    }
}

/// `<name>.old` sibling of `base`.
fn backup_path(base: &Path) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or(crate::paths::DAEMON_STDOUT_LOG);
    base.with_file_name(format!("{name}.old"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
