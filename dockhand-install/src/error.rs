//! Error types for dockhand-install.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from the install pipeline and disk tooling.
#[derive(Debug, Error)]
pub enum InstallError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external program could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// `hdiutil attach` failed; this image's run is over.
    #[error("failed to attach {image}: {detail}")]
    Attach { image: PathBuf, detail: String },

    /// `hdiutil detach` failed; callers treat this as best-effort.
    #[error("failed to detach {volume}: {detail}")]
    Detach { volume: PathBuf, detail: String },

    /// `diskutil list` exited non-zero.
    #[error("disk listing failed: {detail}")]
    DiskList { detail: String },

    /// `diskutil list -plist` output did not parse.
    #[error("failed to parse disk listing: {0}")]
    DiskListParse(#[from] plist::Error),
}

/// Convenience constructor for [`InstallError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> InstallError {
    InstallError::Io {
        path: path.into(),
        source,
    }
}
