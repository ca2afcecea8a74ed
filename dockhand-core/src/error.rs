//! Error types for dockhand-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from settings persistence.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// Underlying I/O failure (file not found, permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization error (write/save path).
    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// YAML parse error on load — includes file path and line context from serde_yaml.
    #[error("failed to parse settings at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// `dirs::home_dir()` returned `None` — cannot locate `~/.dockhand/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}
