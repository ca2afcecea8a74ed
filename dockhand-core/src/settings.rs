//! Persisted user preferences.
//!
//! # Storage layout
//!
//! ```text
//! ~/.dockhand/
//!   settings.yaml   (mode 0600, created on first save)
//! ```
//!
//! # API pattern
//!
//! Every function touching the store has two forms:
//! - `fn_at(home: &Path, …)` — explicit home; used in tests with `TempDir`
//! - `fn(…)` — derives home from `dirs::home_dir()`, delegates to `_at`
//!
//! Tests must NEVER call the no-arg wrappers; always use `_at`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Where application bundles are installed when no override is set.
pub const DEFAULT_INSTALL_DIR: &str = "/Applications";

/// Where mounted volumes appear when no override is set.
pub const DEFAULT_VOLUMES_ROOT: &str = "/Volumes";

// ---------------------------------------------------------------------------
// 1. Settings
// ---------------------------------------------------------------------------

/// User preferences for the watcher and the install pipeline.
///
/// Unknown keys in the file are ignored and missing keys fall back to the
/// defaults, so old files keep loading across upgrades.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Detach the mounted volume and delete the source image after a run.
    pub cleanup_after_install: bool,
    /// Watch the downloads directory for new disk images.
    pub watch_downloads: bool,
    /// Override for the watched directory (default: the platform downloads dir).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloads_dir: Option<PathBuf>,
    /// Override for the install destination (default: `/Applications`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub install_dir: Option<PathBuf>,
    /// Override for the mounted-volumes root (default: `/Volumes`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volumes_root: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cleanup_after_install: false,
            watch_downloads: true,
            downloads_dir: None,
            install_dir: None,
            volumes_root: None,
        }
    }
}

impl Settings {
    /// The directory watched for new disk images.
    ///
    /// Override wins, then the platform downloads directory, then
    /// `<home>/Downloads`. `None` only when no home can be resolved either.
    pub fn watched_dir(&self) -> Option<PathBuf> {
        if let Some(dir) = &self.downloads_dir {
            return Some(dir.clone());
        }
        dirs::download_dir().or_else(|| dirs::home_dir().map(|home| home.join("Downloads")))
    }

    /// The directory application bundles are copied into.
    pub fn applications_dir(&self) -> PathBuf {
        self.install_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_INSTALL_DIR))
    }

    /// The root under which mounted volumes appear.
    pub fn volumes_dir(&self) -> PathBuf {
        self.volumes_root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_VOLUMES_ROOT))
    }
}

// ---------------------------------------------------------------------------
// 2. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.dockhand/`
///
/// Creates the directory (mode `0700`) if it does not yet exist.
pub fn dockhand_dir_at(home: &Path) -> Result<PathBuf, SettingsError> {
    let dir = home.join(".dockhand");
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    Ok(dir)
}

/// `<home>/.dockhand/settings.yaml` — pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".dockhand").join("settings.yaml")
}

// ---------------------------------------------------------------------------
// 3. Load
// ---------------------------------------------------------------------------

/// Load settings from `<home>/.dockhand/settings.yaml`.
///
/// An absent file yields [`Settings::default`]; malformed YAML is
/// `SettingsError::Parse` (with path + line context).
pub fn load_at(home: &Path) -> Result<Settings, SettingsError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| SettingsError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Settings, SettingsError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 4. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save settings to `<home>/.dockhand/settings.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
/// `.tmp` is always in the same directory as the target (same filesystem — no EXDEV on macOS).
pub fn save_at(home: &Path, settings: &Settings) -> Result<(), SettingsError> {
    dockhand_dir_at(home)?; // create dir + 0700 if absent
    let path = settings_path_at(home);
    let tmp_path = path.with_file_name("settings.yaml.tmp");

    let yaml = serde_yaml::to_string(settings)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(settings: &Settings) -> Result<(), SettingsError> {
    save_at(&home()?, settings)
}

/// Load, apply `mutate`, save. Returns the settings as persisted.
pub fn update_at<F>(home: &Path, mutate: F) -> Result<Settings, SettingsError>
where
    F: FnOnce(&mut Settings),
{
    let mut settings = load_at(home)?;
    mutate(&mut settings);
    save_at(home, &settings)?;
    Ok(settings)
}

/// `update_at` convenience wrapper.
pub fn update<F>(mutate: F) -> Result<Settings, SettingsError>
where
    F: FnOnce(&mut Settings),
{
    update_at(&home()?, mutate)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn home() -> Result<PathBuf, SettingsError> {
    dirs::home_dir().ok_or(SettingsError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), SettingsError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), SettingsError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
