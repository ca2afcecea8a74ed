//! Dockhand core library — persisted settings and errors.
//!
//! Public API surface:
//! - [`settings`] — load / save / defaults for `~/.dockhand/settings.yaml`
//! - [`error`] — [`SettingsError`]

pub mod error;
pub mod settings;

pub use error::SettingsError;
pub use settings::Settings;
