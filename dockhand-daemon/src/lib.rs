//! Daemon runtime: downloads watcher + install processor + socket server.

mod error;
pub mod launchd;
pub mod log_rotation;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod watcher;

pub use error::DaemonError;
pub use launchd::{generate_plist, install as install_launchd, uninstall as uninstall_launchd};
pub use protocol::{
    request_eject, request_install, request_launch, request_notices, request_status, request_stop,
    request_watcher, send_request, DaemonRequest, DaemonResponse, InstallNotice,
};
pub use runtime::{run, start_blocking, InstallSummary, WatcherSnapshot};
