use std::path::{Path, PathBuf};

pub const DAEMON_LABEL: &str = "dev.dockhand.daemon";

pub const DAEMON_STDOUT_LOG: &str = "dockhand.log";
pub const DAEMON_STDERR_LOG: &str = "dockhand-err.log";
pub const DAEMON_SOCKET: &str = "dockhand.sock";

pub fn dockhand_root(home: &Path) -> PathBuf {
    home.join(".dockhand")
}

pub fn socket_path(home: &Path) -> PathBuf {
    dockhand_root(home).join(DAEMON_SOCKET)
}

pub fn logs_dir(home: &Path) -> PathBuf {
    dockhand_root(home).join("logs")
}

pub fn stdout_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDOUT_LOG)
}

pub fn stderr_log_path(home: &Path) -> PathBuf {
    logs_dir(home).join(DAEMON_STDERR_LOG)
}

pub fn launch_agents_dir(home: &Path) -> PathBuf {
    home.join("Library").join("LaunchAgents")
}

pub fn launchd_plist_path(home: &Path) -> PathBuf {
    launch_agents_dir(home).join(format!("{DAEMON_LABEL}.plist"))
}
