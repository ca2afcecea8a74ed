//! LaunchAgent management: install, bootstrap, and remove the daemon's
//! launchd service for the current user.

use std::fs;
use std::path::{Path, PathBuf};

use dockhand_install::exec::{CommandRunner, SystemRunner};

use crate::error::{io_err, DaemonError};
use crate::paths::{
    launch_agents_dir, launchd_plist_path, socket_path, stderr_log_path, stdout_log_path,
    DAEMON_LABEL,
};

const LAUNCHCTL: &str = "/bin/launchctl";
const ID: &str = "/usr/bin/id";

/// Install target when the running binary cannot be resolved.
const DEFAULT_BINARY: &str = "/usr/local/bin/dockhand";

/// Generate the launchd plist that keeps the daemon alive at login.
pub fn generate_plist(binary_path: &Path, home: &Path) -> String {
    let stdout = stdout_log_path(home).display().to_string();
    let stderr = stderr_log_path(home).display().to_string();
    let binary = binary_path.display().to_string();

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
  <key>Label</key>
  <string>{label}</string>
  <key>ProgramArguments</key>
  <array>
    <string>{binary}</string>
    <string>daemon</string>
    <string>start</string>
  </array>
  <key>RunAtLoad</key>
  <true/>
  <key>KeepAlive</key>
  <true/>
  <key>StandardOutPath</key>
  <string>{stdout}</string>
  <key>StandardErrorPath</key>
  <string>{stderr}</string>
</dict>
</plist>
"#,
        label = DAEMON_LABEL,
        binary = binary,
        stdout = stdout,
        stderr = stderr
    )
}

/// Write the plist under `~/Library/LaunchAgents` and (re)start the service.
pub fn install(home: &Path) -> Result<PathBuf, DaemonError> {
    ensure_macos()?;

    let launch_agents = launch_agents_dir(home);
    if !launch_agents.exists() {
        fs::create_dir_all(&launch_agents).map_err(|e| io_err(&launch_agents, e))?;
    }
    let logs = crate::paths::logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }

    let plist = launchd_plist_path(home);
    fs::write(&plist, generate_plist(&daemon_binary(), home)).map_err(|e| io_err(&plist, e))?;

    let domain = launchctl_domain()?;
    let service = format!("{domain}/{DAEMON_LABEL}");
    let plist_arg = plist.display().to_string();

    // A previous registration may or may not exist; bootout is best-effort.
    let _ = run_launchctl(&["bootout", &service], true);
    run_launchctl(&["bootstrap", &domain, &plist_arg], false)?;
    run_launchctl(&["kickstart", "-k", &service], false)?;

    Ok(plist)
}

/// Boot out the service and remove the plist and socket.
pub fn uninstall(home: &Path) -> Result<(), DaemonError> {
    ensure_macos()?;

    let plist = launchd_plist_path(home);
    if plist.exists() {
        let domain = launchctl_domain()?;
        let service = format!("{domain}/{DAEMON_LABEL}");
        let _ = run_launchctl(&["bootout", &service], true);
        fs::remove_file(&plist).map_err(|e| io_err(&plist, e))?;
    }

    let socket = socket_path(home);
    if socket.exists() {
        let _ = fs::remove_file(socket);
    }

    Ok(())
}

/// The binary launchd should run: the current executable, falling back to
/// the conventional install location.
fn daemon_binary() -> PathBuf {
    std::env::current_exe().unwrap_or_else(|_| PathBuf::from(DEFAULT_BINARY))
}

#[cfg(target_os = "macos")]
fn ensure_macos() -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(not(target_os = "macos"))]
fn ensure_macos() -> Result<(), DaemonError> {
    Err(DaemonError::Launchd(
        "launchd management is only supported on macOS".to_string(),
    ))
}

fn run_launchctl(args: &[&str], ignore_failure: bool) -> Result<(), DaemonError> {
    let output = SystemRunner
        .run(LAUNCHCTL, args)
        .map_err(|e| DaemonError::Launchd(e.to_string()))?;

    if output.success() || ignore_failure {
        return Ok(());
    }

    Err(DaemonError::Launchd(format!(
        "launchctl {} failed: {}",
        args.first().copied().unwrap_or(""),
        output.describe_failure()
    )))
}

fn launchctl_domain() -> Result<String, DaemonError> {
    let output = SystemRunner
        .run(ID, &["-u"])
        .map_err(|e| DaemonError::Launchd(e.to_string()))?;
    if !output.success() {
        return Err(DaemonError::Launchd(format!(
            "failed to resolve current uid: {}",
            output.describe_failure()
        )));
    }

    let uid = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if uid.is_empty() {
        return Err(DaemonError::Launchd(
            "current uid from `id -u` was empty".to_string(),
        ));
    }
    Ok(format!("gui/{uid}"))
}
