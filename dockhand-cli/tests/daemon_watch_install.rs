use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::sleep;
use std::time::{Duration, Instant};

use tempfile::TempDir;

fn dockhand_bin() -> PathBuf {
    PathBuf::from(assert_cmd::cargo::cargo_bin!("dockhand"))
}

struct DaemonProcess {
    child: Child,
    binary: PathBuf,
    home: PathBuf,
}

impl DaemonProcess {
    fn start(binary: PathBuf, home: PathBuf) -> Self {
        let child = Command::new(&binary)
            .env("HOME", &home)
            .env("USERPROFILE", &home)
            .args(["daemon", "start"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .expect("spawn daemon");

        Self {
            child,
            binary,
            home,
        }
    }

    fn stop(&mut self) {
        let _ = Command::new(&self.binary)
            .env("HOME", &self.home)
            .env("USERPROFILE", &self.home)
            .args(["daemon", "stop"])
            .status();

        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            sleep(Duration::from_millis(50));
        }

        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for DaemonProcess {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_ok(binary: &Path, home: &Path, args: &[&str]) -> String {
    let output = Command::new(binary)
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(args)
        .output()
        .expect("run dockhand");
    assert!(
        output.status.success(),
        "dockhand {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr),
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn daemon_running(binary: &Path, home: &Path) -> bool {
    let Ok(output) = Command::new(binary)
        .env("HOME", home)
        .env("USERPROFILE", home)
        .args(["daemon", "status", "--json"])
        .output()
    else {
        return false;
    };
    if !output.status.success() {
        return false;
    }

    serde_json::from_slice::<serde_json::Value>(&output.stdout)
        .ok()
        .and_then(|value| value.get("running").and_then(|v| v.as_bool()))
        .unwrap_or(false)
}

fn status_json(binary: &Path, home: &Path) -> serde_json::Value {
    let stdout = run_ok(binary, home, &["daemon", "status", "--json"]);
    serde_json::from_str(&stdout).expect("parse status json")
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        sleep(Duration::from_millis(100));
    }
    false
}

fn seen_count(binary: &Path, home: &Path) -> u64 {
    status_json(binary, home)["watcher"]["seen"]
        .as_u64()
        .unwrap_or(0)
}

#[test]
fn watcher_picks_up_new_images_and_survives_toggles() {
    let home = TempDir::new().expect("home");
    let downloads = home.path().join("downloads");
    std::fs::create_dir_all(&downloads).expect("mkdir downloads");

    let binary = dockhand_bin();

    // Point the watcher at a directory the test controls before first start;
    // the watch directory is resolved once when the daemon boots.
    let set = Command::new(&binary)
        .env("HOME", home.path())
        .env("USERPROFILE", home.path())
        .args(["config", "set", "--downloads-dir"])
        .arg(&downloads)
        .output()
        .expect("run config set");
    assert!(
        set.status.success(),
        "config set failed: {}",
        String::from_utf8_lossy(&set.stderr),
    );

    let mut daemon = DaemonProcess::start(binary.clone(), home.path().to_path_buf());
    assert!(
        wait_until(Duration::from_secs(5), || daemon_running(
            &binary,
            home.path()
        )),
        "daemon did not report running state in time",
    );

    // A watcher snapshot in the status payload proves the watch is
    // registered, not just that the socket answers.
    let status = status_json(&binary, home.path());
    assert_eq!(status["watcher"]["enabled"], serde_json::json!(true));
    assert_eq!(
        status["watcher"]["dir"],
        serde_json::json!(downloads.display().to_string())
    );

    // A new image triggers a watcher install; the garbage payload cannot
    // mount, so the seen count rises while the notice queue stays empty.
    std::fs::write(downloads.join("FakeApp.dmg"), b"not a disk image").expect("write image");
    assert!(
        wait_until(Duration::from_secs(10), || seen_count(
            &binary,
            home.path()
        ) >= 1),
        "watcher did not pick up the new disk image",
    );

    let notices = run_ok(&binary, home.path(), &["notices"]);
    assert!(
        notices.contains("No pending notices"),
        "failed install must not queue a notice, got: {notices}"
    );

    // Toggling off keeps the session; toggling back on resets it.
    run_ok(&binary, home.path(), &["watcher", "off"]);
    let status = status_json(&binary, home.path());
    assert_eq!(status["watcher"]["enabled"], serde_json::json!(false));
    assert_eq!(status["watcher"]["seen"], serde_json::json!(1));

    run_ok(&binary, home.path(), &["watcher", "on"]);
    let status = status_json(&binary, home.path());
    assert_eq!(status["watcher"]["enabled"], serde_json::json!(true));
    assert_eq!(status["watcher"]["seen"], serde_json::json!(0));

    // After the reset, the next event makes the already-present image fresh
    // again alongside the new one.
    std::fs::write(downloads.join("SecondApp.dmg"), b"still not a disk image")
        .expect("write image");
    assert!(
        wait_until(Duration::from_secs(10), || seen_count(
            &binary,
            home.path()
        ) >= 2),
        "watcher did not rescan after re-enable",
    );

    daemon.stop();
    assert!(
        wait_until(Duration::from_secs(3), || {
            !home.path().join(".dockhand/dockhand.sock").exists()
        }),
        "daemon did not remove its socket on shutdown",
    );
}
