use std::collections::VecDeque;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::net::UnixStream as StdUnixStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use chrono::Utc;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc, oneshot, RwLock};

use dockhand_core::settings;
use dockhand_install::disks;
use dockhand_install::exec::{run_async, SystemRunner};
use dockhand_install::{process_image, CleanupOutcome, ImageReport, InstallContext};

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;
use crate::protocol::{DaemonRequest, DaemonResponse, InstallNotice};
use crate::watcher::DownloadsWatcher;

/// Pending install notices, oldest first.
pub type NoticeQueue = VecDeque<InstallNotice>;

/// Most notices kept before the oldest is dropped.
pub const MAX_PENDING_NOTICES: usize = 32;

const OPEN: &str = "/usr/bin/open";

struct InstallJob {
    image: PathBuf,
    source: &'static str,
    respond_to: oneshot::Sender<Result<InstallSummary, String>>,
}

/// Flattened [`ImageReport`] sent back over the socket.
#[derive(Debug, Clone, Serialize)]
pub struct InstallSummary {
    pub image: String,
    pub source: String,
    pub volumes: Vec<String>,
    pub installed: Vec<String>,
    pub failed: Vec<FailedBundle>,
    pub cleanup: String,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedBundle {
    pub bundle: String,
    pub reason: String,
}

/// Watcher state as reported over the socket.
#[derive(Debug, Clone, Serialize)]
pub struct WatcherSnapshot {
    pub enabled: bool,
    pub dir: String,
    /// Images dispatched in the current session.
    pub seen: usize,
}

enum WatcherControl {
    SetEnabled {
        enabled: bool,
        respond_to: oneshot::Sender<WatcherSnapshot>,
    },
    Query {
        respond_to: oneshot::Sender<WatcherSnapshot>,
    },
}

/// Start the daemon runtime and block the current thread until it exits.
pub fn start_blocking(home: &Path) -> Result<(), DaemonError> {
    init_tracing();
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(home.to_path_buf()))
}

/// Run the daemon runtime.
pub async fn run(home: PathBuf) -> Result<(), DaemonError> {
    ensure_runtime_dirs(&home)?;

    let notices = Arc::new(RwLock::new(NoticeQueue::new()));
    let started_at_unix = unix_seconds_now();

    let (install_tx, install_rx) = mpsc::channel::<InstallJob>(64);
    let (watcher_ctl_tx, watcher_ctl_rx) = mpsc::channel::<WatcherControl>(16);
    let (shutdown_tx, _) = broadcast::channel::<()>(16);

    let watcher_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let install_tx = install_tx.clone();
        tokio::spawn(async move {
            let result = watcher_task(home, install_tx, watcher_ctl_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let processor_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let notices = notices.clone();
        tokio::spawn(async move {
            let result = install_processor_task(home, notices, install_rx, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let socket_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        let notices = notices.clone();
        let install_tx = install_tx.clone();
        tokio::spawn(async move {
            let result = socket_server_task(
                home,
                notices,
                install_tx,
                watcher_ctl_tx,
                shutdown.clone(),
                shutdown.subscribe(),
                started_at_unix,
            )
            .await;
            let _ = shutdown.send(());
            result
        })
    };

    let rotation_handle = {
        let shutdown = shutdown_tx.clone();
        let home = home.clone();
        tokio::spawn(async move {
            let result = log_rotation_task(home, shutdown.subscribe()).await;
            let _ = shutdown.send(());
            result
        })
    };

    let signal_handle = {
        let shutdown = shutdown_tx.clone();
        tokio::spawn(async move {
            let mut shutdown_rx = shutdown.subscribe();
            tokio::select! {
                _ = shutdown_rx.recv() => Ok(()),
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => {
                            tracing::info!("received ctrl-c, shutting down daemon");
                            let _ = shutdown.send(());
                            Ok(())
                        }
                        Err(err) => Err(DaemonError::Protocol(format!("ctrl-c handler failed: {err}"))),
                    }
                }
            }
        })
    };

    let (watcher_result, processor_result, socket_result, rotation_result, signal_result) =
        tokio::join!(
            watcher_handle,
            processor_handle,
            socket_handle,
            rotation_handle,
            signal_handle
        );

    handle_join("watcher", watcher_result)?;
    handle_join("install_processor", processor_result)?;
    handle_join("socket_server", socket_result)?;
    handle_join("log_rotation", rotation_result)?;
    handle_join("signal_handler", signal_result)?;
    Ok(())
}

/// Live notify subscription on the downloads directory.
///
/// Dropped whole on disable, rebuilt on enable, so events from a disabled
/// stretch can never leak into the next session.
struct WatchSource {
    _watcher: RecommendedWatcher,
    events: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

fn build_watch_source(dir: &Path) -> Result<WatchSource, DaemonError> {
    let (event_tx, events) = mpsc::unbounded_channel::<notify::Result<Event>>();
    let mut watcher = recommended_watcher(move |event| {
        let _ = event_tx.send(event);
    })?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    Ok(WatchSource {
        _watcher: watcher,
        events,
    })
}

async fn recv_event(source: &mut Option<WatchSource>) -> Option<notify::Result<Event>> {
    match source {
        Some(source) => source.events.recv().await,
        None => std::future::pending().await,
    }
}

async fn watcher_task(
    home: PathBuf,
    install_tx: mpsc::Sender<InstallJob>,
    mut control_rx: mpsc::Receiver<WatcherControl>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let initial = settings::load_at(&home)?;
    let dir = resolve_watch_dir(&home, &initial);
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
    }

    let mut session = DownloadsWatcher::new(&dir);
    let mut enabled = initial.watch_downloads;
    let mut source = if enabled {
        tracing::info!(dir = %dir.display(), "downloads watcher enabled");
        Some(build_watch_source(&dir)?)
    } else {
        None
    };

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_control = control_rx.recv() => {
                let Some(control) = maybe_control else { break };
                match control {
                    WatcherControl::SetEnabled { enabled: turn_on, respond_to } => {
                        if turn_on && !enabled {
                            if !dir.exists() {
                                fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
                            }
                            // Fresh session: files already in the directory are
                            // unseen again and dispatch on the next event.
                            session.reset();
                            source = Some(build_watch_source(&dir)?);
                            enabled = true;
                            tracing::info!(dir = %dir.display(), "downloads watcher enabled");
                        } else if !turn_on && enabled {
                            source = None;
                            enabled = false;
                            tracing::info!("downloads watcher disabled");
                        }
                        let _ = respond_to.send(watcher_snapshot(enabled, &session));
                    }
                    WatcherControl::Query { respond_to } => {
                        let _ = respond_to.send(watcher_snapshot(enabled, &session));
                    }
                }
            }
            event = recv_event(&mut source) => {
                let Some(event) = event else {
                    source = None;
                    continue;
                };
                let event = match event {
                    Ok(event) => event,
                    Err(err) => {
                        tracing::warn!(error = %err, "watcher event error");
                        continue;
                    }
                };
                if !is_relevant_event_kind(&event.kind) {
                    continue;
                }

                // FSEvents only says "the directory changed"; re-list and let
                // the session's seen-set pick out what is actually new.
                for image in session.scan_for_new_images() {
                    match enqueue_install(&install_tx, image.clone(), "watcher").await {
                        Ok(summary) => {
                            tracing::info!(
                                image = %image.display(),
                                installed = summary.installed.len(),
                                failed = summary.failed.len(),
                                cleanup = %summary.cleanup,
                                "watcher-triggered install completed",
                            );
                        }
                        Err(err) => {
                            tracing::error!(image = %image.display(), error = %err, "watcher-triggered install failed");
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

async fn install_processor_task(
    home: PathBuf,
    notices: Arc<RwLock<NoticeQueue>>,
    mut install_rx: mpsc::Receiver<InstallJob>,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            maybe_job = install_rx.recv() => {
                let Some(job) = maybe_job else { break };
                let started = Instant::now();

                // Settings are re-read per job so a cleanup toggle applies to
                // the next image without a daemon restart.
                let home_for_job = home.clone();
                let image = job.image.clone();
                let run_result: Result<ImageReport, String> = tokio::task::spawn_blocking(move || {
                    let settings = settings::load_at(&home_for_job).map_err(|e| e.to_string())?;
                    let ctx = InstallContext::from_settings(&settings);
                    process_image(&SystemRunner, &ctx, &image).map_err(|e| e.to_string())
                })
                .await
                .map_err(|err| DaemonError::Protocol(format!("install task join error: {err}")))?;

                let outcome = match run_result {
                    Ok(report) => {
                        if report.any_installed() || !report.failed.is_empty() {
                            push_notice(&notices, notice_from_report(&report)).await;
                        }
                        Ok(build_install_summary(job.source, &report, started.elapsed()))
                    }
                    Err(err) => Err(err),
                };

                let _ = job.respond_to.send(outcome);
            }
        }
    }

    Ok(())
}

async fn socket_server_task(
    home: PathBuf,
    notices: Arc<RwLock<NoticeQueue>>,
    install_tx: mpsc::Sender<InstallJob>,
    watcher_ctl_tx: mpsc::Sender<WatcherControl>,
    shutdown_tx: broadcast::Sender<()>,
    mut shutdown_rx: broadcast::Receiver<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    settings::dockhand_dir_at(&home)?;

    let socket = socket_path(&home);
    prepare_socket_for_bind(&socket)?;

    let listener = UnixListener::bind(&socket).map_err(|e| io_err(&socket, e))?;
    set_socket_permissions(&socket)?;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            accepted = listener.accept() => {
                let (stream, _) = accepted.map_err(|e| io_err(&socket, e))?;
                let home = home.clone();
                let notices = notices.clone();
                let install_tx = install_tx.clone();
                let watcher_ctl_tx = watcher_ctl_tx.clone();
                let shutdown_tx = shutdown_tx.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_socket_client(
                        stream,
                        home,
                        notices,
                        install_tx,
                        watcher_ctl_tx,
                        shutdown_tx,
                        started_at_unix,
                    ).await {
                        tracing::error!(error = %err, "socket client error");
                    }
                });
            }
        }
    }

    if socket.exists() {
        let _ = fs::remove_file(&socket);
    }
    Ok(())
}

async fn handle_socket_client(
    stream: UnixStream,
    home: PathBuf,
    notices: Arc<RwLock<NoticeQueue>>,
    install_tx: mpsc::Sender<InstallJob>,
    watcher_ctl_tx: mpsc::Sender<WatcherControl>,
    shutdown_tx: broadcast::Sender<()>,
    started_at_unix: u64,
) -> Result<(), DaemonError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines
        .next_line()
        .await
        .map_err(|e| io_err("daemon socket read", e))?
    {
        if line.trim().is_empty() {
            continue;
        }

        let request: Result<DaemonRequest, _> = serde_json::from_str(&line);
        let request = match request {
            Ok(request) => request,
            Err(err) => {
                write_response(
                    &mut writer,
                    &DaemonResponse::error(format!("invalid request JSON: {err}")),
                )
                .await?;
                continue;
            }
        };

        let cmd = request.cmd.clone();

        let response = match cmd.as_str() {
            "status" => {
                let payload =
                    build_status_payload(&home, notices.clone(), &watcher_ctl_tx, started_at_unix)
                        .await;
                DaemonResponse::ok(payload)
            }
            "install" => match request.image {
                Some(image) => match enqueue_install(&install_tx, image, "socket").await {
                    Ok(summary) => DaemonResponse::ok(json!(summary)),
                    Err(err) => DaemonResponse::error(err.to_string()),
                },
                None => DaemonResponse::error("install command requires 'image'"),
            },
            "watcher" => match request.enabled {
                Some(enabled) => {
                    match handle_watcher_command(&home, &watcher_ctl_tx, enabled).await {
                        Ok(snapshot) => DaemonResponse::ok(json!(snapshot)),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
                None => DaemonResponse::error("watcher command requires 'enabled'"),
            },
            "notices" => {
                let drain = request.clear.unwrap_or(false);
                let pending: Vec<InstallNotice> = if drain {
                    notices.write().await.drain(..).collect()
                } else {
                    notices.read().await.iter().cloned().collect()
                };
                DaemonResponse::ok(json!(pending))
            }
            "launch" => match request.app {
                Some(app) => {
                    let app_arg = app.to_string_lossy();
                    match run_async(OPEN, &[app_arg.as_ref()]).await {
                        Ok(output) if output.success() => {
                            DaemonResponse::ok(json!({ "launched": app.display().to_string() }))
                        }
                        Ok(output) => DaemonResponse::error(format!(
                            "open failed: {}",
                            output.describe_failure()
                        )),
                        Err(err) => DaemonResponse::error(err.to_string()),
                    }
                }
                None => DaemonResponse::error("launch command requires 'app'"),
            },
            "eject" => {
                let home_for_eject = home.clone();
                let result = tokio::task::spawn_blocking(
                    move || -> Result<Vec<disks::EjectOutcome>, String> {
                        let settings =
                            settings::load_at(&home_for_eject).map_err(|e| e.to_string())?;
                        disks::eject_all(&SystemRunner, &settings.volumes_dir())
                            .map_err(|e| e.to_string())
                    },
                )
                .await;
                match result {
                    Ok(Ok(outcomes)) => DaemonResponse::ok(json!(outcomes)),
                    Ok(Err(err)) => DaemonResponse::error(err),
                    Err(err) => DaemonResponse::error(format!("eject task join error: {err}")),
                }
            }
            "stop" => {
                let _ = shutdown_tx.send(());
                DaemonResponse::ok(json!({ "stopping": true }))
            }
            other => DaemonResponse::error(format!("unknown command '{other}'")),
        };

        write_response(&mut writer, &response).await?;
        if cmd == "stop" {
            break;
        }
    }

    Ok(())
}

async fn build_status_payload(
    home: &Path,
    notices: Arc<RwLock<NoticeQueue>>,
    watcher_ctl_tx: &mpsc::Sender<WatcherControl>,
    started_at_unix: u64,
) -> Value {
    let pending_notices = notices.read().await.len();

    let watcher = match query_watcher(watcher_ctl_tx).await {
        Ok(snapshot) => json!(snapshot),
        Err(err) => json!({ "error": err.to_string() }),
    };

    json!({
        "running": true,
        "label": crate::paths::DAEMON_LABEL,
        "started_at_unix": started_at_unix,
        "watcher": watcher,
        "pending_notices": pending_notices,
        "socket": socket_path(home).display().to_string(),
    })
}

/// Persist the preference first so the toggle survives a daemon restart.
async fn handle_watcher_command(
    home: &Path,
    watcher_ctl_tx: &mpsc::Sender<WatcherControl>,
    enabled: bool,
) -> Result<WatcherSnapshot, DaemonError> {
    settings::update_at(home, |s| s.watch_downloads = enabled)?;
    set_watcher_enabled(watcher_ctl_tx, enabled).await
}

async fn enqueue_install(
    install_tx: &mpsc::Sender<InstallJob>,
    image: PathBuf,
    source: &'static str,
) -> Result<InstallSummary, DaemonError> {
    let (tx, rx) = oneshot::channel();
    install_tx
        .send(InstallJob {
            image,
            source,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("install queue"))?;

    let outcome = rx
        .await
        .map_err(|_| DaemonError::ChannelClosed("install response"))?;
    outcome.map_err(DaemonError::Protocol)
}

async fn set_watcher_enabled(
    watcher_ctl_tx: &mpsc::Sender<WatcherControl>,
    enabled: bool,
) -> Result<WatcherSnapshot, DaemonError> {
    let (tx, rx) = oneshot::channel();
    watcher_ctl_tx
        .send(WatcherControl::SetEnabled {
            enabled,
            respond_to: tx,
        })
        .await
        .map_err(|_| DaemonError::ChannelClosed("watcher control"))?;
    rx.await
        .map_err(|_| DaemonError::ChannelClosed("watcher response"))
}

async fn query_watcher(
    watcher_ctl_tx: &mpsc::Sender<WatcherControl>,
) -> Result<WatcherSnapshot, DaemonError> {
    let (tx, rx) = oneshot::channel();
    watcher_ctl_tx
        .send(WatcherControl::Query { respond_to: tx })
        .await
        .map_err(|_| DaemonError::ChannelClosed("watcher control"))?;
    rx.await
        .map_err(|_| DaemonError::ChannelClosed("watcher response"))
}

async fn log_rotation_task(
    home: PathBuf,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Result<(), DaemonError> {
    let mut interval = tokio::time::interval(Duration::from_secs(60));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    interval.tick().await; // consume the first immediate tick

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = interval.tick() => {
                let home = home.clone();
                tokio::task::spawn_blocking(move || {
                    crate::log_rotation::rotate_logs(&home);
                })
                .await
                .ok(); // rotation failures are logged inside rotate_logs
            }
        }
    }
    Ok(())
}

async fn push_notice(notices: &Arc<RwLock<NoticeQueue>>, notice: InstallNotice) {
    let mut queue = notices.write().await;
    if queue.len() >= MAX_PENDING_NOTICES {
        queue.pop_front();
    }
    queue.push_back(notice);
}

fn notice_from_report(report: &ImageReport) -> InstallNotice {
    InstallNotice {
        image: report.image.clone(),
        installed: report.installed.clone(),
        failed: report.failed.len(),
        at: Utc::now(),
    }
}

fn build_install_summary(
    source: &'static str,
    report: &ImageReport,
    duration: Duration,
) -> InstallSummary {
    InstallSummary {
        image: report.image.display().to_string(),
        source: source.to_string(),
        volumes: report
            .volumes
            .iter()
            .map(|v| v.display().to_string())
            .collect(),
        installed: report
            .installed
            .iter()
            .map(|p| p.display().to_string())
            .collect(),
        failed: report
            .failed
            .iter()
            .map(|f| FailedBundle {
                bundle: f.bundle.clone(),
                reason: f.reason.clone(),
            })
            .collect(),
        cleanup: describe_cleanup(&report.cleanup),
        duration_ms: duration.as_millis() as u64,
    }
}

fn describe_cleanup(outcome: &CleanupOutcome) -> String {
    match outcome {
        CleanupOutcome::Disabled => "disabled".to_string(),
        CleanupOutcome::Attempted { detached, deleted } => {
            format!("detached={detached} deleted={deleted}")
        }
    }
}

fn watcher_snapshot(enabled: bool, session: &DownloadsWatcher) -> WatcherSnapshot {
    WatcherSnapshot {
        enabled,
        dir: session.dir().display().to_string(),
        seen: session.seen_count(),
    }
}

/// Override from settings, then the platform downloads dir, then
/// `<home>/Downloads`.
fn resolve_watch_dir(home: &Path, settings: &dockhand_core::Settings) -> PathBuf {
    settings
        .watched_dir()
        .unwrap_or_else(|| home.join("Downloads"))
}

fn is_relevant_event_kind(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Create(_) | EventKind::Modify(_))
}

fn ensure_runtime_dirs(home: &Path) -> Result<(), DaemonError> {
    settings::dockhand_dir_at(home)?;
    let logs = crate::paths::logs_dir(home);
    if !logs.exists() {
        fs::create_dir_all(&logs).map_err(|e| io_err(&logs, e))?;
    }
    Ok(())
}

fn prepare_socket_for_bind(socket: &Path) -> Result<(), DaemonError> {
    if !socket.exists() {
        return Ok(());
    }

    match StdUnixStream::connect(socket) {
        Ok(_) => {
            return Err(DaemonError::Protocol(format!(
                "daemon socket already in use: {}",
                socket.display()
            )));
        }
        Err(err) => {
            tracing::warn!(
                socket = %socket.display(),
                error = %err,
                "removing stale daemon socket before bind",
            );
        }
    }

    match fs::remove_file(socket) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(io_err(socket, err)),
    }
}

async fn write_response(
    writer: &mut OwnedWriteHalf,
    response: &DaemonResponse,
) -> Result<(), DaemonError> {
    let payload = serde_json::to_string(response)?;
    writer
        .write_all(payload.as_bytes())
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| io_err("daemon socket write", e))?;
    writer
        .flush()
        .await
        .map_err(|e| io_err("daemon socket flush", e))?;
    Ok(())
}

fn handle_join(
    task: &str,
    result: Result<Result<(), DaemonError>, tokio::task::JoinError>,
) -> Result<(), DaemonError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(DaemonError::Protocol(format!(
            "{task} task join failure: {err}"
        ))),
    }
}

fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Output lands in the launchd-redirected log file; no color codes there.
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .try_init();
}

#[cfg(unix)]
fn set_socket_permissions(path: &Path) -> Result<(), DaemonError> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}

#[cfg(not(unix))]
fn set_socket_permissions(_path: &Path) -> Result<(), DaemonError> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::ffi::OsStr;

    use dockhand_core::Settings;
    use tempfile::TempDir;
    use tokio::time::timeout;

    use super::*;

    fn sample_notice(image: &str) -> InstallNotice {
        InstallNotice {
            image: PathBuf::from("/dl").join(image),
            installed: vec![PathBuf::from("/Applications/App.app")],
            failed: 0,
            at: Utc::now(),
        }
    }

    // ─── Watcher task ──────────────────────────────────────────────────────────

    struct WatchRig {
        _home: TempDir,
        downloads: TempDir,
        ctl_tx: mpsc::Sender<WatcherControl>,
        shutdown_tx: broadcast::Sender<()>,
        watcher: tokio::task::JoinHandle<Result<(), DaemonError>>,
        seen_rx: mpsc::UnboundedReceiver<PathBuf>,
    }

    /// Watcher task against a temp downloads dir, with a stub processor
    /// that acks every job and records the dispatched image.
    async fn spawn_watch_rig() -> WatchRig {
        let home = TempDir::new().expect("home");
        let downloads = TempDir::new().expect("downloads");
        let initial = Settings {
            downloads_dir: Some(downloads.path().to_path_buf()),
            ..Settings::default()
        };
        settings::save_at(home.path(), &initial).expect("save settings");

        let (install_tx, mut install_rx) = mpsc::channel::<InstallJob>(8);
        let (ctl_tx, ctl_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(4);

        let watcher = tokio::spawn(watcher_task(
            home.path().to_path_buf(),
            install_tx,
            ctl_rx,
            shutdown_tx.subscribe(),
        ));

        let (seen_tx, seen_rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(job) = install_rx.recv().await {
                let _ = seen_tx.send(job.image.clone());
                let _ = job.respond_to.send(Err("not installing in tests".to_string()));
            }
        });

        // A control round trip proves the notify source is registered.
        query_watcher(&ctl_tx).await.expect("watcher ready");

        WatchRig {
            _home: home,
            downloads,
            ctl_tx,
            shutdown_tx,
            watcher,
            seen_rx,
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn watcher_dispatches_each_new_image_once() {
        let mut rig = spawn_watch_rig().await;

        fs::write(rig.downloads.path().join("One.dmg"), b"x").expect("write image");
        let first = timeout(Duration::from_secs(5), rig.seen_rx.recv())
            .await
            .expect("first dispatch")
            .expect("watcher channel open");
        assert_eq!(first.file_name(), Some(OsStr::new("One.dmg")));

        // Rewriting a dispatched image must not dispatch it again.
        fs::write(rig.downloads.path().join("One.dmg"), b"xx").expect("rewrite image");
        fs::write(rig.downloads.path().join("Two.dmg"), b"x").expect("write second image");
        let second = timeout(Duration::from_secs(5), rig.seen_rx.recv())
            .await
            .expect("second dispatch")
            .expect("watcher channel open");
        assert_eq!(second.file_name(), Some(OsStr::new("Two.dmg")));

        let _ = rig.shutdown_tx.send(());
        rig.watcher.await.expect("join").expect("watcher exit");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn disabling_and_reenabling_resets_the_session() {
        let mut rig = spawn_watch_rig().await;

        fs::write(rig.downloads.path().join("A.dmg"), b"x").expect("write image");
        let first = timeout(Duration::from_secs(5), rig.seen_rx.recv())
            .await
            .expect("dispatch")
            .expect("watcher channel open");
        assert_eq!(first.file_name(), Some(OsStr::new("A.dmg")));

        let off = set_watcher_enabled(&rig.ctl_tx, false).await.expect("disable");
        assert!(!off.enabled);
        assert_eq!(off.seen, 1);

        // Arrivals while disabled are not dispatched...
        fs::write(rig.downloads.path().join("B.dmg"), b"x").expect("write while disabled");
        timeout(Duration::from_millis(300), rig.seen_rx.recv())
            .await
            .expect_err("no dispatch while disabled");

        let on = set_watcher_enabled(&rig.ctl_tx, true).await.expect("enable");
        assert!(on.enabled);
        assert_eq!(on.seen, 0, "re-enable starts a fresh session");

        // ...but the fresh session picks everything up on the next event.
        fs::write(rig.downloads.path().join("C.dmg"), b"x").expect("write after enable");
        let mut names = Vec::new();
        for _ in 0..3 {
            let path = timeout(Duration::from_secs(5), rig.seen_rx.recv())
                .await
                .expect("dispatch")
                .expect("watcher channel open");
            names.push(path.file_name().expect("file name").to_string_lossy().into_owned());
        }
        names.sort();
        assert_eq!(names, vec!["A.dmg", "B.dmg", "C.dmg"]);

        let _ = rig.shutdown_tx.send(());
        rig.watcher.await.expect("join").expect("watcher exit");
    }

    // ─── Install processor ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn processor_reports_failure_for_a_missing_image() {
        let home = TempDir::new().expect("home");
        let notices = Arc::new(RwLock::new(NoticeQueue::new()));
        let (install_tx, install_rx) = mpsc::channel(4);
        let (shutdown_tx, _) = broadcast::channel(4);

        let processor = tokio::spawn(install_processor_task(
            home.path().to_path_buf(),
            notices.clone(),
            install_rx,
            shutdown_tx.subscribe(),
        ));

        let err = enqueue_install(&install_tx, PathBuf::from("/nonexistent/Fake.dmg"), "socket")
            .await
            .expect_err("missing image cannot install");
        assert!(matches!(err, DaemonError::Protocol(_)));
        assert!(notices.read().await.is_empty(), "failed run leaves no notice");

        let _ = shutdown_tx.send(());
        processor.await.expect("join").expect("processor exit");
    }

    #[tokio::test]
    async fn enqueue_install_round_trips_through_the_queue() {
        let (install_tx, mut install_rx) = mpsc::channel::<InstallJob>(4);
        tokio::spawn(async move {
            while let Some(job) = install_rx.recv().await {
                let summary = InstallSummary {
                    image: job.image.display().to_string(),
                    source: job.source.to_string(),
                    volumes: Vec::new(),
                    installed: vec!["/Applications/App.app".to_string()],
                    failed: Vec::new(),
                    cleanup: "disabled".to_string(),
                    duration_ms: 5,
                };
                let _ = job.respond_to.send(Ok(summary));
            }
        });

        let summary = enqueue_install(&install_tx, PathBuf::from("/dl/App.dmg"), "socket")
            .await
            .expect("summary");
        assert_eq!(summary.image, "/dl/App.dmg");
        assert_eq!(summary.source, "socket");
        assert_eq!(summary.installed, vec!["/Applications/App.app".to_string()]);
    }

    // ─── Notices and payload shaping ───────────────────────────────────────────

    #[tokio::test]
    async fn notice_queue_drops_oldest_at_capacity() {
        let notices = Arc::new(RwLock::new(NoticeQueue::new()));
        for i in 0..(MAX_PENDING_NOTICES + 1) {
            push_notice(&notices, sample_notice(&format!("{i}.dmg"))).await;
        }

        let queue = notices.read().await;
        assert_eq!(queue.len(), MAX_PENDING_NOTICES);
        assert_eq!(queue.front().expect("front").image, PathBuf::from("/dl/1.dmg"));
        assert_eq!(queue.back().expect("back").image, PathBuf::from("/dl/32.dmg"));
    }

    #[tokio::test]
    async fn status_payload_reports_watcher_and_notice_count() {
        let home = TempDir::new().expect("home");
        let notices = Arc::new(RwLock::new(NoticeQueue::new()));
        push_notice(&notices, sample_notice("A.dmg")).await;
        push_notice(&notices, sample_notice("B.dmg")).await;

        let (ctl_tx, mut ctl_rx) = mpsc::channel(4);
        tokio::spawn(async move {
            while let Some(
                WatcherControl::Query { respond_to }
                | WatcherControl::SetEnabled { respond_to, .. },
            ) = ctl_rx.recv().await
            {
                let _ = respond_to.send(WatcherSnapshot {
                    enabled: false,
                    dir: "/dl".to_string(),
                    seen: 7,
                });
            }
        });

        let payload = build_status_payload(home.path(), notices, &ctl_tx, 1_000).await;
        assert_eq!(payload["running"], json!(true));
        assert_eq!(payload["label"], json!("dev.dockhand.daemon"));
        assert_eq!(payload["started_at_unix"], json!(1_000u64));
        assert_eq!(payload["pending_notices"], json!(2));
        assert_eq!(payload["watcher"]["enabled"], json!(false));
        assert_eq!(payload["watcher"]["seen"], json!(7));
    }

    #[test]
    fn install_summary_flattens_the_report() {
        let report = ImageReport {
            image: PathBuf::from("/dl/Tool.dmg"),
            volumes: vec![PathBuf::from("/Volumes/Tool")],
            installed: vec![PathBuf::from("/Applications/Tool.app")],
            failed: vec![dockhand_install::CopyFailure {
                bundle: "Old.app".to_string(),
                reason: "destination already exists".to_string(),
            }],
            cleanup: CleanupOutcome::Attempted {
                detached: true,
                deleted: false,
            },
        };

        let summary = build_install_summary("watcher", &report, Duration::from_millis(250));
        assert_eq!(summary.image, "/dl/Tool.dmg");
        assert_eq!(summary.source, "watcher");
        assert_eq!(summary.volumes, vec!["/Volumes/Tool".to_string()]);
        assert_eq!(summary.installed, vec!["/Applications/Tool.app".to_string()]);
        assert_eq!(summary.failed[0].bundle, "Old.app");
        assert_eq!(summary.cleanup, "detached=true deleted=false");
        assert_eq!(summary.duration_ms, 250);
    }

    // ─── Socket server ─────────────────────────────────────────────────────────

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn socket_server_round_trips_status_and_stop() {
        let home = TempDir::new().expect("home");
        let notices = Arc::new(RwLock::new(NoticeQueue::new()));
        let (install_tx, _install_rx) = mpsc::channel(8);
        let (ctl_tx, mut ctl_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(4);

        tokio::spawn(async move {
            while let Some(
                WatcherControl::Query { respond_to }
                | WatcherControl::SetEnabled { respond_to, .. },
            ) = ctl_rx.recv().await
            {
                let _ = respond_to.send(WatcherSnapshot {
                    enabled: true,
                    dir: "/dl".to_string(),
                    seen: 0,
                });
            }
        });

        let server = tokio::spawn(socket_server_task(
            home.path().to_path_buf(),
            notices,
            install_tx,
            ctl_tx,
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
            42,
        ));

        let socket = socket_path(home.path());
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let status = {
            let home = home.path().to_path_buf();
            tokio::task::spawn_blocking(move || crate::protocol::request_status(&home))
                .await
                .expect("join")
                .expect("status")
        };
        assert_eq!(status["running"], json!(true));
        assert_eq!(status["started_at_unix"], json!(42));
        assert_eq!(status["watcher"]["enabled"], json!(true));

        let home_for_stop = home.path().to_path_buf();
        tokio::task::spawn_blocking(move || crate::protocol::request_stop(&home_for_stop))
            .await
            .expect("join")
            .expect("stop");

        server.await.expect("join").expect("server exit");
        assert!(!socket.exists(), "socket removed on shutdown");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn install_and_eject_commands_round_trip_over_the_socket() {
        let home = TempDir::new().expect("home");
        let volumes = TempDir::new().expect("volumes");
        let initial = Settings {
            volumes_root: Some(volumes.path().to_path_buf()),
            install_dir: Some(home.path().join("Applications")),
            ..Settings::default()
        };
        settings::save_at(home.path(), &initial).expect("save settings");

        let image = home.path().join("Broken.dmg");
        fs::write(&image, b"not a disk image").expect("write image");

        let notices = Arc::new(RwLock::new(NoticeQueue::new()));
        let (install_tx, install_rx) = mpsc::channel(8);
        let (ctl_tx, _ctl_rx) = mpsc::channel(8);
        let (shutdown_tx, _) = broadcast::channel(4);

        let processor = tokio::spawn(install_processor_task(
            home.path().to_path_buf(),
            notices.clone(),
            install_rx,
            shutdown_tx.subscribe(),
        ));
        let server = tokio::spawn(socket_server_task(
            home.path().to_path_buf(),
            notices.clone(),
            install_tx,
            ctl_tx,
            shutdown_tx.clone(),
            shutdown_tx.subscribe(),
            42,
        ));

        let socket = socket_path(home.path());
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        // Attach cannot succeed for this image, so the install arm must come
        // back with an error response instead of a summary.
        let err = {
            let home = home.path().to_path_buf();
            tokio::task::spawn_blocking(move || crate::protocol::request_install(&home, image))
                .await
                .expect("join")
                .expect_err("broken image cannot install")
        };
        assert!(matches!(err, DaemonError::Protocol(_)), "got: {err:?}");
        assert!(notices.read().await.is_empty(), "failed run leaves no notice");

        // Nothing is mounted under the volumes override, so a reachable
        // diskutil ejects nothing; without one the arm answers with an error.
        let eject = {
            let home = home.path().to_path_buf();
            tokio::task::spawn_blocking(move || crate::protocol::request_eject(&home))
                .await
                .expect("join")
        };
        match eject {
            Ok(outcomes) => assert_eq!(outcomes, json!([])),
            Err(DaemonError::Protocol(_)) => {}
            Err(other) => panic!("unexpected eject error: {other:?}"),
        }

        let home_for_stop = home.path().to_path_buf();
        tokio::task::spawn_blocking(move || crate::protocol::request_stop(&home_for_stop))
            .await
            .expect("join")
            .expect("stop");

        server.await.expect("join").expect("server exit");
        processor.await.expect("join").expect("processor exit");
    }
}
