use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{io_err, DaemonError};
use crate::paths::socket_path;

/// JSON newline-delimited request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonRequest {
    pub cmd: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear: Option<bool>,
}

impl DaemonRequest {
    fn new(cmd: &str) -> Self {
        Self {
            cmd: cmd.to_string(),
            image: None,
            app: None,
            enabled: None,
            clear: None,
        }
    }
}

/// JSON newline-delimited response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonResponse {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DaemonResponse {
    pub fn ok(data: Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// One queued "applications were installed" notification.
///
/// The UI layer lists these with the `notices` command and drains them with
/// `clear`; the first installed path is the launch candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallNotice {
    /// Source disk image the applications came from.
    pub image: PathBuf,
    /// Destination paths of the installed bundles, in install order.
    pub installed: Vec<PathBuf>,
    /// Bundles that failed to copy in the same run.
    pub failed: usize,
    pub at: DateTime<Utc>,
}

/// Send one JSON request to the daemon socket and return one response.
pub fn send_request(home: &Path, request: &DaemonRequest) -> Result<DaemonResponse, DaemonError> {
    let socket = socket_path(home);
    if !socket.exists() {
        return Err(DaemonError::DaemonNotRunning { socket });
    }

    let mut stream = UnixStream::connect(&socket).map_err(|err| {
        if matches!(
            err.kind(),
            std::io::ErrorKind::NotFound
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionReset
        ) {
            DaemonError::DaemonNotRunning {
                socket: socket.clone(),
            }
        } else {
            io_err(&socket, err)
        }
    })?;

    let payload = serde_json::to_string(request)?;
    stream
        .write_all(payload.as_bytes())
        .map_err(|e| io_err(&socket, e))?;
    stream.write_all(b"\n").map_err(|e| io_err(&socket, e))?;
    stream.flush().map_err(|e| io_err(&socket, e))?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    let read = reader
        .read_line(&mut line)
        .map_err(|e| io_err(&socket, e))?;
    if read == 0 {
        return Err(DaemonError::Protocol(
            "daemon closed connection before responding".to_string(),
        ));
    }

    let response: DaemonResponse = serde_json::from_str(line.trim_end())?;
    Ok(response)
}

pub fn request_status(home: &Path) -> Result<Value, DaemonError> {
    let request = DaemonRequest::new("status");

    let mut last_not_running: Option<DaemonError> = None;
    for attempt in 0..5 {
        match send_request(home, &request) {
            Ok(response) => return response_into_data(response),
            Err(err @ DaemonError::DaemonNotRunning { .. }) => {
                last_not_running = Some(err);
                if attempt < 4 {
                    sleep(Duration::from_millis(100));
                    continue;
                }
            }
            Err(err) => return Err(err),
        }
    }

    Err(last_not_running.unwrap_or_else(|| {
        DaemonError::Protocol("daemon status retry loop exited unexpectedly".to_string())
    }))
}

pub fn request_stop(home: &Path) -> Result<(), DaemonError> {
    let response = send_request(home, &DaemonRequest::new("stop"))?;
    response_into_data(response).map(|_| ())
}

/// Ask the daemon to run the install pipeline for `image`.
pub fn request_install(home: &Path, image: PathBuf) -> Result<Value, DaemonError> {
    let mut request = DaemonRequest::new("install");
    request.image = Some(image);
    let response = send_request(home, &request)?;
    response_into_data(response)
}

/// Enable or disable the downloads watcher (also persisted to settings).
pub fn request_watcher(home: &Path, enabled: bool) -> Result<Value, DaemonError> {
    let mut request = DaemonRequest::new("watcher");
    request.enabled = Some(enabled);
    let response = send_request(home, &request)?;
    response_into_data(response)
}

/// Fetch pending install notices, optionally draining the queue.
pub fn request_notices(home: &Path, clear: bool) -> Result<Vec<InstallNotice>, DaemonError> {
    let mut request = DaemonRequest::new("notices");
    if clear {
        request.clear = Some(true);
    }
    let response = send_request(home, &request)?;
    let data = response_into_data(response)?;
    Ok(serde_json::from_value(data)?)
}

/// Ask the daemon to open an installed application.
pub fn request_launch(home: &Path, app: PathBuf) -> Result<Value, DaemonError> {
    let mut request = DaemonRequest::new("launch");
    request.app = Some(app);
    let response = send_request(home, &request)?;
    response_into_data(response)
}

/// Eject every disk with a volume mounted under the volumes root.
pub fn request_eject(home: &Path) -> Result<Value, DaemonError> {
    let response = send_request(home, &DaemonRequest::new("eject"))?;
    response_into_data(response)
}

fn response_into_data(response: DaemonResponse) -> Result<Value, DaemonError> {
    if response.ok {
        Ok(response.data.unwrap_or(Value::Null))
    } else {
        Err(DaemonError::Protocol(
            response
                .error
                .unwrap_or_else(|| "unknown daemon error".to_string()),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_omits_unset_fields_on_the_wire() {
        let encoded = serde_json::to_string(&DaemonRequest::new("status")).expect("encode");
        assert_eq!(encoded, r#"{"cmd":"status"}"#);
    }

    #[test]
    fn request_with_image_roundtrips() {
        let mut request = DaemonRequest::new("install");
        request.image = Some(PathBuf::from("/tmp/App.dmg"));
        let encoded = serde_json::to_string(&request).expect("encode");
        let decoded: DaemonRequest = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(decoded.cmd, "install");
        assert_eq!(decoded.image, Some(PathBuf::from("/tmp/App.dmg")));
        assert_eq!(decoded.enabled, None);
    }

    #[test]
    fn missing_optional_fields_decode_as_none() {
        let decoded: DaemonRequest = serde_json::from_str(r#"{"cmd":"notices"}"#).expect("decode");
        assert_eq!(decoded.cmd, "notices");
        assert!(decoded.clear.is_none());
        assert!(decoded.app.is_none());
    }

    #[test]
    fn notice_roundtrips_through_json() {
        let notice = InstallNotice {
            image: PathBuf::from("/Users/t/Downloads/App.dmg"),
            installed: vec![PathBuf::from("/Applications/App.app")],
            failed: 1,
            at: Utc::now(),
        };
        let value = serde_json::to_value(&notice).expect("encode");
        let back: InstallNotice = serde_json::from_value(value).expect("decode");
        assert_eq!(back, notice);
    }

    #[test]
    fn error_response_excludes_data_field() {
        let encoded =
            serde_json::to_string(&DaemonResponse::error("nope")).expect("encode");
        assert_eq!(encoded, r#"{"ok":false,"error":"nope"}"#);
    }
}
