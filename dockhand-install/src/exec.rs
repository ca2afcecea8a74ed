//! External command execution.
//!
//! Everything dockhand does to the outside world (`hdiutil`, `diskutil`,
//! `open`) goes through [`CommandRunner`], so pipeline behavior can be
//! exercised against a scripted runner in tests instead of the real disk
//! tools.

use std::process::Stdio;

use crate::error::InstallError;

/// Captured result of a finished external command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutput {
    /// Exit code; `None` when the child was killed by a signal.
    pub code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Lossy UTF-8 view of stderr, trimmed, for error messages.
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).trim().to_string()
    }

    /// "exit status N[: stderr]" or "terminated by signal".
    pub fn describe_failure(&self) -> String {
        let stderr = self.stderr_text();
        match self.code {
            Some(code) if stderr.is_empty() => format!("exit status {code}"),
            Some(code) => format!("exit status {code}: {stderr}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Runs external commands and reports how they exited.
///
/// A spawn failure (program missing, permission denied) is an error; a
/// non-zero exit is not. Callers decide what a bad exit means for them.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, blocking until it exits.
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, InstallError>;
}

/// Real runner delegating to `std::process::Command`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, InstallError> {
        let output = std::process::Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| InstallError::Spawn {
                program: program.to_string(),
                source: e,
            })?;
        Ok(ExecOutput {
            code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Run `program` with `args` without blocking the calling task.
///
/// Same contract as [`CommandRunner::run`]; for async call sites (the daemon
/// launches installed applications from its socket loop with this).
pub async fn run_async(program: &str, args: &[&str]) -> Result<ExecOutput, InstallError> {
    let output = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| InstallError::Spawn {
            program: program.to_string(),
            source: e,
        })?;
    Ok(ExecOutput {
        code: output.status.code(),
        stdout: output.stdout,
        stderr: output.stderr,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout_and_exit_code() {
        let out = SystemRunner.run("echo", &["hello"]).expect("run echo");
        assert!(out.success());
        assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "hello");
    }

    #[test]
    fn nonzero_exit_is_not_an_error() {
        let out = SystemRunner.run("sh", &["-c", "exit 7"]).expect("run sh");
        assert!(!out.success());
        assert_eq!(out.code, Some(7));
        assert_eq!(out.describe_failure(), "exit status 7");
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let err = SystemRunner
            .run("/nonexistent/dockhand-no-such-tool", &[])
            .unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }));
    }

    #[test]
    fn failure_description_includes_stderr() {
        let out = SystemRunner
            .run("sh", &["-c", "echo boom >&2; exit 2"])
            .expect("run sh");
        assert_eq!(out.describe_failure(), "exit status 2: boom");
    }

    #[tokio::test]
    async fn async_variant_matches_sync_contract() {
        let out = run_async("sh", &["-c", "exit 5"]).await.expect("run");
        assert_eq!(out.code, Some(5));

        let err = run_async("/nonexistent/dockhand-no-such-tool", &[])
            .await
            .unwrap_err();
        assert!(matches!(err, InstallError::Spawn { .. }));
    }
}
