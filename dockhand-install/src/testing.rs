//! Test doubles for exercising the pipeline without the real disk tools.

use std::sync::Mutex;

use crate::error::InstallError;
use crate::exec::{CommandRunner, ExecOutput};

/// One invocation a [`FakeRunner`] observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RecordedCall {
    pub(crate) program: String,
    pub(crate) args: Vec<String>,
}

type RespondFn = Box<dyn Fn(&str, &[&str]) -> Result<ExecOutput, InstallError> + Send + Sync>;

/// Scripted [`CommandRunner`] that records every call.
///
/// The response closure gets the program and args, so tests can branch on
/// the subcommand (and fake side effects like a volume directory appearing
/// on attach).
pub(crate) struct FakeRunner {
    calls: Mutex<Vec<RecordedCall>>,
    respond: RespondFn,
}

impl FakeRunner {
    pub(crate) fn new(
        respond: impl Fn(&str, &[&str]) -> Result<ExecOutput, InstallError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            respond: Box::new(respond),
        }
    }

    /// Every command exits 0 with empty output.
    pub(crate) fn ok() -> Self {
        Self::new(|_, _| Ok(exit(0)))
    }

    pub(crate) fn recorded(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("calls lock").clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<ExecOutput, InstallError> {
        self.calls.lock().expect("calls lock").push(RecordedCall {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        });
        (self.respond)(program, args)
    }
}

/// An [`ExecOutput`] with the given exit code and no output.
pub(crate) fn exit(code: i32) -> ExecOutput {
    ExecOutput {
        code: Some(code),
        stdout: Vec::new(),
        stderr: Vec::new(),
    }
}

/// An [`ExecOutput`] with the given exit code and stdout.
pub(crate) fn exit_with_stdout(code: i32, stdout: &str) -> ExecOutput {
    ExecOutput {
        code: Some(code),
        stdout: stdout.as_bytes().to_vec(),
        stderr: Vec::new(),
    }
}
