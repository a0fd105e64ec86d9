//! Subprocess helpers.
//!
//! Every external tool is invoked with an argument vector, never through a
//! shell, so paths with spaces or quotes need no escaping.
//!
//! ```rust,ignore
//! use vmtest_kbuild::process::Cmd;
//!
//! let out = Cmd::new("make")
//!     .args(["-C", "linux", "-s", "kernelrelease"])
//!     .error_msg("make kernelrelease failed")
//!     .run()?;
//! println!("{}", out.stdout_trimmed());
//! ```

use anyhow::{Context, Result};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use std::process::{Command, ExitStatus, Output, Stdio};
use tracing::debug;

use crate::error::KbuildError;

/// Captured result of a finished command.
#[derive(Debug)]
pub struct CommandResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_trimmed(&self) -> &str {
        self.stdout.trim()
    }
}

/// Builder for a single external command invocation.
#[derive(Debug, Clone)]
pub struct Cmd {
    program: OsString,
    args: Vec<OsString>,
    error_msg: Option<String>,
    allow_fail: bool,
}

impl Cmd {
    pub fn new(program: impl AsRef<OsStr>) -> Self {
        Self {
            program: program.as_ref().to_os_string(),
            args: Vec::new(),
            error_msg: None,
            allow_fail: false,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn arg_path(self, path: &Path) -> Self {
        self.arg(path.as_os_str())
    }

    /// Message attached as context when the command fails.
    pub fn error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = Some(msg.into());
        self
    }

    /// Return the result even when the command exits non-zero.
    pub fn allow_fail(mut self) -> Self {
        self.allow_fail = true;
        self
    }

    /// Human readable rendering of the command line, used in errors and logs.
    pub fn display(&self) -> String {
        display_command(&self.program, &self.args)
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// Run with stdout and stderr captured.
    pub fn run(self) -> Result<CommandResult> {
        debug!(command = %self.display(), "running");
        let output: Output = self
            .command()
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn `{}`", self.display()))?;

        let result = CommandResult {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };

        if !self.allow_fail {
            self.check(result.status, Some(result.stderr.trim()))?;
        }
        Ok(result)
    }

    /// Run with stdio inherited so the user sees the tool's own output.
    pub fn run_interactive(self) -> Result<ExitStatus> {
        debug!(command = %self.display(), "running");
        let status = self
            .command()
            .stdin(Stdio::null())
            .status()
            .with_context(|| format!("failed to spawn `{}`", self.display()))?;

        if !self.allow_fail {
            self.check(status, None)?;
        }
        Ok(status)
    }

    fn check(&self, status: ExitStatus, stderr: Option<&str>) -> Result<()> {
        if let Err(err) = status_to_result(&self.display(), status) {
            let mut err = anyhow::Error::new(err);
            if let Some(stderr) = stderr.filter(|s| !s.is_empty()) {
                err = err.context(format!("stderr: {}", stderr));
            }
            return Err(match &self.error_msg {
                Some(msg) => err.context(msg.clone()),
                None => err,
            });
        }
        Ok(())
    }
}

/// Map an exit status onto the error taxonomy.
pub fn status_to_result(command: &str, status: ExitStatus) -> std::result::Result<(), KbuildError> {
    if status.success() {
        return Ok(());
    }
    match status.code() {
        Some(code) => Err(KbuildError::CommandFailed {
            command: command.to_string(),
            code,
        }),
        None => Err(KbuildError::CommandSignaled {
            command: command.to_string(),
        }),
    }
}

pub(crate) fn display_command(program: &OsStr, args: &[OsString]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(OsString::as_os_str))
        .map(|part| part.to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::find_kbuild_error;

    #[test]
    fn test_run_captures_stdout() {
        let out = Cmd::new("echo").args(["hello", "world"]).run().unwrap();
        assert!(out.success());
        assert_eq!(out.stdout_trimmed(), "hello world");
    }

    #[test]
    fn test_failure_carries_exit_code() {
        let err = Cmd::new("sh")
            .args(["-c", "exit 7"])
            .error_msg("sh failed")
            .run()
            .unwrap_err();

        assert!(err.to_string().contains("sh failed"));
        match find_kbuild_error(&err) {
            Some(KbuildError::CommandFailed { code, command }) => {
                assert_eq!(*code, 7);
                assert!(command.starts_with("sh -c"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_allow_fail_returns_result() {
        let out = Cmd::new("sh").args(["-c", "exit 1"]).allow_fail().run().unwrap();
        assert!(!out.success());
    }

    #[test]
    fn test_missing_program_is_spawn_error() {
        let err = Cmd::new("definitely_not_a_real_command_12345")
            .run()
            .unwrap_err();
        assert!(find_kbuild_error(&err).is_none());
    }
}
