use anyhow::{Context, Result, anyhow};
use std::process::{Command, Output, Stdio};
use tracing::{debug, trace};

/// A builder for executing runtime CLI commands with unified error handling
pub struct Cmd<'a> {
    command: &'a str,
    args: Vec<&'a str>,
}

impl<'a> Cmd<'a> {
    /// Create a new command builder
    pub fn new(command: &'a str) -> Self {
        Self {
            command,
            args: Vec::new(),
        }
    }

    /// Add a single argument
    pub fn arg(mut self, arg: &'a str) -> Self {
        self.args.push(arg);
        self
    }

    /// Add multiple arguments
    pub fn args(mut self, args: &[&'a str]) -> Self {
        self.args.extend_from_slice(args);
        self
    }

    /// Build the underlying `std::process::Command` without running it
    pub fn into_command(self) -> Command {
        let mut cmd = Command::new(self.command);
        cmd.args(&self.args);
        cmd
    }

    /// Execute the command and return the output
    /// Returns an error if the command fails (non-zero exit code)
    pub fn run(self) -> Result<Output> {
        let Cmd { command, args } = self;
        trace!(command, args = ?args, "cmd:run start");

        let output = Command::new(command).args(&args).output().with_context(|| {
            format!("Failed to execute command: {} {}", command, args.join(" "))
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!(
                command,
                args = ?args,
                status = ?output.status.code(),
                stderr = %stderr.trim(),
                "cmd:run failure"
            );
            return Err(anyhow!(
                "Command failed: {} {}\n{}",
                command,
                args.join(" "),
                stderr.trim()
            ));
        }
        trace!(command, "cmd:run success");
        Ok(output)
    }

    /// Execute the command and return stdout as a trimmed string
    pub fn run_and_capture_stdout(self) -> Result<String> {
        let output = self.run()?;
        Ok(String::from_utf8(output.stdout)?.trim().to_string())
    }

    /// Execute the command attached to this process's stdio and return its exit code.
    ///
    /// A non-zero exit is not an error here; the caller decides what it means.
    /// `stdin` controls whether the child reads from our stdin or from /dev/null.
    pub fn run_attached(self, stdin: bool) -> Result<i32> {
        let Cmd { command, args } = self;
        debug!(command, args = ?args, stdin, "cmd:attached start");

        let status = Command::new(command)
            .args(&args)
            .stdin(if stdin { Stdio::inherit() } else { Stdio::null() })
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .with_context(|| {
                format!("Failed to execute command: {} {}", command, args.join(" "))
            })?;

        let code = status.code().unwrap_or(1);
        debug!(command, code, "cmd:attached finished");
        Ok(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_and_capture_stdout_trims() {
        let out = Cmd::new("sh")
            .args(&["-c", "printf '  hello \\n'"])
            .run_and_capture_stdout()
            .unwrap();
        assert_eq!(out, "hello");
    }

    #[test]
    fn test_run_failure_includes_stderr() {
        let err = Cmd::new("sh")
            .args(&["-c", "echo nope >&2; exit 3"])
            .run()
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("Command failed"));
        assert!(msg.contains("nope"));
    }

    #[test]
    fn test_run_attached_returns_exit_code() {
        let code = Cmd::new("sh")
            .args(&["-c", "exit 7"])
            .run_attached(false)
            .unwrap();
        assert_eq!(code, 7);
    }

    #[test]
    fn test_missing_binary_is_error() {
        let result = Cmd::new("drm-definitely-not-a-binary").run();
        assert!(result.is_err());
    }
}
