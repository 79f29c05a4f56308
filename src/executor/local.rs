//! Local process runner
//!
//! Runs commands on the host with `std::process::Command`, either capturing
//! their output or streaming it line by line through `tracing` while it is
//! being captured.

use super::command::{ProcessCommand, ProcessOutput};
use super::traits::CommandRunner;
use crate::pipeline::{ReleaseError, ReleaseResult};
use std::io::{BufRead, BufReader, Read};
use std::process::{Command, Stdio};
use std::time::Instant;

/// Runner that executes commands on the host system
#[derive(Debug, Clone, Default)]
pub struct LocalRunner {
    /// Forward output lines to the log while the command runs
    streaming: bool,
}

impl LocalRunner {
    /// Creates a capturing runner
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables or disables streaming of output lines
    #[must_use]
    pub fn with_streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    fn prepare(command: &ProcessCommand) -> Command {
        let mut cmd = Command::new(&command.program);
        cmd.args(&command.args);
        if let Some(cwd) = &command.cwd {
            cmd.current_dir(cwd);
        }
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    fn execute_captured(command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        let output = Self::prepare(command).output().map_err(|e| {
            ReleaseError::Io(format!("failed to start '{}': {e}", command.program))
        })?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
            duration: std::time::Duration::ZERO,
        })
    }

    fn execute_streaming(command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        let mut child = Self::prepare(command).spawn().map_err(|e| {
            ReleaseError::Io(format!("failed to start '{}': {e}", command.program))
        })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReleaseError::Io("stdout not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ReleaseError::Io("stderr not captured".to_string()))?;

        let program = command.program.clone();
        let (stdout, stderr) = std::thread::scope(|scope| {
            let out = scope.spawn(|| forward_lines(stdout, &program, false));
            let err = scope.spawn(|| forward_lines(stderr, &program, true));
            (
                out.join().unwrap_or_default(),
                err.join().unwrap_or_default(),
            )
        });

        let status = child.wait()?;

        Ok(ProcessOutput {
            stdout,
            stderr,
            exit_code: status.code().unwrap_or(-1),
            duration: std::time::Duration::ZERO,
        })
    }
}

fn forward_lines(reader: impl Read, program: &str, is_stderr: bool) -> String {
    let mut captured = String::new();
    for line in BufReader::new(reader).lines().map_while(Result::ok) {
        if is_stderr {
            tracing::warn!(program = %program, "{line}");
        } else {
            tracing::info!(program = %program, "{line}");
        }
        captured.push_str(&line);
        captured.push('\n');
    }
    captured
}

impl CommandRunner for LocalRunner {
    fn run(&self, command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        tracing::debug!(command = %command, "Executing command");

        let start = Instant::now();
        let mut output = if self.streaming {
            Self::execute_streaming(command)?
        } else {
            Self::execute_captured(command)?
        };
        output.duration = start.elapsed();

        tracing::debug!(
            command = %command,
            exit_code = output.exit_code,
            duration_ms = output.duration.as_millis(),
            "Command finished"
        );

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_runner_captures_stdout() {
        let runner = LocalRunner::new();
        let output = runner
            .run(&ProcessCommand::new("sh").args(["-c", "echo 1.7.3"]))
            .unwrap();

        assert!(output.is_success());
        assert_eq!(output.stdout_trimmed(), "1.7.3");
    }

    #[test]
    fn test_local_runner_reports_exit_code() {
        let runner = LocalRunner::new();
        let output = runner
            .run(&ProcessCommand::new("sh").args(["-c", "echo oops >&2; exit 3"]))
            .unwrap();

        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[test]
    fn test_local_runner_uses_cwd() {
        let temp_dir = tempfile::tempdir().unwrap();
        let runner = LocalRunner::new();
        let output = runner
            .run(
                &ProcessCommand::new("sh")
                    .args(["-c", "pwd"])
                    .current_dir(temp_dir.path()),
            )
            .unwrap();

        assert!(output.stdout_trimmed().ends_with(
            temp_dir
                .path()
                .file_name()
                .unwrap()
                .to_string_lossy()
                .as_ref()
        ));
    }

    #[test]
    fn test_local_runner_streaming() {
        let runner = LocalRunner::new().with_streaming(true);
        let output = runner
            .run(&ProcessCommand::new("sh").args(["-c", "echo one; echo two"]))
            .unwrap();

        assert_eq!(output.stdout, "one\ntwo\n");
    }

    #[test]
    fn test_local_runner_missing_program() {
        let runner = LocalRunner::new();
        let result = runner.run(&ProcessCommand::new("definitely-not-a-real-binary-xyz"));

        assert!(matches!(result, Err(ReleaseError::Io(_))));
    }
}
