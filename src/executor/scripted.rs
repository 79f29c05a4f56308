//! Scripted runner
//!
//! A [`CommandRunner`] that never starts a process. It records every command
//! it is asked to run and answers from a list of canned replies matched
//! against the rendered command line. The CLI uses it for `--dry-run`.

use super::command::{ProcessCommand, ProcessOutput};
use super::traits::CommandRunner;
use crate::pipeline::ReleaseResult;
use parking_lot::Mutex;

#[derive(Debug, Clone)]
struct Reply {
    pattern: String,
    output: ProcessOutput,
    once: bool,
}

/// Runner that records commands and replays canned outputs
#[derive(Debug, Default)]
pub struct ScriptedRunner {
    replies: Mutex<Vec<Reply>>,
    calls: Mutex<Vec<ProcessCommand>>,
}

impl ScriptedRunner {
    /// Creates a runner where every command succeeds with empty output
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn push(self, pattern: &str, output: ProcessOutput, once: bool) -> Self {
        self.replies.lock().push(Reply {
            pattern: pattern.to_string(),
            output,
            once,
        });
        self
    }

    /// Answers commands containing `pattern` with a successful stdout
    #[must_use]
    pub fn reply(self, pattern: &str, stdout: &str) -> Self {
        self.push(pattern, ProcessOutput::success(stdout), false)
    }

    /// Fails every command containing `pattern`
    #[must_use]
    pub fn fail_on(self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.push(pattern, ProcessOutput::failure(exit_code, stderr), false)
    }

    /// Fails only the next command containing `pattern`
    #[must_use]
    pub fn fail_once(self, pattern: &str, exit_code: i32, stderr: &str) -> Self {
        self.push(pattern, ProcessOutput::failure(exit_code, stderr), true)
    }

    /// Rendered command lines seen so far, in call order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(ToString::to_string).collect()
    }

    /// Rendered command lines containing `pattern`
    #[must_use]
    pub fn calls_matching(&self, pattern: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|line| line.contains(pattern))
            .collect()
    }

    /// Forgets recorded calls, keeping the replies
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        let line = command.to_string();
        tracing::info!(command = %line, "Would run");
        self.calls.lock().push(command.clone());

        let mut replies = self.replies.lock();
        let Some(index) = replies.iter().position(|r| line.contains(&r.pattern)) else {
            return Ok(ProcessOutput::default());
        };

        let output = if replies[index].once {
            replies.remove(index).output
        } else {
            replies[index].output.clone()
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_runner_defaults_to_success() {
        let runner = ScriptedRunner::new();
        let output = runner.run(&ProcessCommand::new("docker").arg("info")).unwrap();

        assert!(output.is_success());
        assert_eq!(runner.calls(), vec!["docker info".to_string()]);
    }

    #[test]
    fn test_scripted_runner_first_match_wins() {
        let runner = ScriptedRunner::new()
            .reply("rev-parse", "abc1234\n")
            .reply("git", "other");

        let output = runner
            .run(&ProcessCommand::new("git").args(["rev-parse", "--short", "HEAD"]))
            .unwrap();
        assert_eq!(output.stdout_trimmed(), "abc1234");
    }

    #[test]
    fn test_scripted_runner_fail_once() {
        let runner = ScriptedRunner::new().fail_once("push", 1, "timeout");
        let cmd = ProcessCommand::new("docker").args(["push", "acme/app:1.7"]);

        assert!(runner.run(&cmd).unwrap().is_failure());
        assert!(runner.run(&cmd).unwrap().is_success());
        assert_eq!(runner.calls_matching("push").len(), 2);
    }

    #[test]
    fn test_scripted_runner_clear_calls() {
        let runner = ScriptedRunner::new();
        runner.run(&ProcessCommand::new("true")).unwrap();
        runner.clear_calls();
        assert!(runner.calls().is_empty());
    }
}
