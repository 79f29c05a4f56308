//! Execution traits
//!
//! This module defines the seams between the release stages and the
//! processes they drive.

use super::command::{ProcessCommand, ProcessOutput};
use crate::pipeline::{Pipeline, PipelineReport, ReleaseError, ReleaseResult, ValidationError};

/// Runs external processes on behalf of the pipeline
///
/// `run` only fails when the process could not be started at all; a
/// non-zero exit code is reported through [`ProcessOutput::exit_code`].
#[allow(clippy::missing_errors_doc)]
pub trait CommandRunner: Send + Sync {
    /// Runs a command to completion and captures its output
    fn run(&self, command: &ProcessCommand) -> ReleaseResult<ProcessOutput>;

    /// Runs a command and turns a non-zero exit into [`ReleaseError::CommandFailed`]
    fn run_checked(&self, command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        let output = self.run(command)?;
        if output.is_failure() {
            return Err(ReleaseError::CommandFailed {
                program: command.program.clone(),
                code: output.exit_code,
                stderr: output.stderr.trim().to_string(),
            });
        }
        Ok(output)
    }
}

impl<T: CommandRunner + ?Sized> CommandRunner for &T {
    fn run(&self, command: &ProcessCommand) -> ReleaseResult<ProcessOutput> {
        (**self).run(command)
    }
}

/// Trait for executing release pipelines
#[allow(clippy::missing_errors_doc)]
pub trait PipelineExecutor {
    /// Executes a pipeline, halting at the first failing stage
    fn execute(&self, pipeline: &Pipeline) -> ReleaseResult<PipelineReport>;

    /// Validates a pipeline and the configuration it would run with
    fn validate(&self, pipeline: &Pipeline) -> Result<(), ValidationError>;

    /// Performs a health check of the backing tools
    fn health_check(&self) -> HealthStatus;
}

/// Health status of a backing tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Tool is healthy
    Healthy,

    /// Tool answers but is degraded (e.g. daemon not reachable)
    Degraded {
        /// Reason for degradation
        reason: String,
    },

    /// Tool is unusable
    Unhealthy {
        /// Reason for being unhealthy
        reason: String,
    },
}

impl HealthStatus {
    /// Returns true if healthy or degraded
    #[must_use]
    pub fn is_operational(&self) -> bool {
        !matches!(self, Self::Unhealthy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedRunner;

    #[test]
    fn test_run_checked_maps_exit_code() {
        let runner = ScriptedRunner::new().fail_on("docker push", 1, "denied: requested access");
        let cmd = ProcessCommand::new("docker").args(["push", "acme/app:1.7"]);

        let err = runner.run_checked(&cmd).unwrap_err();
        assert_eq!(
            err,
            ReleaseError::CommandFailed {
                program: "docker".to_string(),
                code: 1,
                stderr: "denied: requested access".to_string(),
            }
        );
    }

    #[test]
    fn test_run_checked_passes_success() {
        let runner = ScriptedRunner::new().reply("version", "1.7.3\n");
        let cmd = ProcessCommand::new("docker").args(["run", "--rm", "img", "version"]);

        let output = runner.run_checked(&cmd).unwrap();
        assert_eq!(output.stdout_trimmed(), "1.7.3");
    }

    #[test]
    fn test_health_status_is_operational() {
        assert!(HealthStatus::Healthy.is_operational());
        assert!(
            HealthStatus::Degraded {
                reason: "daemon".to_string()
            }
            .is_operational()
        );
        assert!(
            !HealthStatus::Unhealthy {
                reason: "missing".to_string()
            }
            .is_operational()
        );
    }
}
