//! Container runtime CLI (Docker/Podman)
//!
//! Builds, queries, tags, pushes and removes images through the runtime's
//! command line. Every invocation goes through a [`CommandRunner`].

use crate::executor::{CommandRunner, HealthStatus, ProcessCommand, ProcessOutput};
use crate::pipeline::{ReleaseError, ReleaseResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Container runtime type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerRuntime {
    /// Docker runtime
    #[default]
    Docker,
    /// Podman runtime
    Podman,
}

impl ContainerRuntime {
    /// Gets the runtime executable name
    #[must_use]
    pub fn command(self) -> &'static str {
        match self {
            Self::Docker => "docker",
            Self::Podman => "podman",
        }
    }
}

impl std::fmt::Display for ContainerRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.command())
    }
}

impl std::str::FromStr for ContainerRuntime {
    type Err = ReleaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "podman" => Ok(Self::Podman),
            other => Err(ReleaseError::Config(format!(
                "unknown container runtime '{other}'"
            ))),
        }
    }
}

/// Something that can report the version embedded in a built artifact
#[allow(clippy::missing_errors_doc)]
pub trait VersionReporter {
    /// Asks the artifact for its own version string
    fn report_version(&self, image: &str) -> ReleaseResult<String>;
}

/// Parameters of one image build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Local tag given to the result
    pub image: String,
    /// Dockerfile path
    pub dockerfile: PathBuf,
    /// Build context directory
    pub context_dir: PathBuf,
    /// `--build-arg` pairs
    pub build_args: Vec<(String, String)>,
    /// Raw extra arguments appended before the context
    pub extra_args: Vec<String>,
}

/// Thin typed wrapper over the runtime CLI
#[derive(Clone, Copy)]
pub struct ContainerCli<'a> {
    runtime: ContainerRuntime,
    runner: &'a dyn CommandRunner,
}

impl std::fmt::Debug for ContainerCli<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerCli")
            .field("runtime", &self.runtime)
            .finish_non_exhaustive()
    }
}

impl<'a> ContainerCli<'a> {
    /// Creates a CLI wrapper for the given runtime
    #[must_use]
    pub fn new(runtime: ContainerRuntime, runner: &'a dyn CommandRunner) -> Self {
        Self { runtime, runner }
    }

    /// The runtime this wrapper drives
    #[must_use]
    pub fn runtime(&self) -> ContainerRuntime {
        self.runtime
    }

    /// The runner commands go through
    #[must_use]
    pub fn runner(&self) -> &'a dyn CommandRunner {
        self.runner
    }

    fn command(&self) -> ProcessCommand {
        ProcessCommand::new(self.runtime.command())
    }

    /// Builds an image with caching disabled and intermediate containers removed
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::BuildFailed`] when the backend reports failure.
    pub fn build(&self, request: &BuildRequest) -> ReleaseResult<()> {
        let mut cmd = self
            .command()
            .args(["build", "--rm", "--force-rm", "--no-cache"]);
        for (key, value) in &request.build_args {
            cmd = cmd.arg("--build-arg").arg(format!("{key}={value}"));
        }
        cmd = cmd
            .args(request.extra_args.iter().cloned())
            .arg("-t")
            .arg(&request.image)
            .arg("-f")
            .arg(request.dockerfile.to_string_lossy())
            .arg(request.context_dir.to_string_lossy());

        let output = self.runner.run(&cmd)?;
        if output.is_failure() {
            return Err(ReleaseError::BuildFailed {
                image: request.image.clone(),
                reason: failure_reason(&output),
            });
        }
        Ok(())
    }

    /// Returns true if the image exists locally
    ///
    /// # Errors
    ///
    /// Fails only if the runtime cannot be started.
    pub fn image_exists(&self, image: &str) -> ReleaseResult<bool> {
        let output = self
            .runner
            .run(&self.command().args(["image", "inspect", image]))?;
        Ok(output.is_success())
    }

    /// Applies `target` as an additional local tag of `source`
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] on a non-zero exit.
    pub fn tag(&self, source: &str, target: &str) -> ReleaseResult<()> {
        self.runner
            .run_checked(&self.command().args(["tag", source, target]))?;
        Ok(())
    }

    /// Pushes one reference to its registry
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] on a non-zero exit.
    pub fn push(&self, reference: &str) -> ReleaseResult<()> {
        self.runner
            .run_checked(&self.command().args(["push", reference]))?;
        Ok(())
    }

    /// Removes a local image
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] on a non-zero exit.
    pub fn remove_image(&self, image: &str, force: bool) -> ReleaseResult<()> {
        let mut cmd = self.command().arg("rmi");
        if force {
            cmd = cmd.arg("-f");
        }
        self.runner.run_checked(&cmd.arg(image))?;
        Ok(())
    }

    /// Lists local `repository:tag` names for a repository
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] on a non-zero exit.
    pub fn list_images(&self, repository: &str) -> ReleaseResult<Vec<String>> {
        let output = self.runner.run_checked(&self.command().args([
            "images",
            "--format",
            "{{.Repository}}:{{.Tag}}",
            repository,
        ]))?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.ends_with(":<none>"))
            .map(str::to_string)
            .collect())
    }

    /// Runs a compose subcommand against a project file
    ///
    /// # Errors
    ///
    /// Fails only if the runtime cannot be started.
    pub fn compose(
        &self,
        project: &str,
        file: &Path,
        args: &[String],
    ) -> ReleaseResult<ProcessOutput> {
        let cmd = self
            .command()
            .arg("compose")
            .arg("-p")
            .arg(project)
            .arg("-f")
            .arg(file.to_string_lossy())
            .args(args.iter().cloned());
        self.runner.run(&cmd)
    }

    /// Checks that the runtime answers and its daemon is reachable
    #[must_use]
    pub fn health_check(&self) -> HealthStatus {
        match self.runner.run(&self.command().arg("--version")) {
            Ok(o) if o.is_success() => {}
            Ok(o) => {
                return HealthStatus::Unhealthy {
                    reason: format!("{} --version failed: {}", self.runtime, o.stderr.trim()),
                };
            }
            Err(e) => {
                return HealthStatus::Unhealthy {
                    reason: format!("{} is not available: {e}", self.runtime),
                };
            }
        }

        match self.runner.run(&self.command().arg("info")) {
            Ok(o) if o.is_success() => HealthStatus::Healthy,
            Ok(_) => HealthStatus::Degraded {
                reason: format!("{} daemon may not be running", self.runtime),
            },
            Err(e) => HealthStatus::Unhealthy {
                reason: format!("{} error: {e}", self.runtime),
            },
        }
    }
}

impl VersionReporter for ContainerCli<'_> {
    fn report_version(&self, image: &str) -> ReleaseResult<String> {
        let output = self
            .runner
            .run_checked(&self.command().args(["run", "--rm", image, "version"]))?;
        Ok(output
            .stdout
            .lines()
            .map(str::trim)
            .rfind(|l| !l.is_empty())
            .unwrap_or_default()
            .to_string())
    }
}

fn failure_reason(output: &ProcessOutput) -> String {
    let stderr = output.stderr.trim();
    if stderr.is_empty() {
        format!("exit code {}", output.exit_code)
    } else {
        stderr.lines().last().unwrap_or(stderr).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ScriptedRunner;

    fn request() -> BuildRequest {
        BuildRequest {
            image: "qgis-wps:ltr-abc1234".to_string(),
            dockerfile: PathBuf::from("Dockerfile"),
            context_dir: PathBuf::from("."),
            build_args: vec![("QGIS_VERSION".to_string(), "ltr".to_string())],
            extra_args: vec!["--pull".to_string()],
        }
    }

    #[test]
    fn test_container_runtime_display() {
        assert_eq!(ContainerRuntime::Docker.to_string(), "docker");
        assert_eq!(ContainerRuntime::Podman.to_string(), "podman");
    }

    #[test]
    fn test_container_runtime_from_str() {
        assert_eq!(
            "Podman".parse::<ContainerRuntime>().unwrap(),
            ContainerRuntime::Podman
        );
        assert!("rkt".parse::<ContainerRuntime>().is_err());
    }

    #[test]
    fn test_build_command_line() {
        let runner = ScriptedRunner::new();
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        cli.build(&request()).unwrap();

        assert_eq!(
            runner.calls(),
            vec![
                "docker build --rm --force-rm --no-cache --build-arg QGIS_VERSION=ltr --pull \
                 -t qgis-wps:ltr-abc1234 -f Dockerfile ."
                    .to_string()
            ]
        );
    }

    #[test]
    fn test_build_failure_maps_to_build_failed() {
        let runner = ScriptedRunner::new().fail_on("build", 1, "step 3/9\nno space left on device");
        let cli = ContainerCli::new(ContainerRuntime::Podman, &runner);

        let err = cli.build(&request()).unwrap_err();
        assert_eq!(
            err,
            ReleaseError::BuildFailed {
                image: "qgis-wps:ltr-abc1234".to_string(),
                reason: "no space left on device".to_string(),
            }
        );
        assert!(runner.calls()[0].starts_with("podman build"));
    }

    #[test]
    fn test_report_version_takes_last_line() {
        let runner = ScriptedRunner::new().reply("version", "Starting entrypoint\n1.7.3\n\n");
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        assert_eq!(cli.report_version("qgis-wps:ltr-abc1234").unwrap(), "1.7.3");
        assert_eq!(
            runner.calls(),
            vec!["docker run --rm qgis-wps:ltr-abc1234 version".to_string()]
        );
    }

    #[test]
    fn test_list_images_skips_dangling() {
        let runner = ScriptedRunner::new().reply(
            "images",
            "qgis-wps:ltr-abc1234\nqgis-wps:<none>\nqgis-wps:1.7.3\n",
        );
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        assert_eq!(
            cli.list_images("qgis-wps").unwrap(),
            vec!["qgis-wps:ltr-abc1234", "qgis-wps:1.7.3"]
        );
    }

    #[test]
    fn test_remove_image_force_flag() {
        let runner = ScriptedRunner::new();
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        cli.remove_image("qgis-wps:ltr-abc1234", true).unwrap();
        assert_eq!(runner.calls(), vec!["docker rmi -f qgis-wps:ltr-abc1234"]);
    }

    #[test]
    fn test_image_exists() {
        let runner = ScriptedRunner::new().fail_on("inspect", 1, "No such image");
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        assert!(!cli.image_exists("qgis-wps:ltr-abc1234").unwrap());
    }

    #[test]
    fn test_health_check_degraded_without_daemon() {
        let runner = ScriptedRunner::new().fail_on("docker info", 1, "Cannot connect");
        let cli = ContainerCli::new(ContainerRuntime::Docker, &runner);

        assert!(matches!(cli.health_check(), HealthStatus::Degraded { .. }));
    }
}
