//! Compose environment
//!
//! Declarative two-service topology: the service image plus a stateless
//! Redis cache/queue, joined on a private network. The service container is
//! configured only through environment variables and volume mounts.

use super::config::Config;
use super::container::ContainerCli;
use crate::executor::{ProcessOutput, expand_variables};
use crate::pipeline::{ReleaseError, ReleaseResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Name of the service-under-test in the compose document
pub const SERVICE: &str = "wps";

/// Name of the cache/queue dependency
pub const DEPENDENCY: &str = "redis";

const DEPENDENCY_IMAGE: &str = "redis:6-alpine";
const NETWORK: &str = "wps-net";
const COMPOSE_FILE: &str = "docker-compose.yml";

/// Root of a compose document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFile {
    /// Services by name
    pub services: BTreeMap<String, ComposeService>,

    /// Networks by name
    #[serde(default)]
    pub networks: BTreeMap<String, ComposeNetwork>,
}

/// One service of a compose document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeService {
    /// Image to run
    pub image: String,

    /// User to run as
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub user: Option<String>,

    /// Working directory inside the container
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub working_dir: Option<String>,

    /// Environment variables
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub environment: BTreeMap<String, String>,

    /// Volume mounts as `host:container`
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub volumes: Vec<String>,

    /// Port mappings as `host:container`
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub ports: Vec<String>,

    /// Networks to join
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub networks: Vec<String>,

    /// Services started first
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub depends_on: Vec<String>,
}

/// A network of a compose document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeNetwork {
    /// Network driver
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub driver: Option<String>,
}

/// A compose project rendered into its own working directory
#[derive(Debug, Clone)]
pub struct ComposeEnvironment {
    project: String,
    work_dir: PathBuf,
    document: ComposeFile,
}

impl ComposeEnvironment {
    /// Builds the topology for `image`, configured from `config`
    #[must_use]
    pub fn for_service(config: &Config, image: &str, work_dir: impl Into<PathBuf>) -> Self {
        let runtime = &config.service;
        let env = runtime.environment();
        let lookup: HashMap<String, String> = env.clone().into_iter().collect();
        let environment = env
            .into_iter()
            .map(|(k, v)| {
                let expanded = expand_variables(&v, &lookup);
                (k, expanded)
            })
            .collect();

        let mut volumes = Vec::new();
        if let Some(dir) = &runtime.processing_dir {
            volumes.push(mount(dir, &runtime.providers_path));
        }
        if let Some(dir) = &runtime.projects_dir {
            volumes.push(mount(dir, &runtime.cache_root));
        }

        let service = ComposeService {
            image: image.to_string(),
            user: Some(config.become_user.clone()),
            environment,
            volumes,
            ports: vec![format!("{}:8080", runtime.port)],
            networks: vec![NETWORK.to_string()],
            depends_on: vec![DEPENDENCY.to_string()],
            ..ComposeService::default()
        };

        let dependency = ComposeService {
            image: DEPENDENCY_IMAGE.to_string(),
            networks: vec![NETWORK.to_string()],
            ..ComposeService::default()
        };

        Self {
            project: config.name.clone(),
            work_dir: work_dir.into(),
            document: ComposeFile {
                services: BTreeMap::from([
                    (SERVICE.to_string(), service),
                    (DEPENDENCY.to_string(), dependency),
                ]),
                networks: BTreeMap::from([(
                    NETWORK.to_string(),
                    ComposeNetwork {
                        driver: Some("bridge".to_string()),
                    },
                )]),
            },
        }
    }

    /// Overrides the compose project name
    #[must_use]
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Mounts a host directory into the service container
    #[must_use]
    pub fn with_mount(mut self, host: &Path, container: &str) -> Self {
        if let Some(service) = self.document.services.get_mut(SERVICE) {
            service.volumes.push(mount(host, container));
        }
        self
    }

    /// Sets the service container's working directory
    #[must_use]
    pub fn with_working_dir(mut self, dir: impl Into<String>) -> Self {
        if let Some(service) = self.document.services.get_mut(SERVICE) {
            service.working_dir = Some(dir.into());
        }
        self
    }

    /// Drops the published port (used for isolated test projects)
    #[must_use]
    pub fn without_ports(mut self) -> Self {
        if let Some(service) = self.document.services.get_mut(SERVICE) {
            service.ports.clear();
        }
        self
    }

    /// Project name
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Typed compose document
    #[must_use]
    pub fn document(&self) -> &ComposeFile {
        &self.document
    }

    /// Path the compose file is written to
    #[must_use]
    pub fn file_path(&self) -> PathBuf {
        self.work_dir.join(COMPOSE_FILE)
    }

    /// Renders the compose document as YAML
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] if serialization fails.
    pub fn render(&self) -> ReleaseResult<String> {
        serde_yaml::to_string(&self.document)
            .map_err(|e| ReleaseError::Config(format!("cannot render compose file: {e}")))
    }

    /// Writes the compose file into the working directory
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory or file cannot be written.
    pub fn write(&self) -> ReleaseResult<PathBuf> {
        std::fs::create_dir_all(&self.work_dir)?;
        let path = self.file_path();
        std::fs::write(&path, self.render()?)?;
        tracing::debug!(path = %path.display(), project = %self.project, "Compose file written");
        Ok(path)
    }

    /// Starts all services detached
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] if compose fails.
    pub fn up(&self, cli: &ContainerCli<'_>) -> ReleaseResult<()> {
        let path = self.write()?;
        tracing::info!(project = %self.project, "Starting compose environment");
        let output = cli.compose(&self.project, &path, &strings(&["up", "-d"]))?;
        check(&output, cli)
    }

    /// Stops and removes all services
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::CommandFailed`] if compose fails.
    pub fn down(&self, cli: &ContainerCli<'_>) -> ReleaseResult<()> {
        let path = self.file_path();
        tracing::info!(project = %self.project, "Stopping compose environment");
        let output = cli.compose(
            &self.project,
            &path,
            &strings(&["down", "--remove-orphans", "--volumes"]),
        )?;
        check(&output, cli)
    }

    /// Runs a one-shot command in a fresh service container
    ///
    /// The output is returned whatever the exit code.
    ///
    /// # Errors
    ///
    /// Fails only if the compose file cannot be written or the runtime
    /// cannot be started.
    pub fn run(
        &self,
        cli: &ContainerCli<'_>,
        env: &[(String, String)],
        argv: &[String],
    ) -> ReleaseResult<ProcessOutput> {
        let path = self.write()?;
        let mut args = strings(&["run", "--rm"]);
        for (key, value) in env {
            args.push("-e".to_string());
            args.push(format!("{key}={value}"));
        }
        args.push(SERVICE.to_string());
        args.extend(argv.iter().cloned());
        cli.compose(&self.project, &path, &args)
    }
}

fn mount(host: &Path, container: &str) -> String {
    format!("{}:{}", host.display(), container)
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| (*s).to_string()).collect()
}

fn check(output: &ProcessOutput, cli: &ContainerCli<'_>) -> ReleaseResult<()> {
    if output.is_failure() {
        return Err(ReleaseError::CommandFailed {
            program: format!("{} compose", cli.runtime()),
            code: output.exit_code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(())
}
