//! Configuration management
//!
//! [`Config`] is the build context of one invocation. It is assembled once
//! from the process environment (and CLI overrides), validated, and then
//! passed by reference to every stage.

use super::container::ContainerRuntime;
use crate::pipeline::{ReleaseError, ReleaseResult, Validate, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Default flavor: the long-term-release channel
pub const DEFAULT_FLAVOR: &str = "ltr";

/// Default artifact name
pub const DEFAULT_NAME: &str = "qgis-wps";

/// Default manifest location, relative to the working directory
pub const DEFAULT_MANIFEST: &str = "factory.manifest";

/// Build context shared by all stages
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Logical artifact name
    pub name: String,

    /// Platform variant the image is built against
    pub flavor: String,

    /// Remote registry namespace, e.g. `registry.example.org/3liz`
    pub registry_url: Option<String>,

    /// Alternate package index host for dependency installation
    pub pypi_server: Option<String>,

    /// Scheme prepended to `pypi_server`
    pub pypi_server_scheme: String,

    /// `uid:gid` the service container runs as
    pub become_user: String,

    /// Extra `docker build` arguments
    pub extra_build_args: Vec<String>,

    /// Dockerfile used for the build
    pub dockerfile: PathBuf,

    /// Build context directory
    pub context_dir: PathBuf,

    /// Source tree holding the package metadata
    pub source_dir: PathBuf,

    /// Python package directory carrying `version.py`
    pub package: String,

    /// Manifest file handed from the build stage to the promotion stage
    pub manifest_path: PathBuf,

    /// Container runtime CLI
    pub runtime: ContainerRuntime,

    /// Flavors exercised by the test matrix
    pub flavors: Vec<String>,

    /// Directory receiving the per-flavor test reports
    pub reports_dir: PathBuf,

    /// Runtime knobs passed to the service container
    pub service: ServiceRuntime,
}

/// Environment-driven configuration of the service container
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceRuntime {
    /// `QGSWPS_SERVER_WORKDIR`
    pub workdir: String,

    /// `QGSWPS_PROCESSING_PROVIDERS_MODULE_PATH`
    pub providers_path: String,

    /// `QGSWPS_CACHE_ROOTDIR`
    pub cache_root: String,

    /// `QGSWPS_LOGLEVEL`
    pub log_level: String,

    /// `QGSWPS_REDIS_HOST`
    pub redis_host: String,

    /// Host port the service is published on
    pub port: u16,

    /// Host directory mounted at `providers_path`
    pub processing_dir: Option<PathBuf>,

    /// Host directory mounted at `cache_root`
    pub projects_dir: Option<PathBuf>,

    /// Additional variables passed through unmodified
    #[serde(default)]
    pub extra_env: BTreeMap<String, String>,
}

impl Default for ServiceRuntime {
    fn default() -> Self {
        Self {
            workdir: "/srv/data".to_string(),
            providers_path: "/processing".to_string(),
            cache_root: "/projects".to_string(),
            log_level: "DEBUG".to_string(),
            redis_host: "redis".to_string(),
            port: 8080,
            processing_dir: None,
            projects_dir: None,
            extra_env: BTreeMap::new(),
        }
    }
}

impl ServiceRuntime {
    /// Environment variables handed to the service container
    #[must_use]
    pub fn environment(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::from([
            ("QGSWPS_SERVER_WORKDIR".to_string(), self.workdir.clone()),
            (
                "QGSWPS_PROCESSING_PROVIDERS_MODULE_PATH".to_string(),
                self.providers_path.clone(),
            ),
            ("QGSWPS_CACHE_ROOTDIR".to_string(), self.cache_root.clone()),
            ("QGSWPS_LOGLEVEL".to_string(), self.log_level.clone()),
            ("QGSWPS_REDIS_HOST".to_string(), self.redis_host.clone()),
        ]);
        env.extend(self.extra_env.clone());
        env
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            flavor: DEFAULT_FLAVOR.to_string(),
            registry_url: None,
            pypi_server: None,
            pypi_server_scheme: "https://".to_string(),
            become_user: "1000:1000".to_string(),
            extra_build_args: Vec::new(),
            dockerfile: PathBuf::from("Dockerfile"),
            context_dir: PathBuf::from("."),
            source_dir: PathBuf::from("."),
            package: "pyqgiswps".to_string(),
            manifest_path: PathBuf::from(DEFAULT_MANIFEST),
            runtime: ContainerRuntime::Docker,
            flavors: vec!["ltr".to_string(), "release".to_string()],
            reports_dir: PathBuf::from("reports"),
            service: ServiceRuntime::default(),
        }
    }
}

impl Config {
    /// Builds the configuration from the process environment
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when a variable cannot be parsed.
    pub fn from_env() -> ReleaseResult<Self> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.is_empty()))
    }

    /// Builds the configuration from an arbitrary variable lookup
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::Config`] when a variable cannot be parsed.
    pub fn from_lookup<F>(lookup: F) -> ReleaseResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(name) = lookup("IMAGE_NAME") {
            config.name = name;
        }
        if let Some(flavor) = lookup("FLAVOR") {
            config.flavor = flavor;
        }
        config.registry_url = lookup("REGISTRY_URL");
        config.pypi_server = lookup("PYPISERVER");
        if let Some(scheme) = lookup("PYPISERVER_SCHEME") {
            config.pypi_server_scheme = scheme;
        }
        if let Some(user) = lookup("BECOME_USER") {
            config.become_user = user;
        }
        if let Some(args) = lookup("DOCKER_BUILD_ARGS") {
            config.extra_build_args = shell_words::split(&args).map_err(|e| {
                ReleaseError::Config(format!("DOCKER_BUILD_ARGS is not valid shell words: {e}"))
            })?;
        }
        if let Some(runtime) = lookup("CONTAINER_RUNTIME") {
            config.runtime = runtime.parse()?;
        }
        if let Some(path) = lookup("MANIFEST") {
            config.manifest_path = PathBuf::from(path);
        }
        if let Some(flavors) = lookup("TEST_FLAVORS") {
            config.flavors = split_list(&flavors);
        }
        if let Some(dir) = lookup("REPORTS_DIR") {
            config.reports_dir = PathBuf::from(dir);
        }

        let service = &mut config.service;
        if let Some(v) = lookup("QGSWPS_SERVER_WORKDIR") {
            service.workdir = v;
        }
        if let Some(v) = lookup("QGSWPS_PROCESSING_PROVIDERS_MODULE_PATH") {
            service.providers_path = v;
        }
        if let Some(v) = lookup("QGSWPS_CACHE_ROOTDIR") {
            service.cache_root = v;
        }
        if let Some(v) = lookup("QGSWPS_LOGLEVEL") {
            service.log_level = v;
        }
        if let Some(v) = lookup("QGSWPS_REDIS_HOST") {
            service.redis_host = v;
        }
        if let Some(v) = lookup("WPS_PORT") {
            service.port = v
                .parse()
                .map_err(|e| ReleaseError::Config(format!("WPS_PORT '{v}': {e}")))?;
        }
        service.processing_dir = lookup("WPS_PROCESSING_DIR").map(PathBuf::from);
        service.projects_dir = lookup("WPS_PROJECTS_DIR").map(PathBuf::from);

        Ok(config)
    }

    /// Registry prefix prepended to every alias (`<registry_url>/` or empty)
    #[must_use]
    pub fn registry_prefix(&self) -> String {
        match self.registry_url.as_deref().map(|u| u.trim_end_matches('/')) {
            Some(url) if !url.is_empty() => format!("{url}/"),
            _ => String::new(),
        }
    }

    /// Local image name for a given source revision: `<name>:<flavor>-<commitid>`
    #[must_use]
    pub fn build_image(&self, commit_id: &str) -> String {
        format!("{}:{}-{}", self.name, self.flavor, commit_id)
    }

    /// Full package index URL, when an alternate index is configured
    #[must_use]
    pub fn pypi_url(&self) -> Option<String> {
        self.pypi_server
            .as_deref()
            .map(|host| format!("{}{}", self.pypi_server_scheme, host))
    }

    /// A copy of this configuration targeting another flavor
    #[must_use]
    pub fn with_flavor(&self, flavor: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            ..self.clone()
        }
    }
}

impl Validate for Config {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::empty("name"));
        }
        if self.flavor.trim().is_empty() {
            return Err(ValidationError::empty("flavor"));
        }
        if !is_repository_name(&self.name) {
            return Err(ValidationError::InvalidReference {
                component: "name".to_string(),
                value: self.name.clone(),
            });
        }
        if !crate::release::is_valid_tag(&self.flavor) {
            return Err(ValidationError::InvalidReference {
                component: "flavor".to_string(),
                value: self.flavor.clone(),
            });
        }
        if self.flavors.iter().any(|f| f.trim().is_empty()) {
            return Err(ValidationError::empty("flavors"));
        }
        crate::release::validate_flavors(&self.flavors)
    }
}

fn is_repository_name(name: &str) -> bool {
    name.chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "._-/".contains(c))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.name, "qgis-wps");
        assert_eq!(config.flavor, "ltr");
        assert_eq!(config.manifest_path, PathBuf::from("factory.manifest"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_lookup() {
        let config = Config::from_lookup(lookup_from(&[
            ("FLAVOR", "release"),
            ("REGISTRY_URL", "registry.example.org/3liz"),
            ("PYPISERVER", "pypi.example.org"),
            ("BECOME_USER", "1001:1001"),
            ("DOCKER_BUILD_ARGS", "--build-arg EXTRA='a b' --pull"),
            ("TEST_FLAVORS", "ltr, release nightly"),
            ("QGSWPS_LOGLEVEL", "INFO"),
            ("WPS_PORT", "9090"),
        ]))
        .unwrap();

        assert_eq!(config.flavor, "release");
        assert_eq!(config.registry_prefix(), "registry.example.org/3liz/");
        assert_eq!(
            config.pypi_url().as_deref(),
            Some("https://pypi.example.org")
        );
        assert_eq!(config.become_user, "1001:1001");
        assert_eq!(
            config.extra_build_args,
            vec!["--build-arg", "EXTRA=a b", "--pull"]
        );
        assert_eq!(config.flavors, vec!["ltr", "release", "nightly"]);
        assert_eq!(config.service.log_level, "INFO");
        assert_eq!(config.service.port, 9090);
    }

    #[test]
    fn test_config_rejects_bad_port() {
        let result = Config::from_lookup(lookup_from(&[("WPS_PORT", "http")]));
        assert!(matches!(result, Err(ReleaseError::Config(_))));
    }

    #[test]
    fn test_config_rejects_unknown_runtime() {
        let result = Config::from_lookup(lookup_from(&[("CONTAINER_RUNTIME", "lxc")]));
        assert!(matches!(result, Err(ReleaseError::Config(_))));
    }

    #[test]
    fn test_registry_prefix_empty_without_url() {
        let config = Config::default();
        assert_eq!(config.registry_prefix(), "");

        let config = Config {
            registry_url: Some("acme/".to_string()),
            ..Config::default()
        };
        assert_eq!(config.registry_prefix(), "acme/");
    }

    #[test]
    fn test_build_image_name() {
        let config = Config::default().with_flavor("release");
        assert_eq!(config.build_image("abc1234"), "qgis-wps:release-abc1234");
    }

    #[test]
    fn test_validate_rejects_empty_flavor() {
        let config = Config::default().with_flavor("");
        assert_eq!(config.validate(), Err(ValidationError::empty("flavor")));
    }

    #[test]
    fn test_validate_rejects_uppercase_name() {
        let config = Config {
            name: "QGIS-WPS".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidReference { .. })
        ));
    }

    #[test]
    fn test_validate_rejects_duplicate_flavors() {
        let config = Config {
            flavors: vec!["ltr".to_string(), "ltr".to_string()],
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::DuplicateFlavor {
                flavor: "ltr".to_string()
            })
        );
    }

    #[test]
    fn test_validate_rejects_path_like_flavor() {
        let config = Config {
            flavors: vec!["../../etc".to_string()],
            ..Config::default()
        };
        assert_eq!(
            config.validate(),
            Err(ValidationError::InvalidReference {
                component: "flavor".to_string(),
                value: "../../etc".to_string(),
            })
        );
    }

    #[test]
    fn test_service_environment() {
        let mut service = ServiceRuntime::default();
        service
            .extra_env
            .insert("QGSWPS_SERVER_PARALLELPROCESSES".to_string(), "2".to_string());

        let env = service.environment();
        assert_eq!(env["QGSWPS_REDIS_HOST"], "redis");
        assert_eq!(env["QGSWPS_SERVER_WORKDIR"], "/srv/data");
        assert_eq!(env["QGSWPS_SERVER_PARALLELPROCESSES"], "2");
    }
}
