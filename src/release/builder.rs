//! Image building
//!
//! Builds `<name>:<flavor>-<commitid>` without cache. The resolved version
//! is injected as a build argument so the artifact embeds it.

use crate::infrastructure::{BuildRequest, Config, ContainerCli};
use crate::pipeline::ReleaseResult;

/// A locally built image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuiltImage {
    /// Local image name
    pub image: String,
    /// Version injected at build time
    pub version: String,
    /// Source revision
    pub commit_id: String,
}

/// Builds the service image for one flavor
#[derive(Debug, Clone, Copy)]
pub struct ImageBuilder<'a> {
    config: &'a Config,
    cli: ContainerCli<'a>,
}

impl<'a> ImageBuilder<'a> {
    /// Creates a builder for the configured flavor
    #[must_use]
    pub fn new(config: &'a Config, cli: ContainerCli<'a>) -> Self {
        Self { config, cli }
    }

    /// Build arguments passed to the backend
    #[must_use]
    pub fn build_args(&self, version: &str) -> Vec<(String, String)> {
        let mut args = vec![
            ("QGIS_VERSION".to_string(), self.config.flavor.clone()),
            (
                "REGISTRY_PREFIX".to_string(),
                self.config.registry_prefix(),
            ),
            ("BUILD_VERSION".to_string(), version.to_string()),
        ];
        if let Some(url) = self.config.pypi_url() {
            args.push(("PYPISERVER".to_string(), url));
        }
        args
    }

    /// Builds the image for `commit_id`, embedding `version`
    ///
    /// # Errors
    ///
    /// Returns [`crate::ReleaseError::BuildFailed`] when the backend fails;
    /// no manifest should be written in that case.
    pub fn build(&self, version: &str, commit_id: &str) -> ReleaseResult<BuiltImage> {
        let image = self.config.build_image(commit_id);
        let request = BuildRequest {
            image: image.clone(),
            dockerfile: self.config.dockerfile.clone(),
            context_dir: self.config.context_dir.clone(),
            build_args: self.build_args(version),
            extra_args: self.config.extra_build_args.clone(),
        };

        tracing::info!(
            image = %image,
            flavor = %self.config.flavor,
            version = %version,
            "Building image"
        );
        self.cli.build(&request)?;
        tracing::info!(image = %image, "Image built");

        Ok(BuiltImage {
            image,
            version: version.to_string(),
            commit_id: commit_id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ReleaseError;
    use crate::executor::ScriptedRunner;
    use crate::infrastructure::ContainerRuntime;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_build_args_without_pypi() {
        let config = Config::default();
        let runner = ScriptedRunner::new();
        let builder = ImageBuilder::new(&config, ContainerCli::new(ContainerRuntime::Docker, &runner));

        assert_eq!(
            builder.build_args("1.7.3"),
            vec![
                ("QGIS_VERSION".to_string(), "ltr".to_string()),
                ("REGISTRY_PREFIX".to_string(), String::new()),
                ("BUILD_VERSION".to_string(), "1.7.3".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_args_with_pypi_and_registry() {
        let config = Config {
            registry_url: Some("acme".to_string()),
            pypi_server: Some("pypi.local:8080".to_string()),
            pypi_server_scheme: "http://".to_string(),
            ..Config::default()
        };
        let runner = ScriptedRunner::new();
        let builder = ImageBuilder::new(&config, ContainerCli::new(ContainerRuntime::Docker, &runner));

        let args = builder.build_args("1.7.3");
        assert!(args.contains(&("REGISTRY_PREFIX".to_string(), "acme/".to_string())));
        assert!(args.contains(&("PYPISERVER".to_string(), "http://pypi.local:8080".to_string())));
    }

    #[test]
    fn test_build_tags_flavor_and_commit() {
        let config = Config::default().with_flavor("release");
        let runner = ScriptedRunner::new();
        let builder = ImageBuilder::new(&config, ContainerCli::new(ContainerRuntime::Docker, &runner));

        let built = builder.build("1.7.3", "abc1234").unwrap();

        assert_eq!(built.image, "qgis-wps:release-abc1234");
        let call = &runner.calls()[0];
        assert!(call.contains("--no-cache"));
        assert!(call.contains("--build-arg BUILD_VERSION=1.7.3"));
        assert!(call.contains("-t qgis-wps:release-abc1234"));
    }

    #[test]
    fn test_build_failure_propagates() {
        let config = Config::default();
        let runner = ScriptedRunner::new().fail_on("build", 1, "failed to solve");
        let builder = ImageBuilder::new(&config, ContainerCli::new(ContainerRuntime::Docker, &runner));

        assert!(matches!(
            builder.build("1.7.3", "abc1234"),
            Err(ReleaseError::BuildFailed { .. })
        ));
    }
}
