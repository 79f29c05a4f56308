//! Pipeline runner
//!
//! Drives the release stages in order against one build context. Stages
//! share nothing in memory: build and manifest derive the image from the
//! configuration and the current commit, tag and push read the manifest
//! file only. Any subset of stages can therefore run in its own process.

use super::builder::ImageBuilder;
use super::manifest::{BuildManifest, ManifestStore, current_build_id};
use super::matrix::TestMatrixRunner;
use super::pusher::Pusher;
use super::tags::{ImageReference, TagPlanner};
use super::version::VersionResolver;
use crate::executor::{CommandRunner, HealthStatus, PipelineExecutor};
use crate::infrastructure::{
    ComposeEnvironment, Config, ContainerCli, MetricsCollector, StageMetrics, VersionReporter,
};
use crate::pipeline::{
    Pipeline, PipelineReport, ReleaseError, ReleaseResult, Stage, StageResult, Validate,
    ValidationError,
};
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use uuid::Uuid;

/// Default directory the `run`/`stop` compose project lives in
pub const COMPOSE_DIR: &str = ".wps-release/compose";

const SUMMARY_FILE: &str = "summary.json";

/// Current manifest and the aliases it would be promoted under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseStatus {
    /// Manifest on disk
    pub manifest: BuildManifest,
    /// Planned aliases, in push order
    pub aliases: Vec<ImageReference>,
}

impl fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.manifest)?;
        writeln!(f, "build_image={}", self.manifest.build_image())?;
        for alias in &self.aliases {
            writeln!(f, "alias={alias}")?;
        }
        Ok(())
    }
}

/// Runs release stages for one configuration
pub struct PipelineRunner<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    metrics: MetricsCollector,
    compose_dir: PathBuf,
    dry_run: bool,
}

impl fmt::Debug for PipelineRunner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRunner")
            .field("flavor", &self.config.flavor)
            .field("compose_dir", &self.compose_dir)
            .field("dry_run", &self.dry_run)
            .finish_non_exhaustive()
    }
}

impl<'a> PipelineRunner<'a> {
    /// Creates a runner executing commands through `runner`
    #[must_use]
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner) -> Self {
        Self {
            config,
            runner,
            metrics: MetricsCollector::new(),
            compose_dir: PathBuf::from(COMPOSE_DIR),
            dry_run: false,
        }
    }

    /// Places the `run`/`stop` compose project elsewhere
    #[must_use]
    pub fn with_compose_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.compose_dir = dir.into();
        self
    }

    /// Logs file writes and the test matrix instead of performing them
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Metrics of every stage run so far
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    fn cli(&self) -> ContainerCli<'a> {
        ContainerCli::new(self.config.runtime, self.runner)
    }

    fn store(&self) -> ManifestStore {
        ManifestStore::new(&self.config.manifest_path)
    }

    fn planner(&self) -> TagPlanner {
        TagPlanner::new(self.config.registry_prefix())
    }

    fn resolver(&self) -> VersionResolver {
        VersionResolver::new(self.config.source_dir.clone(), self.config.package.as_str())
    }

    fn commit_id(&self) -> ReleaseResult<String> {
        self.resolver().commit_id(self.runner)
    }

    fn compose(&self, commit_id: &str) -> ComposeEnvironment {
        ComposeEnvironment::for_service(
            self.config,
            &self.config.build_image(commit_id),
            self.compose_dir.clone(),
        )
    }

    /// Reads the manifest and plans its aliases, without side effects
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::ManifestMissing`] or
    /// [`ReleaseError::ManifestCorrupt`] if the manifest cannot be used.
    pub fn status(&self) -> ReleaseResult<ReleaseStatus> {
        let manifest = self.store().read()?;
        let aliases = self.planner().plan(&manifest)?;
        Ok(ReleaseStatus { manifest, aliases })
    }

    /// Runs a single stage
    ///
    /// # Errors
    ///
    /// Returns the stage's own failure, unwrapped.
    pub fn run_stage(&self, stage: Stage) -> ReleaseResult<StageResult> {
        match stage {
            Stage::Build => self.build(),
            Stage::Manifest => self.manifest(),
            Stage::Tag => self.tag(),
            Stage::Push => self.push(),
            Stage::Clean => self.clean(),
            Stage::CleanAll => self.clean_all(),
            Stage::Run => self.start(),
            Stage::Stop => self.stop(),
            Stage::Test => self.test(),
        }
    }

    fn build(&self) -> ReleaseResult<StageResult> {
        let version = self.resolver().resolve()?;
        let commit_id = self.commit_id()?;
        ImageBuilder::new(self.config, self.cli()).build(&version, &commit_id)?;
        Ok(StageResult::Success)
    }

    fn manifest(&self) -> ReleaseResult<StageResult> {
        let commit_id = self.commit_id()?;
        let image = self.config.build_image(&commit_id);
        let cli = self.cli();

        if self.dry_run {
            let version = cli.report_version(&image)?;
            let manifest = BuildManifest::new(
                &self.config.name,
                version,
                &self.config.flavor,
                current_build_id(),
                commit_id,
            );
            tracing::info!(
                path = %self.config.manifest_path.display(),
                manifest = %manifest.to_text().trim_end(),
                "Would write manifest"
            );
            return Ok(StageResult::Success);
        }

        self.store().record(
            &cli,
            &image,
            &self.config.name,
            &self.config.flavor,
            &commit_id,
            &current_build_id(),
        )?;
        Ok(StageResult::Success)
    }

    fn tag(&self) -> ReleaseResult<StageResult> {
        let manifest = self.store().read()?;
        let aliases = self.planner().plan(&manifest)?;
        Pusher::new(self.cli())
            .tag_all(&manifest.build_image(), &aliases)
            .into_result()?;
        Ok(StageResult::Success)
    }

    fn push(&self) -> ReleaseResult<StageResult> {
        let manifest = self.store().read()?;
        let aliases = self.planner().plan(&manifest)?;
        let report = Pusher::new(self.cli()).push_all(&aliases);
        if !report.is_complete() {
            tracing::warn!(
                pushed = report.succeeded.len(),
                failed = report.failed.len(),
                manifest = %self.config.manifest_path.display(),
                "Release partially pushed, run push again to complete it"
            );
        }
        let pushed = report.into_result()?;
        tracing::info!(
            version = %manifest.version,
            aliases = pushed.len(),
            "Release pushed"
        );
        Ok(StageResult::Success)
    }

    fn clean(&self) -> ReleaseResult<StageResult> {
        let cli = self.cli();
        let image = self.config.build_image(&self.commit_id()?);
        if !cli.image_exists(&image)? {
            tracing::info!(image = %image, "Nothing to clean");
            return Ok(StageResult::Skipped);
        }
        cli.remove_image(&image, false)?;
        tracing::info!(image = %image, "Image removed");
        Ok(StageResult::Success)
    }

    /// Removal failures are logged and ignored.
    fn clean_all(&self) -> ReleaseResult<StageResult> {
        let cli = self.cli();
        let suffix = format!("-{}", self.commit_id()?);
        let aliases: Vec<String> = match self.status() {
            Ok(status) => status.aliases.iter().map(ToString::to_string).collect(),
            Err(err) => {
                tracing::debug!(error = %err, "No manifest aliases to clean");
                Vec::new()
            }
        };

        let mut repositories = vec![self.config.name.clone()];
        let published = format!("{}{}", self.config.registry_prefix(), self.config.name);
        if published != self.config.name {
            repositories.push(published);
        }

        let mut removed = 0usize;
        for repository in &repositories {
            let images = match cli.list_images(repository) {
                Ok(images) => images,
                Err(err) => {
                    tracing::warn!(repository = %repository, error = %err, "Cannot list images");
                    continue;
                }
            };
            for image in images {
                let is_build = image
                    .rsplit_once(':')
                    .is_some_and(|(repo, tag)| repo == self.config.name && tag.ends_with(&suffix));
                if !is_build && !aliases.contains(&image) {
                    continue;
                }
                match cli.remove_image(&image, true) {
                    Ok(()) => removed += 1,
                    Err(err) => tracing::warn!(image = %image, error = %err, "Cannot remove image"),
                }
            }
        }

        tracing::info!(removed, "Local images cleaned");
        Ok(StageResult::Success)
    }

    fn start(&self) -> ReleaseResult<StageResult> {
        let environment = self.compose(&self.commit_id()?);
        environment.up(&self.cli())?;
        tracing::info!(
            project = %environment.project(),
            port = self.config.service.port,
            "Service started"
        );
        Ok(StageResult::Success)
    }

    fn stop(&self) -> ReleaseResult<StageResult> {
        let environment = self.compose(&self.commit_id()?);
        if !environment.file_path().exists() {
            environment.write()?;
        }
        environment.down(&self.cli())?;
        Ok(StageResult::Success)
    }

    fn test(&self) -> ReleaseResult<StageResult> {
        if self.dry_run {
            tracing::info!(flavors = ?self.config.flavors, "Would run test matrix");
            return Ok(StageResult::Skipped);
        }

        let commit_id = self.commit_id()?;
        let outcome =
            TestMatrixRunner::new(self.config, self.runner, &commit_id).run(&self.config.flavors)?;

        std::fs::create_dir_all(&self.config.reports_dir)?;
        let summary = self.config.reports_dir.join(SUMMARY_FILE);
        std::fs::write(&summary, outcome.summary_json()?)?;
        tracing::info!(path = %summary.display(), "Test summary written");

        if outcome.passed() {
            return Ok(StageResult::Success);
        }
        Err(ReleaseError::TestsFailed {
            flavors: outcome
                .flavors
                .iter()
                .filter(|f| !f.passed())
                .map(|f| f.flavor.clone())
                .collect(),
        })
    }
}

impl PipelineExecutor for PipelineRunner<'_> {
    fn execute(&self, pipeline: &Pipeline) -> ReleaseResult<PipelineReport> {
        self.validate(pipeline)?;

        let run_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("release", run_id = %run_id);
        let _guard = span.enter();
        tracing::info!(
            pipeline = %pipeline,
            flavor = %self.config.flavor,
            dry_run = self.dry_run,
            "Starting pipeline"
        );

        let mut report = PipelineReport::new(run_id);
        for &stage in &pipeline.stages {
            tracing::info!(stage = %stage, "Stage started");
            let start = Instant::now();
            let outcome = self.run_stage(stage);
            let duration = start.elapsed();

            let result = outcome.as_ref().map_or(StageResult::Failure, |r| *r);
            self.metrics.record(StageMetrics {
                stage: stage.name().to_string(),
                result,
                duration,
            });
            report.record(stage, result, duration);

            if let Err(err) = outcome {
                tracing::error!(
                    stage = %stage,
                    kind = stage.failure_kind(),
                    error = %err,
                    duration_ms = duration.as_millis(),
                    "Stage failed"
                );
                return Err(err.in_stage(stage.name()));
            }
            tracing::info!(
                stage = %stage,
                result = %result,
                duration_ms = duration.as_millis(),
                "Stage finished"
            );
        }

        tracing::info!(
            stages = report.stages.len(),
            duration_ms = report.total_duration().as_millis(),
            "Pipeline finished"
        );
        Ok(report)
    }

    fn validate(&self, pipeline: &Pipeline) -> Result<(), ValidationError> {
        pipeline.validate()?;
        self.config.validate()
    }

    fn health_check(&self) -> HealthStatus {
        self.cli().health_check()
    }
}
