//! Flavor test matrix
//!
//! Runs the test suite once per flavor, each in its own compose project,
//! and collects a JUnit report per flavor. Flavors run in parallel and a
//! failing flavor never stops the others; the matrix passes only if every
//! flavor passes.

use super::builder::ImageBuilder;
use super::tags::is_valid_tag;
use super::version::VersionResolver;
use crate::executor::CommandRunner;
use crate::infrastructure::{ComposeEnvironment, Config, ContainerCli};
use crate::pipeline::{ReleaseError, ReleaseResult, StageResult, ValidationError};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Command running the suite inside the service container
pub const TEST_COMMAND: &str = "./tests/run-tests.sh";

const SOURCE_MOUNT: &str = "/src";
const REPORTS_MOUNT: &str = "/reports";

static SUITE_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<testsuite\s[^>]*>").expect("suite pattern is valid"));
static SUITES_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<testsuites\s[^>]*>").expect("suites pattern is valid"));
static COUNTER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"\b(tests|failures|errors|skipped)\s*=\s*["'](\d+)["']"#)
        .expect("counter pattern is valid")
});

/// Counters from a JUnit XML report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestReport {
    /// Number of test cases
    pub tests: u64,
    /// Failed assertions
    pub failures: u64,
    /// Errored test cases
    pub errors: u64,
    /// Skipped test cases
    pub skipped: u64,
}

impl TestReport {
    /// Reads the counters of a JUnit XML document
    ///
    /// `<testsuite>` elements are summed; a lone `<testsuites>` element is
    /// used when the document has no suite. Attributes may use either quote.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NoTestSuite`] when no suite element is
    /// found and [`ValidationError::MissingCounters`] when a suite element
    /// carries no counter attribute.
    pub fn from_junit_xml(xml: &str) -> Result<Self, ValidationError> {
        let suites: Vec<&str> = SUITE_TAG.find_iter(xml).map(|m| m.as_str()).collect();
        if suites.is_empty() {
            let tag = SUITES_TAG.find(xml).ok_or(ValidationError::NoTestSuite)?;
            return Self::from_tag(tag.as_str());
        }
        suites
            .iter()
            .try_fold(Self::default(), |total, tag| -> Result<Self, ValidationError> {
                Ok(total.merge(Self::from_tag(tag)?))
            })
    }

    /// Reads a report file
    ///
    /// # Errors
    ///
    /// Returns [`ReleaseError::ReportUnreadable`] if the file is missing or
    /// malformed.
    pub fn from_file(path: &Path) -> ReleaseResult<Self> {
        let unreadable = |reason: String| ReleaseError::ReportUnreadable {
            path: path.display().to_string(),
            reason,
        };
        let xml = std::fs::read_to_string(path).map_err(|e| unreadable(e.to_string()))?;
        Self::from_junit_xml(&xml).map_err(|e| unreadable(e.to_string()))
    }

    fn from_tag(tag: &str) -> Result<Self, ValidationError> {
        let mut report = Self::default();
        let mut found = false;
        for caps in COUNTER.captures_iter(tag) {
            found = true;
            let value = caps[2].parse().unwrap_or(0);
            match &caps[1] {
                "tests" => report.tests = value,
                "failures" => report.failures = value,
                "errors" => report.errors = value,
                _ => report.skipped = value,
            }
        }
        if !found {
            return Err(ValidationError::MissingCounters(tag.to_string()));
        }
        Ok(report)
    }

    fn merge(self, other: Self) -> Self {
        Self {
            tests: self.tests + other.tests,
            failures: self.failures + other.failures,
            errors: self.errors + other.errors,
            skipped: self.skipped + other.skipped,
        }
    }

    /// Returns true if nothing failed or errored
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures == 0 && self.errors == 0
    }
}

/// Outcome of one flavor
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorResult {
    /// Flavor tested
    pub flavor: String,
    /// Pass/fail
    pub result: StageResult,
    /// Parsed report, when one was produced
    pub report: Option<TestReport>,
    /// Report location on the host
    pub report_path: PathBuf,
    /// Why the flavor failed, when it did
    pub reason: Option<String>,
    /// Wall-clock time of the flavor run
    pub duration: Duration,
}

impl FlavorResult {
    /// Returns true if the flavor passed
    #[must_use]
    pub fn passed(&self) -> bool {
        self.result.is_success()
    }
}

/// Outcome of the whole matrix
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MatrixOutcome {
    /// Per-flavor results, in the order flavors were given
    pub flavors: Vec<FlavorResult>,
}

impl MatrixOutcome {
    /// Logical AND of all flavor results
    #[must_use]
    pub fn passed(&self) -> bool {
        self.flavors.iter().all(FlavorResult::passed)
    }

    /// Aggregate result
    #[must_use]
    pub fn result(&self) -> StageResult {
        StageResult::from(self.passed())
    }

    /// Result of one flavor
    #[must_use]
    pub fn get(&self, flavor: &str) -> Option<&FlavorResult> {
        self.flavors.iter().find(|f| f.flavor == flavor)
    }

    /// JSON summary for CI consumption
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn summary_json(&self) -> ReleaseResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| ReleaseError::Io(format!("cannot serialize matrix summary: {e}")))
    }
}

/// Checks the flavor list of a test matrix
///
/// Each flavor names a compose project and a report file, so it must be a
/// valid image tag and appear only once.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidReference`] for a malformed flavor and
/// [`ValidationError::DuplicateFlavor`] for a repeated one.
pub fn validate_flavors(flavors: &[String]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for flavor in flavors {
        if !is_valid_tag(flavor) {
            return Err(ValidationError::InvalidReference {
                component: "flavor".to_string(),
                value: flavor.clone(),
            });
        }
        if !seen.insert(flavor.as_str()) {
            return Err(ValidationError::DuplicateFlavor {
                flavor: flavor.clone(),
            });
        }
    }
    Ok(())
}

/// Runs the test suite for a set of flavors
#[derive(Clone, Copy)]
pub struct TestMatrixRunner<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    commit_id: &'a str,
}

impl std::fmt::Debug for TestMatrixRunner<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestMatrixRunner")
            .field("commit_id", &self.commit_id)
            .finish_non_exhaustive()
    }
}

impl<'a> TestMatrixRunner<'a> {
    /// Creates a matrix runner for one source revision
    #[must_use]
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner, commit_id: &'a str) -> Self {
        Self {
            config,
            runner,
            commit_id,
        }
    }

    /// Runs every flavor in parallel
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyMatrix`] when `flavors` is empty and
    /// the errors of [`validate_flavors`] for a malformed list. Flavor
    /// failures are reported in the outcome, not as errors.
    pub fn run(&self, flavors: &[String]) -> ReleaseResult<MatrixOutcome> {
        if flavors.is_empty() {
            return Err(ValidationError::EmptyMatrix.into());
        }
        validate_flavors(flavors)?;
        tracing::info!(flavors = ?flavors, commit = %self.commit_id, "Starting test matrix");

        let results = std::thread::scope(|scope| {
            let handles: Vec<_> = flavors
                .iter()
                .map(|flavor| (flavor, scope.spawn(move || self.run_flavor(flavor))))
                .collect();

            handles
                .into_iter()
                .map(|(flavor, handle)| {
                    handle.join().unwrap_or_else(|_| FlavorResult {
                        flavor: flavor.clone(),
                        result: StageResult::Failure,
                        report: None,
                        report_path: self.report_path(flavor),
                        reason: Some("test worker panicked".to_string()),
                        duration: Duration::ZERO,
                    })
                })
                .collect()
        });

        let outcome = MatrixOutcome { flavors: results };
        for flavor in &outcome.flavors {
            tracing::info!(
                flavor = %flavor.flavor,
                result = %flavor.result,
                duration_ms = flavor.duration.as_millis(),
                "Flavor finished"
            );
        }
        tracing::info!(result = %outcome.result(), "Test matrix finished");
        Ok(outcome)
    }

    /// Host path of a flavor's JUnit report
    #[must_use]
    pub fn report_path(&self, flavor: &str) -> PathBuf {
        self.config.reports_dir.join(format!("junit-{flavor}.xml"))
    }

    /// Runs one flavor; never fails, failures land in the result
    #[must_use]
    pub fn run_flavor(&self, flavor: &str) -> FlavorResult {
        let start = Instant::now();
        let report_path = self.report_path(flavor);
        let outcome = self.try_run_flavor(flavor, &report_path);

        let (result, report, reason) = match outcome {
            Ok((report, exit_code)) if exit_code == 0 && report.is_clean() => {
                (StageResult::Success, Some(report), None)
            }
            Ok((report, exit_code)) => (
                StageResult::Failure,
                Some(report),
                Some(format!(
                    "exit code {exit_code}, {} failures, {} errors",
                    report.failures, report.errors
                )),
            ),
            Err(err) => (StageResult::Failure, None, Some(err.to_string())),
        };

        if let Some(reason) = &reason {
            tracing::warn!(flavor = %flavor, reason = %reason, "Flavor failed");
        }

        FlavorResult {
            flavor: flavor.to_string(),
            result,
            report,
            report_path,
            reason,
            duration: start.elapsed(),
        }
    }

    fn try_run_flavor(&self, flavor: &str, report_path: &Path) -> ReleaseResult<(TestReport, i32)> {
        let config = self.config.with_flavor(flavor);
        let cli = ContainerCli::new(config.runtime, self.runner);
        let image = config.build_image(self.commit_id);

        if cli.image_exists(&image)? {
            tracing::info!(flavor = %flavor, image = %image, "Reusing image");
        } else {
            let version =
                VersionResolver::new(config.source_dir.clone(), config.package.as_str()).resolve()?;
            ImageBuilder::new(&config, cli).build(&version, self.commit_id)?;
        }

        let reports_dir = absolute(&config.reports_dir)?;
        std::fs::create_dir_all(&reports_dir)?;
        match std::fs::remove_file(report_path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let environment = ComposeEnvironment::for_service(&config, &image, reports_dir.join(flavor))
            .with_project(format!("{}-test-{flavor}", config.name))
            .with_mount(&absolute(&config.source_dir)?, SOURCE_MOUNT)
            .with_mount(&reports_dir, REPORTS_MOUNT)
            .with_working_dir(SOURCE_MOUNT)
            .without_ports();

        let junit = format!("{REPORTS_MOUNT}/junit-{flavor}.xml");
        let run = environment.run(
            &cli,
            &[
                ("JUNIT_XML".to_string(), junit),
                ("FLAVOR".to_string(), flavor.to_string()),
            ],
            &[TEST_COMMAND.to_string()],
        );

        if let Err(err) = environment.down(&cli) {
            tracing::warn!(flavor = %flavor, error = %err, "Teardown failed");
        }

        let output = run?;
        let report = TestReport::from_file(report_path)?;
        Ok((report, output.exit_code))
    }
}

fn absolute(path: &Path) -> ReleaseResult<PathBuf> {
    Ok(std::path::absolute(path)?)
}
