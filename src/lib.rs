//! # wps-release - Release tooling for the WPS service image
//!
//! Builds the service image for a platform flavor, records what was built
//! in a manifest file, promotes the build under its version aliases and
//! runs the test suite for several flavors in isolated compose projects.
//!
//! ## Stages
//!
//! | Stage | Reads | Writes |
//! |-------|-------|--------|
//! | `build` | source tree, git | local image `<name>:<flavor>-<commitid>` |
//! | `manifest` | local image | manifest file |
//! | `tag` / `push` | manifest file | registry aliases |
//! | `test` | source tree | JUnit reports, `summary.json` |
//!
//! Build and promotion communicate through the manifest file only, so they
//! can run in separate jobs.
//!
//! ## Example
//!
//! ```no_run
//! use wps_release::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let runner = LocalRunner::new();
//! let release = PipelineRunner::new(&config, &runner);
//! let report = release.execute(&Pipeline::from_targets(["release"])?)?;
//! assert!(report.passed());
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod executor;
pub mod infrastructure;
pub mod pipeline;
pub mod release;

// Prelude module for common imports
pub mod prelude;

// Re-export commonly used types
pub use executor::{
    CommandRunner, HealthStatus, LocalRunner, PipelineExecutor, ProcessCommand, ProcessOutput,
    ScriptedRunner, expand_variables,
};
pub use infrastructure::{ComposeEnvironment, Config, ContainerCli, ContainerRuntime, MetricsCollector};
pub use pipeline::{
    Pipeline, PipelineBuilder, PipelineReport, ReleaseError, ReleaseResult, Stage, StageResult,
    Validate, ValidationError,
};
pub use release::{BuildManifest, ManifestStore, PipelineRunner, TagPlanner, TestMatrixRunner};

/// Version of the wps-release crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
