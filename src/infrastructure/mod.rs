//! Infrastructure layer
//!
//! This module contains external integrations and adapters.

pub mod compose;
mod config;
pub mod container;
mod logging;
mod metrics;

pub use compose::{ComposeEnvironment, ComposeFile, ComposeService};
pub use config::{Config, DEFAULT_FLAVOR, DEFAULT_MANIFEST, DEFAULT_NAME, ServiceRuntime};
pub use container::{BuildRequest, ContainerCli, ContainerRuntime, VersionReporter};
pub use logging::init_logging;
pub use metrics::{MetricsCollector, StageMetrics};
