//! Prelude module for common imports

// Re-export pipeline types
pub use crate::pipeline::errors::{ReleaseError, ValidationError};
pub use crate::pipeline::pipeline_def::{Pipeline, PipelineBuilder, PipelineReport};
pub use crate::pipeline::stage::Stage;
pub use crate::pipeline::types::{ReleaseResult, StageResult, Validate};

// Re-export executor types
pub use crate::executor::{
    CommandRunner, HealthStatus, LocalRunner, PipelineExecutor, ProcessCommand, ProcessOutput,
    ScriptedRunner,
};

// Re-export infrastructure types
pub use crate::infrastructure::{
    ComposeEnvironment, Config, ContainerCli, ContainerRuntime, ServiceRuntime, init_logging,
};

// Re-export release stages
pub use crate::release::{
    BuildManifest, ImageBuilder, ImageReference, ManifestStore, MatrixOutcome, PipelineRunner,
    Pusher, TagPlanner, TestMatrixRunner, TestReport, VersionResolver,
};
