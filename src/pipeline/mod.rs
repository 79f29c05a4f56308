//! Pipeline domain types and logic

pub mod errors;
pub mod pipeline_def;
pub mod stage;
pub mod types;

pub use errors::{ReleaseError, ValidationError};
pub use pipeline_def::{Pipeline, PipelineBuilder, PipelineReport, StageOutcome};
pub use stage::Stage;
pub use types::{ReleaseResult, StageResult, Validate};
