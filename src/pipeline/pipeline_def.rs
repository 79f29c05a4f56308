//! Pipeline definition and builder

#![allow(clippy::must_use_candidate, clippy::return_self_not_must_use)]

use crate::pipeline::errors::ValidationError;
use crate::pipeline::stage::Stage;
use crate::pipeline::types::{StageResult, Validate};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

/// Ordered list of stages to run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    /// Stages in execution order
    pub stages: Vec<Stage>,
}

impl Validate for Pipeline {
    type Error = ValidationError;

    fn validate(&self) -> Result<(), Self::Error> {
        if self.stages.is_empty() {
            return Err(ValidationError::EmptyPipeline);
        }

        let mut seen = HashSet::new();
        for stage in &self.stages {
            if !seen.insert(stage) {
                return Err(ValidationError::DuplicateStage {
                    stage: stage.to_string(),
                });
            }
        }

        Ok(())
    }
}

impl Pipeline {
    /// Creates a new pipeline builder
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Builds the pipeline for a list of stage or target names
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] for an unknown name, a repeated stage
    /// or an empty list.
    pub fn from_targets<I, S>(targets: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = PipelineBuilder::new();
        for target in targets {
            builder = builder.stages(Stage::target(target.as_ref())?);
        }
        builder.build()
    }

    /// Returns number of stages
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

impl fmt::Display for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.stages.iter().map(|s| s.name()).collect();
        write!(f, "Pipeline[{}]", names.join(" -> "))
    }
}

/// Builder for creating pipelines
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    stages: Vec<Stage>,
}

impl PipelineBuilder {
    /// Creates a new pipeline builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stage to pipeline
    pub fn stage(mut self, stage: Stage) -> Self {
        self.stages.push(stage);
        self
    }

    /// Adds multiple stages to pipeline
    pub fn stages(mut self, stages: impl IntoIterator<Item = Stage>) -> Self {
        self.stages.extend(stages);
        self
    }

    /// Builds and validates the pipeline
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPipeline`] or
    /// [`ValidationError::DuplicateStage`].
    pub fn build(self) -> Result<Pipeline, ValidationError> {
        let pipeline = Pipeline {
            stages: self.stages,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }
}

/// Result of one executed stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageOutcome {
    /// Stage that ran
    pub stage: Stage,
    /// Its result
    pub result: StageResult,
    /// Wall-clock time
    pub duration: Duration,
}

/// What a pipeline run did, stage by stage
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    /// Run identifier used in logs
    pub run_id: String,
    /// Executed stages in order
    pub stages: Vec<StageOutcome>,
}

impl PipelineReport {
    /// Creates an empty report for a run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            stages: Vec::new(),
        }
    }

    /// Appends a stage outcome
    pub fn record(&mut self, stage: Stage, result: StageResult, duration: Duration) {
        self.stages.push(StageOutcome {
            stage,
            result,
            duration,
        });
    }

    /// Result of a stage, if it ran
    pub fn result_of(&self, stage: Stage) -> Option<StageResult> {
        self.stages
            .iter()
            .find(|o| o.stage == stage)
            .map(|o| o.result)
    }

    /// Returns true if every executed stage succeeded
    pub fn passed(&self) -> bool {
        self.stages.iter().all(|o| !o.result.is_failure())
    }

    /// Total time spent in stages
    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|o| o.duration).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_builder_keeps_order() {
        let pipeline = Pipeline::builder()
            .stage(Stage::Build)
            .stage(Stage::Manifest)
            .build()
            .unwrap();

        assert_eq!(pipeline.stages, vec![Stage::Build, Stage::Manifest]);
        assert_eq!(pipeline.to_string(), "Pipeline[build -> manifest]");
    }

    #[test]
    fn test_empty_pipeline_is_rejected() {
        assert_eq!(
            Pipeline::builder().build().unwrap_err(),
            ValidationError::EmptyPipeline
        );
    }

    #[test]
    fn test_duplicate_stage_is_rejected() {
        let err = Pipeline::from_targets(["release", "push"]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::DuplicateStage {
                stage: "push".to_string()
            }
        );
    }

    #[test]
    fn test_from_targets_expands_composites() {
        let pipeline = Pipeline::from_targets(["build", "manifest", "deliver"]).unwrap();
        assert_eq!(
            pipeline.stages,
            vec![Stage::Build, Stage::Manifest, Stage::Tag, Stage::Push]
        );
    }

    #[test]
    fn test_report_passed() {
        let mut report = PipelineReport::new("run-1");
        report.record(Stage::Build, StageResult::Success, Duration::from_millis(5));
        assert!(report.passed());
        report.record(Stage::Test, StageResult::Failure, Duration::from_millis(7));
        assert!(!report.passed());
        assert_eq!(report.result_of(Stage::Test), Some(StageResult::Failure));
        assert_eq!(report.result_of(Stage::Push), None);
        assert_eq!(report.total_duration(), Duration::from_millis(12));
    }
}
