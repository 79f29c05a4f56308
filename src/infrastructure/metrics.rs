//! Metrics collection
//!
//! Per-stage timings and outcomes for one pipeline run.

use crate::pipeline::StageResult;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;

/// Timing and outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageMetrics {
    /// Stage name
    pub stage: String,

    /// Outcome
    pub result: StageResult,

    /// Execution duration
    pub duration: Duration,
}

/// Metrics collector for stage executions
#[derive(Debug, Default)]
pub struct MetricsCollector {
    stages: RwLock<Vec<StageMetrics>>,
}

impl MetricsCollector {
    /// Creates a new metrics collector
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records metrics for a stage execution
    pub fn record(&self, metrics: StageMetrics) {
        tracing::debug!(
            stage = %metrics.stage,
            result = %metrics.result,
            duration_ms = metrics.duration.as_millis(),
            "Stage metrics recorded"
        );
        self.stages.write().push(metrics);
    }

    /// Gets metrics for a specific stage (latest run wins)
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<StageMetrics> {
        self.stages
            .read()
            .iter()
            .rev()
            .find(|m| m.stage == stage)
            .cloned()
    }

    /// Gets all recorded metrics, in execution order
    #[must_use]
    pub fn get_all(&self) -> Vec<StageMetrics> {
        self.stages.read().clone()
    }

    /// Sum of all stage durations
    #[must_use]
    pub fn total_duration(&self) -> Duration {
        self.stages.read().iter().map(|m| m.duration).sum()
    }
}
