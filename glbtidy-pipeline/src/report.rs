//! Pipeline states and run reports

use glbtidy_core::{Error, Stage, StageWarning};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Position of one object in the linear processing sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PipelineState {
    Imported,
    Deduped,
    Pruned,
    Filled,
    Normalized,
    Decimated,
    Unwrapped,
    Exported,
}

impl PipelineState {
    /// State reached once `stage` completes
    pub fn after(stage: Stage) -> Self {
        match stage {
            Stage::Import => PipelineState::Imported,
            Stage::Dedup => PipelineState::Deduped,
            Stage::LooseGeometry => PipelineState::Pruned,
            Stage::HoleFill => PipelineState::Filled,
            Stage::Normals => PipelineState::Normalized,
            Stage::Decimation => PipelineState::Decimated,
            Stage::Uv => PipelineState::Unwrapped,
            Stage::Export => PipelineState::Exported,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            PipelineState::Imported => "imported",
            PipelineState::Deduped => "deduped",
            PipelineState::Pruned => "pruned",
            PipelineState::Filled => "filled",
            PipelineState::Normalized => "normalized",
            PipelineState::Decimated => "decimated",
            PipelineState::Unwrapped => "unwrapped",
            PipelineState::Exported => "exported",
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Wall time spent in one stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub duration: Duration,
}

/// How processing of one object ended
#[derive(Debug)]
pub enum ObjectOutcome {
    Succeeded,
    SucceededWithWarnings(Vec<StageWarning>),
    /// The object was passed through unmodified
    Failed(Error),
}

impl ObjectOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, ObjectOutcome::Failed(_))
    }

    pub fn warnings(&self) -> &[StageWarning] {
        match self {
            ObjectOutcome::SucceededWithWarnings(warnings) => warnings,
            _ => &[],
        }
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            ObjectOutcome::Failed(err) => Some(err),
            _ => None,
        }
    }
}

/// Per-object record of a pipeline run
#[derive(Debug)]
pub struct ObjectReport {
    pub name: String,
    /// Last state the object reached
    pub state: PipelineState,
    pub outcome: ObjectOutcome,
    pub timings: Vec<StageTiming>,
    pub faces_before: usize,
    pub faces_after: usize,
    pub vertices_before: usize,
    pub vertices_after: usize,
}

impl ObjectReport {
    pub fn total_time(&self) -> Duration {
        self.timings.iter().map(|t| t.duration).sum()
    }

    pub fn timing(&self, stage: Stage) -> Option<Duration> {
        self.timings
            .iter()
            .find(|t| t.stage == stage)
            .map(|t| t.duration)
    }
}

impl fmt::Display for ObjectReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            ObjectOutcome::Failed(err) => write!(f, "{}: failed at {}: {}", self.name, self.state, err),
            outcome => {
                write!(
                    f,
                    "{}: {} -> {} faces, {} -> {} vertices in {:.2?}",
                    self.name,
                    self.faces_before,
                    self.faces_after,
                    self.vertices_before,
                    self.vertices_after,
                    self.total_time()
                )?;
                for warning in outcome.warnings() {
                    write!(f, "\n  warning {warning}")?;
                }
                Ok(())
            }
        }
    }
}

/// Aggregated outcome of processing a scene
#[derive(Debug, Default)]
pub struct RunReport {
    pub objects: Vec<ObjectReport>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn succeeded(&self) -> usize {
        self.objects.iter().filter(|o| o.outcome.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.objects.len() - self.succeeded()
    }

    pub fn warning_count(&self) -> usize {
        self.objects.iter().map(|o| o.outcome.warnings().len()).sum()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &StageWarning> {
        self.objects.iter().flat_map(|o| o.outcome.warnings())
    }

    /// True when there were objects and none of them made it through
    pub fn all_failed(&self) -> bool {
        !self.objects.is_empty() && self.succeeded() == 0
    }

    /// Total time per stage summed over objects
    pub fn stage_totals(&self) -> Vec<StageTiming> {
        Stage::PROCESSING
            .iter()
            .map(|&stage| StageTiming {
                stage,
                duration: self.objects.iter().filter_map(|o| o.timing(stage)).sum(),
            })
            .collect()
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for object in &self.objects {
            writeln!(f, "{object}")?;
        }
        write!(
            f,
            "{} objects: {} succeeded, {} failed, {} warnings in {:.2?}",
            self.objects.len(),
            self.succeeded(),
            self.failed(),
            self.warning_count(),
            self.elapsed
        )
    }
}
