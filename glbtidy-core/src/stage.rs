//! Pipeline stage identifiers and non-fatal stage warnings

use serde::{Deserialize, Serialize};
use std::fmt;

/// One processing step applied to a mesh object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Import,
    Dedup,
    LooseGeometry,
    HoleFill,
    Normals,
    Decimation,
    Uv,
    Export,
}

impl Stage {
    /// The six mesh-processing stages in execution order
    pub const PROCESSING: [Stage; 6] = [
        Stage::Dedup,
        Stage::LooseGeometry,
        Stage::HoleFill,
        Stage::Normals,
        Stage::Decimation,
        Stage::Uv,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::Import => "import",
            Stage::Dedup => "dedup",
            Stage::LooseGeometry => "loose-geometry",
            Stage::HoleFill => "hole-fill",
            Stage::Normals => "normals",
            Stage::Decimation => "decimation",
            Stage::Uv => "uv",
            Stage::Export => "export",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A partial-quality outcome that does not stop processing
///
/// Examples: a hole loop that could not be triangulated, a decimation that fell
/// short of its target, a UV chart flattened with folds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: Stage,
    pub message: String,
}

impl StageWarning {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}
