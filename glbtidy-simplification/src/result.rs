//! Result types for decimation

use glbtidy_core::{Stage, StageWarning, TriangleMesh};

/// Result of decimating one mesh
#[derive(Debug, Clone)]
pub struct DecimationResult {
    pub mesh: TriangleMesh,
    pub original_faces: usize,
    pub final_faces: usize,
    pub target_faces: usize,
    pub collapses_performed: usize,
    /// Candidates rejected by the topology checks
    pub collapses_rejected: usize,
}

impl DecimationResult {
    /// Result for a mesh that needed no decimation
    pub fn unchanged(mesh: TriangleMesh, target_faces: usize) -> Self {
        let faces = mesh.face_count();
        Self {
            mesh,
            original_faces: faces,
            final_faces: faces,
            target_faces,
            collapses_performed: 0,
            collapses_rejected: 0,
        }
    }

    /// Faces left above the target; zero when the target was met
    pub fn shortfall(&self) -> usize {
        self.final_faces.saturating_sub(self.target_faces)
    }

    /// final / original face count
    pub fn reduction_ratio(&self) -> f64 {
        if self.original_faces == 0 {
            1.0
        } else {
            self.final_faces as f64 / self.original_faces as f64
        }
    }

    pub fn was_decimated(&self) -> bool {
        self.collapses_performed > 0
    }

    /// Shortfall expressed as a stage warning, if any
    pub fn warning(&self) -> Option<StageWarning> {
        (self.shortfall() > 0).then(|| {
            StageWarning::new(
                Stage::Decimation,
                format!(
                    "reached {} faces, {} above the target of {} ({} collapses rejected)",
                    self.final_faces,
                    self.shortfall(),
                    self.target_faces,
                    self.collapses_rejected
                ),
            )
        })
    }
}

impl std::fmt::Display for DecimationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Decimation: {} -> {} faces (target {}, {:.1}% kept, {} collapses)",
            self.original_faces,
            self.final_faces,
            self.target_faces,
            self.reduction_ratio() * 100.0,
            self.collapses_performed
        )
    }
}
