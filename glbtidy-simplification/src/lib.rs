//! Mesh decimation for glbtidy
//!
//! This crate reduces triangle count toward a target budget while preserving
//! shape and manifoldness:
//! - Quadric error metrics per vertex
//! - Greedy edge collapse driven by a priority queue

pub mod quadric_error;
pub mod edge_collapse;
pub mod result;

pub use quadric_error::*;
pub use edge_collapse::*;
pub use result::*;

use glbtidy_core::{Error, Result, TriangleMesh};

/// Reduce the triangle count of a mesh
pub trait MeshSimplifier {
    /// Decimate toward `target_faces`
    ///
    /// A mesh already at or below the target comes back untouched.
    fn decimate(&self, mesh: TriangleMesh, target_faces: usize) -> Result<DecimationResult>;

    /// Simplify mesh with target reduction ratio (0.0 = no reduction, 1.0 = maximum reduction)
    fn simplify(&self, mesh: &TriangleMesh, reduction_ratio: f32) -> Result<TriangleMesh> {
        if !(0.0..=1.0).contains(&reduction_ratio) {
            return Err(Error::InvalidInput(
                "Reduction ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        let target = ((1.0 - reduction_ratio) * mesh.face_count() as f32).round() as usize;
        Ok(self.decimate(mesh.clone(), target)?.mesh)
    }
}
