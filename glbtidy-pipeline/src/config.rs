//! Pipeline configuration

use glbtidy_cleanup::{DedupParams, HoleFillParams, LooseParams};
use glbtidy_core::{Error, Result};
use glbtidy_simplification::EdgeCollapseSimplifier;
use glbtidy_uv::UvParams;
use serde::{Deserialize, Serialize};

/// Every tunable of a pipeline run, with the defaults of the command-line tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Triangle budget per object
    pub target_faces: usize,
    /// Vertex merge distance in model units
    pub dedup_epsilon: f32,
    /// Components with fewer faces are removed as loose geometry
    pub min_component_faces: usize,
    /// Faces at or below this area do not count as surface
    pub loose_area_threshold: f32,
    /// Boundary loops longer than this stay open; `None` fills all
    pub max_hole_edges: Option<usize>,
    pub planarity_tolerance: f32,
    /// Stop decimating once the cheapest collapse costs more than this
    pub max_collapse_error: Option<f64>,
    pub preserve_boundary: bool,
    pub boundary_weight: f64,
    /// UV chart angle limit in degrees
    pub angle_limit_deg: f32,
    /// Gap between UV islands
    pub island_margin: f32,
    pub uv_max_iterations: usize,
    /// Objects with more input faces fail with a resource error
    pub max_faces: usize,
    /// Check mesh consistency after every stage
    pub validate_stages: bool,
    /// Process the objects of a scene concurrently
    pub parallel: bool,
    /// Worker count for parallel runs; `None` uses one per core
    pub num_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target_faces: 50_000,
            dedup_epsilon: 1e-4,
            min_component_faces: 1,
            loose_area_threshold: 1e-12,
            max_hole_edges: None,
            planarity_tolerance: 0.05,
            max_collapse_error: None,
            preserve_boundary: false,
            boundary_weight: 100.0,
            angle_limit_deg: 66.0,
            island_margin: 0.01,
            uv_max_iterations: 5000,
            max_faces: 50_000_000,
            validate_stages: true,
            parallel: true,
            num_threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn with_target_faces(mut self, target_faces: usize) -> Self {
        self.target_faces = target_faces;
        self
    }

    pub fn with_dedup_epsilon(mut self, epsilon: f32) -> Self {
        self.dedup_epsilon = epsilon;
        self
    }

    pub fn with_angle_limit(mut self, angle_limit_deg: f32) -> Self {
        self.angle_limit_deg = angle_limit_deg;
        self
    }

    pub fn with_island_margin(mut self, island_margin: f32) -> Self {
        self.island_margin = island_margin;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_threads(mut self, num_threads: usize) -> Self {
        self.num_threads = Some(num_threads);
        self
    }

    pub fn with_max_faces(mut self, max_faces: usize) -> Self {
        self.max_faces = max_faces;
        self
    }

    /// Reject values no stage can work with
    pub fn validate(&self) -> Result<()> {
        let invalid = |message: String| Err(Error::InvalidInput(message));
        if self.target_faces == 0 {
            return invalid("target face count must be a positive integer".to_string());
        }
        if !(self.dedup_epsilon.is_finite() && self.dedup_epsilon >= 0.0) {
            return invalid(format!("dedup epsilon must be >= 0, got {}", self.dedup_epsilon));
        }
        if !(self.planarity_tolerance.is_finite() && self.planarity_tolerance >= 0.0) {
            return invalid(format!(
                "planarity tolerance must be >= 0, got {}",
                self.planarity_tolerance
            ));
        }
        if !(self.boundary_weight.is_finite() && self.boundary_weight >= 0.0) {
            return invalid(format!("boundary weight must be >= 0, got {}", self.boundary_weight));
        }
        if self.max_faces == 0 {
            return invalid("max faces must be positive".to_string());
        }
        if self.num_threads == Some(0) {
            return invalid("thread count must be positive".to_string());
        }
        self.uv_params().validate()
    }

    pub fn dedup_params(&self) -> DedupParams {
        DedupParams::with_epsilon(self.dedup_epsilon)
    }

    pub fn loose_params(&self) -> LooseParams {
        LooseParams::with_params(self.min_component_faces, self.loose_area_threshold)
    }

    pub fn hole_fill_params(&self) -> HoleFillParams {
        HoleFillParams {
            max_hole_edges: self.max_hole_edges,
            planarity_tolerance: self.planarity_tolerance,
        }
    }

    pub fn simplifier(&self) -> EdgeCollapseSimplifier {
        EdgeCollapseSimplifier::with_params(
            self.max_collapse_error,
            self.preserve_boundary,
            self.boundary_weight,
        )
    }

    pub fn uv_params(&self) -> UvParams {
        UvParams {
            angle_limit_deg: self.angle_limit_deg,
            island_margin: self.island_margin,
            max_iterations: self.uv_max_iterations,
            ..UvParams::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.target_faces, 50_000);
        assert_eq!(config.dedup_params().epsilon, 1e-4);
        assert_eq!(config.uv_params().angle_limit_deg, 66.0);
        assert_eq!(config.uv_params().island_margin, 0.01);
    }

    #[test]
    fn test_zero_target_rejected() {
        let config = PipelineConfig::default().with_target_faces(0);
        assert!(matches!(config.validate(), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_bad_values_rejected() {
        assert!(PipelineConfig::default().with_dedup_epsilon(f32::NAN).validate().is_err());
        assert!(PipelineConfig::default().with_angle_limit(0.0).validate().is_err());
        assert!(PipelineConfig::default().with_island_margin(0.5).validate().is_err());
        assert!(PipelineConfig::default().with_threads(0).validate().is_err());
        assert!(PipelineConfig::default().with_max_faces(0).validate().is_err());
    }
}
