//! Loose geometry removal
//!
//! Drops face-connected components that carry no real surface, plus any vertex that
//! no face references.

use glbtidy_core::{face_components, EdgeTopology, TriangleMesh};
use tracing::{debug, info};

/// Parameters for loose geometry removal
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LooseParams {
    /// Components with fewer faces than this are dropped
    pub min_component_faces: usize,
    /// A face counts as real surface only when its area exceeds this
    pub area_threshold: f32,
}

impl Default for LooseParams {
    fn default() -> Self {
        Self {
            min_component_faces: 1,
            area_threshold: 1e-12,
        }
    }
}

impl LooseParams {
    pub fn with_params(min_component_faces: usize, area_threshold: f32) -> Self {
        Self {
            min_component_faces,
            area_threshold,
        }
    }
}

/// Summary of a loose geometry pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LooseReport {
    pub components: usize,
    pub removed_components: usize,
    pub removed_faces: usize,
    pub removed_vertices: usize,
}

/// Remove loose geometry in place
///
/// A component (faces connected through shared edges) is dropped when it has fewer than
/// `min_component_faces` faces or when none of its faces has area above
/// `area_threshold`. Unreferenced vertices are removed afterwards and the remaining
/// arrays compacted.
pub fn remove_loose_geometry(mesh: &mut TriangleMesh, params: &LooseParams) -> LooseReport {
    let topology = EdgeTopology::build(&mesh.faces);
    let components = face_components(&mesh.faces, &topology, false);

    let mut report = LooseReport {
        components: components.len(),
        ..Default::default()
    };

    let mut keep_face = vec![true; mesh.face_count()];
    for component in &components {
        let too_small = component.len() < params.min_component_faces;
        let no_area = !component
            .iter()
            .any(|&f| mesh.face_area(f) > params.area_threshold);
        if too_small || no_area {
            debug!(
                faces = component.len(),
                too_small,
                no_area,
                "Dropping loose component"
            );
            report.removed_components += 1;
            report.removed_faces += component.len();
            for &f in component {
                keep_face[f] = false;
            }
        }
    }

    if report.removed_faces > 0 {
        let mut idx = 0;
        mesh.faces.retain(|_| {
            let keep = keep_face[idx];
            idx += 1;
            keep
        });
    }
    report.removed_vertices = mesh.remove_unreferenced_vertices();

    info!(
        components = report.components,
        removed_components = report.removed_components,
        removed_faces = report.removed_faces,
        removed_vertices = report.removed_vertices,
        "Loose geometry removal complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbtidy_core::Point3f;

    fn quad_with_debris() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                // Quad
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                // Isolated vertex
                Point3f::new(9.0, 9.0, 9.0),
                // Zero-area sliver (collinear)
                Point3f::new(5.0, 0.0, 0.0),
                Point3f::new(6.0, 0.0, 0.0),
                Point3f::new(7.0, 0.0, 0.0),
                // Lone triangle
                Point3f::new(0.0, 0.0, 3.0),
                Point3f::new(1.0, 0.0, 3.0),
                Point3f::new(0.0, 1.0, 3.0),
            ],
            vec![[0, 1, 2], [0, 2, 3], [5, 6, 7], [8, 9, 10]],
        )
    }

    #[test]
    fn test_removes_isolated_vertices_and_zero_area() {
        let mut mesh = quad_with_debris();
        let report = remove_loose_geometry(&mut mesh, &LooseParams::default());
        assert_eq!(report.components, 3);
        assert_eq!(report.removed_components, 1);
        assert_eq!(report.removed_faces, 1);
        assert_eq!(report.removed_vertices, 4);
        assert_eq!(mesh.face_count(), 3);
        assert_eq!(mesh.vertex_count(), 7);
        assert!(mesh.validate().is_ok());
    }

    #[test]
    fn test_min_component_faces() {
        let mut mesh = quad_with_debris();
        let params = LooseParams::with_params(2, 1e-12);
        remove_loose_geometry(&mut mesh, &params);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3]]);
        assert_eq!(mesh.vertex_count(), 4);
    }

    #[test]
    fn test_clean_mesh_untouched() {
        let mut mesh = quad_with_debris();
        remove_loose_geometry(&mut mesh, &LooseParams::default());
        let cleaned = mesh.clone();
        let report = remove_loose_geometry(&mut mesh, &LooseParams::default());
        assert_eq!(report.removed_faces + report.removed_vertices, 0);
        assert_eq!(mesh, cleaned);
    }
}
