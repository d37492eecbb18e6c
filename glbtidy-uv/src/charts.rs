//! Chart segmentation
//!
//! Faces are grouped by region growing across manifold edges. A neighbour joins the
//! current chart only when the dihedral angle to the face it is reached from and the
//! angle to the chart's seed normal both stay within the limit.

use glbtidy_core::{face_edges, EdgeTopology, TriangleMesh, Vector3f};
use std::collections::VecDeque;
use tracing::debug;

/// A group of faces flattened together
#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub faces: Vec<usize>,
}

/// Split the mesh faces into charts
///
/// Every face belongs to exactly one chart. Charts are seeded in face order.
/// Degenerate faces have no normal and join whichever chart reaches them first.
pub fn segment_charts(mesh: &TriangleMesh, angle_limit_deg: f32) -> Vec<Chart> {
    let cos_limit = angle_limit_deg.to_radians().cos();
    let normals: Vec<Option<Vector3f>> = (0..mesh.face_count())
        .map(|f| mesh.face_cross(f).try_normalize(f32::EPSILON))
        .collect();
    let topology = EdgeTopology::build(&mesh.faces);

    let within = |a: Option<Vector3f>, b: Option<Vector3f>| match (a, b) {
        (Some(a), Some(b)) => a.dot(&b) >= cos_limit,
        _ => true,
    };

    let mut assigned = vec![false; mesh.face_count()];
    let mut charts = Vec::new();

    for seed in 0..mesh.face_count() {
        if assigned[seed] {
            continue;
        }
        assigned[seed] = true;
        let mut seed_normal = normals[seed];
        let mut faces = vec![seed];
        let mut queue = VecDeque::from([seed]);

        while let Some(f) = queue.pop_front() {
            for (a, b) in face_edges(&mesh.faces[f]) {
                let shared = topology.faces_of(a, b);
                if shared.len() != 2 {
                    continue;
                }
                let g = if shared[0] == f { shared[1] } else { shared[0] };
                if assigned[g] {
                    continue;
                }
                if !within(normals[f], normals[g]) || !within(seed_normal, normals[g]) {
                    continue;
                }
                if seed_normal.is_none() {
                    seed_normal = normals[g];
                }
                assigned[g] = true;
                faces.push(g);
                queue.push_back(g);
            }
        }
        charts.push(Chart { faces });
    }

    debug!(charts = charts.len(), angle_limit_deg, "Chart segmentation complete");
    charts
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbtidy_core::Point3f;

    fn cube() -> TriangleMesh {
        let vertices = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, 0.0, 1.0),
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(1.0, 1.0, 1.0),
            Point3f::new(0.0, 1.0, 1.0),
        ];
        let faces = vec![
            [0, 2, 1], [0, 3, 2],
            [4, 5, 6], [4, 6, 7],
            [0, 1, 5], [0, 5, 4],
            [2, 3, 7], [2, 7, 6],
            [1, 2, 6], [1, 6, 5],
            [0, 4, 7], [0, 7, 3],
        ];
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    #[test]
    fn test_cube_splits_per_side() {
        let charts = segment_charts(&cube(), 66.0);
        assert_eq!(charts.len(), 6);
        assert!(charts.iter().all(|c| c.faces.len() == 2));
    }

    #[test]
    fn test_wide_limit_merges_cube() {
        // 90 degree dihedrals pass a 95 degree limit, but opposite sides stay apart
        let charts = segment_charts(&cube(), 95.0);
        assert!(charts.len() < 6);
        let total: usize = charts.iter().map(|c| c.faces.len()).sum();
        assert_eq!(total, 12);
    }

    #[test]
    fn test_flat_grid_is_one_chart() {
        let mut mesh = TriangleMesh::new();
        for y in 0..4 {
            for x in 0..4 {
                mesh.add_vertex(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        for y in 0..3 {
            for x in 0..3 {
                let i = y * 4 + x;
                mesh.add_face([i, i + 1, i + 5]);
                mesh.add_face([i, i + 5, i + 4]);
            }
        }
        assert_eq!(segment_charts(&mesh, 66.0).len(), 1);
    }
}
