//! Consistent winding and normal recomputation

use glbtidy_core::{
    face_components, face_edges, to_f64, Bounded, EdgeTopology, TriangleMesh, Vector3d,
};
use std::collections::VecDeque;
use tracing::{debug, info};

/// Summary of a normal recomputation pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalReport {
    pub components: usize,
    /// Faces whose winding was reversed
    pub flipped_faces: usize,
    /// Faces whose orientation disagreed with an already visited neighbour
    /// (non-orientable surfaces)
    pub conflicts: usize,
}

#[inline]
fn has_directed_edge(face: &[usize; 3], a: usize, b: usize) -> bool {
    face_edges(face).contains(&(a, b))
}

/// Make face winding consistent and recompute face and vertex normals
///
/// Components are faces connected through manifold edges. Starting from the
/// lowest-index face of each component, a breadth-first walk flips every neighbour
/// that runs the shared edge in the same direction as the current face. The whole
/// component is then turned outward when it encloses a clearly non-zero signed
/// volume, otherwise toward the area-weighted majority of its original winding.
/// Vertex normals are stored as the area-weighted sum of face normals.
pub fn recompute_normals(mesh: &mut TriangleMesh) -> NormalReport {
    let topology = EdgeTopology::build(&mesh.faces);
    let components = face_components(&mesh.faces, &topology, true);
    let mut report = NormalReport {
        components: components.len(),
        ..Default::default()
    };

    let volume_eps = {
        let d = mesh.diagonal() as f64;
        1e-6 * d * d * d
    };

    let mut flip = vec![false; mesh.face_count()];
    let mut visited = vec![false; mesh.face_count()];

    for component in &components {
        let seed = component[0];
        visited[seed] = true;
        let mut queue = VecDeque::from([seed]);

        while let Some(f) = queue.pop_front() {
            let oriented = oriented_face(&mesh.faces[f], flip[f]);
            for (a, b) in face_edges(&oriented) {
                let shared = topology.faces_of(a, b);
                if shared.len() != 2 {
                    continue;
                }
                let g = if shared[0] == f { shared[1] } else { shared[0] };
                // Consistent neighbours traverse the shared edge as b -> a
                let agrees = has_directed_edge(&mesh.faces[g], b, a);
                if visited[g] {
                    if agrees == flip[g] {
                        report.conflicts += 1;
                    }
                    continue;
                }
                visited[g] = true;
                flip[g] = !agrees;
                queue.push_back(g);
            }
        }

        if should_invert(mesh, component, &flip, volume_eps) {
            for &f in component {
                flip[f] = !flip[f];
            }
        }
    }

    for (face, &flipped) in mesh.faces.iter_mut().zip(&flip) {
        if flipped {
            face.swap(1, 2);
            report.flipped_faces += 1;
        }
    }
    mesh.update_vertex_normals();

    info!(
        components = report.components,
        flipped = report.flipped_faces,
        conflicts = report.conflicts,
        "Normal recomputation complete"
    );
    report
}

fn oriented_face(face: &[usize; 3], flipped: bool) -> [usize; 3] {
    if flipped {
        [face[0], face[2], face[1]]
    } else {
        *face
    }
}

/// Decide whether a consistently wound component should be reversed as a whole
fn should_invert(mesh: &TriangleMesh, component: &[usize], flip: &[bool], volume_eps: f64) -> bool {
    let centroid = {
        let mut sum = Vector3d::zeros();
        let mut count = 0usize;
        for &f in component {
            for &v in &mesh.faces[f] {
                sum += to_f64(&mesh.vertices[v]).coords;
                count += 1;
            }
        }
        sum / count as f64
    };

    let mut volume = 0.0f64;
    let mut majority = 0.0f64;
    for &f in component {
        let [a, b, c] = oriented_face(&mesh.faces[f], flip[f]);
        let pa = to_f64(&mesh.vertices[a]).coords - centroid;
        let pb = to_f64(&mesh.vertices[b]).coords - centroid;
        let pc = to_f64(&mesh.vertices[c]).coords - centroid;
        volume += pa.dot(&pb.cross(&pc)) / 6.0;

        let area = 0.5 * (pb - pa).cross(&(pc - pa)).norm();
        majority += if flip[f] { -area } else { area };
    }

    debug!(faces = component.len(), volume, majority, "Component orientation");
    if volume.abs() > volume_eps {
        volume < 0.0
    } else {
        majority < 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use glbtidy_core::{Point3f, Vector3f};

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
            [0, 2, 1], [0, 3, 2], // bottom
            [4, 5, 6], [4, 6, 7], // top
            [0, 1, 5], [0, 5, 4], // front
            [2, 3, 7], [2, 7, 6], // back
            [1, 2, 6], [1, 6, 5], // right
            [0, 4, 7], [0, 7, 3], // left
        ];
        TriangleMesh::from_vertices_and_faces(vertices, faces)
    }

    fn grid(n: usize) -> TriangleMesh {
        let mut mesh = TriangleMesh::new();
        for y in 0..=n {
            for x in 0..=n {
                mesh.add_vertex(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let w = n + 1;
        for y in 0..n {
            for x in 0..n {
                let i = y * w + x;
                mesh.add_face([i, i + 1, i + w + 1]);
                mesh.add_face([i, i + w + 1, i + w]);
            }
        }
        mesh
    }

    #[test]
    fn test_consistent_cube_untouched() {
        let mut mesh = cube();
        let report = recompute_normals(&mut mesh);
        assert_eq!(report.flipped_faces, 0);
        assert_eq!(mesh.faces, cube().faces);
        let normals = mesh.normals.as_ref().unwrap();
        // Corner normals point away from the centre
        let expected = Vector3f::new(-1.0, -1.0, -1.0).normalize();
        assert!(normals[0].dot(&expected) > 0.9);
    }

    #[test]
    fn test_single_flip_restored_on_closed_mesh() {
        let mut mesh = cube();
        mesh.faces[5].swap(1, 2);
        let report = recompute_normals(&mut mesh);
        assert_eq!(report.flipped_faces, 1);
        assert_eq!(mesh.faces, cube().faces);
    }

    #[test]
    fn test_inside_out_cube_turned_outward() {
        let mut mesh = cube();
        for f in mesh.faces.iter_mut() {
            f.swap(1, 2);
        }
        let report = recompute_normals(&mut mesh);
        assert_eq!(report.flipped_faces, 12);
        assert_eq!(mesh.faces, cube().faces);
    }

    #[test]
    fn test_single_flip_restored_on_open_surface() {
        let mut mesh = grid(4);
        let original = mesh.faces.clone();
        mesh.faces[7].swap(1, 2);
        recompute_normals(&mut mesh);
        assert_eq!(mesh.faces, original);
        for n in mesh.normals.as_ref().unwrap() {
            assert_relative_eq!(*n, Vector3f::z(), epsilon = 1e-5);
        }
    }

    #[test]
    fn test_degenerate_face_gets_default_normal() {
        let mut mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        recompute_normals(&mut mesh);
        for n in mesh.normals.as_ref().unwrap() {
            assert_relative_eq!(*n, Vector3f::z());
        }
    }

    #[test]
    fn test_adjacent_normals_agree() {
        let mut mesh = cube();
        mesh.faces[2].swap(1, 2);
        mesh.faces[9].swap(1, 2);
        recompute_normals(&mut mesh);
        let face_normals = mesh.calculate_face_normals();
        let topo = EdgeTopology::build(&mesh.faces);
        for (f, face) in mesh.faces.iter().enumerate() {
            let mut avg = Vector3f::zeros();
            for (a, b) in face_edges(face) {
                for &g in topo.faces_of(a, b) {
                    if g != f {
                        avg += face_normals[g];
                    }
                }
            }
            assert!(face_normals[f].dot(&avg) >= 0.0);
        }
    }
}
