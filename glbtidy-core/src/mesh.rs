//! Mesh data structures and functionality

use crate::error::{Error, Result};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// Marker for a vertex slot that was removed during compaction
pub const REMOVED: usize = usize::MAX;

/// An indexed triangle mesh with optional per-vertex attributes
///
/// Attribute arrays, when present, hold exactly one entry per vertex.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
    pub normals: Option<Vec<Vector3f>>,
    pub uvs: Option<Vec<UV>>,
    pub colors: Option<Vec<[u8; 3]>>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
            normals: None,
            uvs: None,
            colors: None,
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            faces,
            normals: None,
            uvs: None,
            colors: None,
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Unnormalized normal of a face; its length is twice the face area
    pub fn face_cross(&self, face_idx: usize) -> Vector3f {
        let [a, b, c] = self.faces[face_idx];
        triangle_cross(&self.vertices[a], &self.vertices[b], &self.vertices[c])
    }

    /// Area of a face
    pub fn face_area(&self, face_idx: usize) -> f32 {
        0.5 * self.face_cross(face_idx).norm()
    }

    /// Total surface area
    pub fn surface_area(&self) -> f32 {
        (0..self.faces.len()).map(|f| self.face_area(f)).sum()
    }

    /// Calculate unit face normals; degenerate faces get +Z
    pub fn calculate_face_normals(&self) -> Vec<Vector3f> {
        (0..self.faces.len())
            .map(|f| {
                self.face_cross(f)
                    .try_normalize(f32::EPSILON)
                    .unwrap_or_else(Vector3f::z)
            })
            .collect()
    }

    /// Area-weighted vertex normals
    ///
    /// Each face contributes its cross product (twice its area along its normal) to
    /// its three corners. Vertices with no non-degenerate incident face get +Z.
    pub fn calculate_vertex_normals(&self) -> Vec<Vector3f> {
        let mut accum = vec![Vector3f::zeros(); self.vertices.len()];
        for (f, face) in self.faces.iter().enumerate() {
            let n = self.face_cross(f);
            for &v in face {
                accum[v] += n;
            }
        }
        accum
            .into_iter()
            .map(|n| n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::z))
            .collect()
    }

    /// Recompute and store area-weighted vertex normals
    pub fn update_vertex_normals(&mut self) {
        let normals = self.calculate_vertex_normals();
        self.set_normals(normals);
    }

    /// Set vertex normals
    pub fn set_normals(&mut self, normals: Vec<Vector3f>) {
        if normals.len() == self.vertices.len() {
            self.normals = Some(normals);
        }
    }

    /// Set texture coordinates
    pub fn set_uvs(&mut self, uvs: Vec<UV>) {
        if uvs.len() == self.vertices.len() {
            self.uvs = Some(uvs);
        }
    }

    /// Set vertex colors
    pub fn set_colors(&mut self, colors: Vec<[u8; 3]>) {
        if colors.len() == self.vertices.len() {
            self.colors = Some(colors);
        }
    }

    /// Check the structural invariants every stage relies on
    ///
    /// Face indices must be in bounds and distinct within a face, positions finite,
    /// and attribute arrays sized to the vertex array.
    pub fn validate(&self) -> Result<()> {
        let n = self.vertices.len();
        if let Some(i) = self.vertices.iter().position(|p| !p.coords.iter().all(|c| c.is_finite())) {
            return Err(Error::InvalidInput(format!("vertex {i} has a non-finite coordinate")));
        }
        for (f, face) in self.faces.iter().enumerate() {
            if face.iter().any(|&v| v >= n) {
                return Err(Error::InvalidInput(format!(
                    "face {f} references a vertex out of range ({face:?}, {n} vertices)"
                )));
            }
            if face[0] == face[1] || face[1] == face[2] || face[0] == face[2] {
                return Err(Error::InvalidInput(format!("face {f} repeats a vertex ({face:?})")));
            }
        }
        let attr_ok = self.normals.as_ref().map_or(true, |a| a.len() == n)
            && self.uvs.as_ref().map_or(true, |a| a.len() == n)
            && self.colors.as_ref().map_or(true, |a| a.len() == n);
        if !attr_ok {
            return Err(Error::InvalidInput(
                "attribute array length differs from vertex count".to_string(),
            ));
        }
        Ok(())
    }

    /// Drop faces that repeat a vertex index; returns how many were removed
    pub fn remove_degenerate_faces(&mut self) -> usize {
        let before = self.faces.len();
        self.faces
            .retain(|f| f[0] != f[1] && f[1] != f[2] && f[0] != f[2]);
        before - self.faces.len()
    }

    /// Keep only the vertices flagged in `keep`, preserving their order
    ///
    /// Returns the old-to-new index map ([`REMOVED`] for dropped vertices). Faces that
    /// reference a dropped vertex are removed, the rest are remapped.
    pub fn compact_vertices(&mut self, keep: &[bool]) -> Vec<usize> {
        debug_assert_eq!(keep.len(), self.vertices.len());
        let mut remap = vec![REMOVED; self.vertices.len()];
        let mut order = Vec::with_capacity(self.vertices.len());
        for (old, _) in keep.iter().enumerate().filter(|&(_, &k)| k) {
            remap[old] = order.len();
            order.push(old);
        }

        self.vertices = order.iter().map(|&i| self.vertices[i]).collect();
        self.normals = select(&self.normals, &order);
        self.uvs = select(&self.uvs, &order);
        self.colors = select(&self.colors, &order);

        self.faces = self
            .faces
            .iter()
            .filter_map(|f| {
                let mapped = [remap[f[0]], remap[f[1]], remap[f[2]]];
                (!mapped.contains(&REMOVED)).then_some(mapped)
            })
            .collect();
        remap
    }

    /// Remove vertices that no face references; returns how many were removed
    pub fn remove_unreferenced_vertices(&mut self) -> usize {
        let mut used = vec![false; self.vertices.len()];
        for face in &self.faces {
            for &v in face {
                used[v] = true;
            }
        }
        let removed = used.iter().filter(|&&u| !u).count();
        if removed > 0 {
            self.compact_vertices(&used);
        }
        removed
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

fn select<T: Copy>(attr: &Option<Vec<T>>, order: &[usize]) -> Option<Vec<T>> {
    attr.as_ref()
        .map(|values| order.iter().map(|&i| values[i]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn quad() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_face_area_and_normals() {
        let mesh = quad();
        assert_relative_eq!(mesh.face_area(0), 0.5);
        assert_relative_eq!(mesh.surface_area(), 1.0);
        for n in mesh.calculate_face_normals() {
            assert_relative_eq!(n, Vector3f::z(), epsilon = 1e-6);
        }
    }

    #[test]
    fn test_vertex_normals_isolated_vertex() {
        let mut mesh = quad();
        mesh.add_vertex(Point3f::new(5.0, 5.0, 5.0));
        mesh.update_vertex_normals();
        let normals = mesh.normals.as_ref().unwrap();
        assert_eq!(normals.len(), 5);
        assert_relative_eq!(normals[4], Vector3f::z());
    }

    #[test]
    fn test_validate_rejects_bad_indices() {
        let mut mesh = quad();
        assert!(mesh.validate().is_ok());
        mesh.faces.push([0, 1, 9]);
        assert!(matches!(mesh.validate(), Err(Error::InvalidInput(_))));
        mesh.faces.pop();
        mesh.faces.push([1, 1, 2]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_attribute_mismatch() {
        let mut mesh = quad();
        mesh.uvs = Some(vec![[0.0, 0.0]; 3]);
        assert!(mesh.validate().is_err());
    }

    #[test]
    fn test_compact_vertices_remaps_attributes() {
        let mut mesh = quad();
        mesh.set_uvs(vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        let remap = mesh.compact_vertices(&[true, false, true, true]);
        assert_eq!(remap, vec![0, REMOVED, 1, 2]);
        assert_eq!(mesh.vertex_count(), 3);
        assert_eq!(mesh.faces, vec![[0, 1, 2]]);
        assert_eq!(mesh.uvs.as_ref().unwrap()[1], [1.0, 1.0]);
    }

    #[test]
    fn test_remove_unreferenced_vertices() {
        let mut mesh = quad();
        mesh.add_vertex(Point3f::new(2.0, 2.0, 2.0));
        assert_eq!(mesh.remove_unreferenced_vertices(), 1);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.remove_unreferenced_vertices(), 0);
    }

    #[test]
    fn test_remove_degenerate_faces() {
        let mut mesh = quad();
        mesh.faces.push([2, 2, 3]);
        assert_eq!(mesh.remove_degenerate_faces(), 1);
        assert_eq!(mesh.face_count(), 2);
    }
}
