//! Core traits for glbtidy

use crate::{mesh::*, point::*};

/// Trait for objects with a spatial extent
pub trait Bounded {
    /// Get the axis-aligned bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the object
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        nalgebra::center(&min, &max)
    }

    /// Length of the bounding box diagonal
    fn diagonal(&self) -> f32 {
        let (min, max) = self.bounding_box();
        (max - min).norm()
    }
}

impl Bounded for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        if self.vertices.is_empty() {
            return (Point3f::origin(), Point3f::origin());
        }

        let mut min = self.vertices[0];
        let mut max = self.vertices[0];

        for vertex in &self.vertices {
            min.x = min.x.min(vertex.x);
            min.y = min.y.min(vertex.y);
            min.z = min.z.min(vertex.z);

            max.x = max.x.max(vertex.x);
            max.y = max.y.max(vertex.y);
            max.z = max.z.max(vertex.z);
        }

        (min, max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounding_box() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(-1.0, 0.0, 2.0),
                Point3f::new(1.0, 3.0, 0.0),
                Point3f::new(0.0, -2.0, 1.0),
            ],
            vec![[0, 1, 2]],
        );
        let (min, max) = mesh.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, -2.0, 0.0));
        assert_eq!(max, Point3f::new(1.0, 3.0, 2.0));
        assert_relative_eq!(mesh.center(), Point3f::new(0.0, 0.5, 1.0));
    }

    #[test]
    fn test_empty_mesh_bounds() {
        let mesh = TriangleMesh::new();
        assert_eq!(mesh.diagonal(), 0.0);
    }
}
