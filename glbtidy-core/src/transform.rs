//! 3D transformation utilities

use nalgebra::{Matrix4, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// An affine node transform attached to a mesh object
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f32>,
}

impl Transform3D {
    /// Create an identity transformation
    pub fn identity() -> Self {
        Self {
            matrix: Matrix4::identity(),
        }
    }

    /// Create a translation transformation
    pub fn translation(translation: Vector3<f32>) -> Self {
        Self {
            matrix: Matrix4::new_translation(&translation),
        }
    }

    /// Build from a column-major 4x4 array, the layout glTF node matrices use
    pub fn from_cols_array(cols: [[f32; 4]; 4]) -> Self {
        Self {
            matrix: Matrix4::from_fn(|r, c| cols[c][r]),
        }
    }

    /// Column-major 4x4 array
    pub fn to_cols_array(&self) -> [[f32; 4]; 4] {
        let mut cols = [[0.0; 4]; 4];
        for (c, col) in cols.iter_mut().enumerate() {
            for (r, value) in col.iter_mut().enumerate() {
                *value = self.matrix[(r, c)];
            }
        }
        cols
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3<f32>) -> Point3<f32> {
        let homogeneous = self.matrix * point.to_homogeneous();
        Point3::from_homogeneous(homogeneous).unwrap_or(*point)
    }

    /// Compose this transformation with another (`other` is applied first)
    pub fn compose(self, other: Self) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }

    /// Check if this is approximately the identity transformation
    pub fn is_identity(&self, epsilon: f32) -> bool {
        let identity = Matrix4::identity();
        (self.matrix - identity).norm() < epsilon
    }
}

impl Default for Transform3D {
    fn default() -> Self {
        Self::identity()
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

impl From<Matrix4<f32>> for Transform3D {
    fn from(matrix: Matrix4<f32>) -> Self {
        Self { matrix }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cols_array_layout() {
        let t = Transform3D::translation(Vector3::new(1.0, 2.0, 3.0));
        let cols = t.to_cols_array();
        assert_eq!(cols[3], [1.0, 2.0, 3.0, 1.0]);
        assert_eq!(Transform3D::from_cols_array(cols), t);
    }

    #[test]
    fn test_compose_order() {
        let a = Transform3D::translation(Vector3::new(1.0, 0.0, 0.0));
        let b = Transform3D::translation(Vector3::new(0.0, 2.0, 0.0));
        let p = (a * b).transform_point(&Point3::origin());
        assert_eq!(p, Point3::new(1.0, 2.0, 0.0));
        assert!(Transform3D::identity().is_identity(1e-6));
        assert!(!a.is_identity(1e-6));
    }
}
