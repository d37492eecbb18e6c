//! Point types and related functionality

use nalgebra::{Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Texture coordinate pair (u, v)
pub type UV = [f32; 2];

/// Widen a single precision point for accumulation-heavy math
#[inline]
pub fn to_f64(p: &Point3f) -> Point3d {
    Point3d::new(p.x as f64, p.y as f64, p.z as f64)
}

/// Unnormalized normal of the triangle (a, b, c); its length is twice the area
#[inline]
pub fn triangle_cross(a: &Point3f, b: &Point3f, c: &Point3f) -> Vector3f {
    (b - a).cross(&(c - a))
}

/// Area of the triangle (a, b, c)
#[inline]
pub fn triangle_area(a: &Point3f, b: &Point3f, c: &Point3f) -> f32 {
    0.5 * triangle_cross(a, b, c).norm()
}
