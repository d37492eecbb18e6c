//! Quadric error metric
//!
//! A quadric measures the sum of squared distances from a point to a set of planes:
//! `E(p) = p^T A p + 2 b^T p + c`, with `A` symmetric.

use nalgebra::{Matrix3, Vector3};
use std::ops::{Add, AddAssign};

/// Accumulated plane quadric
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quadric {
    pub a: Matrix3<f64>,
    pub b: Vector3<f64>,
    pub c: f64,
}

impl Default for Quadric {
    fn default() -> Self {
        Self::zero()
    }
}

impl Quadric {
    pub fn zero() -> Self {
        Self {
            a: Matrix3::zeros(),
            b: Vector3::zeros(),
            c: 0.0,
        }
    }

    /// Quadric of the plane `n . p + d = 0` scaled by `weight`; `n` must be unit length
    pub fn from_plane(normal: &Vector3<f64>, d: f64, weight: f64) -> Self {
        Self {
            a: normal * normal.transpose() * weight,
            b: normal * (d * weight),
            c: d * d * weight,
        }
    }

    /// Quadric of the plane through `point` with unit `normal`
    pub fn from_point_normal(point: &Vector3<f64>, normal: &Vector3<f64>, weight: f64) -> Self {
        Self::from_plane(normal, -normal.dot(point), weight)
    }

    /// Weighted squared distance sum at `p`, clamped at zero against round-off
    pub fn evaluate(&self, p: &Vector3<f64>) -> f64 {
        ((p.transpose() * self.a * p)[0] + 2.0 * self.b.dot(p) + self.c).max(0.0)
    }

    /// Minimizer of the error when `A` is well conditioned
    pub fn optimal_point(&self) -> Option<Vector3<f64>> {
        let scale = self.a.trace() / 3.0;
        if scale <= 0.0 {
            return None;
        }
        let det = self.a.determinant();
        if det.abs() <= 1e-9 * scale * scale * scale {
            return None;
        }
        let inv = self.a.try_inverse()?;
        let p = -(inv * self.b);
        p.iter().all(|x| x.is_finite()).then_some(p)
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(self, rhs: Quadric) -> Quadric {
        Quadric {
            a: self.a + rhs.a,
            b: self.b + rhs.b,
            c: self.c + rhs.c,
        }
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Quadric) {
        self.a += rhs.a;
        self.b += rhs.b;
        self.c += rhs.c;
    }
}
