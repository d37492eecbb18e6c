//! Least-squares conformal flattening
//!
//! Each triangle contributes the two real rows of `sum_j W_j (u_j + i v_j)`, where
//! `W_j` are the complex edge coefficients of the triangle in its own orthonormal
//! frame scaled by `1 / sqrt(2A)`. Two vertices are pinned at their planar projection,
//! which removes the similarity null space, and the remaining least-squares problem is
//! solved with conjugate gradients on the normal equations (CGLS).

use glbtidy_core::{to_f64, Point3f, Vector3d};
use nalgebra::{DVector, Vector2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use tracing::debug;

/// A 2D chart coordinate
pub type Uv2 = Vector2<f64>;

/// Output of flattening one chart
#[derive(Debug, Clone)]
pub struct Flattening {
    pub coords: Vec<Uv2>,
    pub iterations: usize,
    pub converged: bool,
}

/// Orthonormal basis `(u, v)` of the plane orthogonal to the chart's area-weighted
/// normal, with `u x v` along that normal
pub fn chart_frame(positions: &[Point3f], faces: &[[usize; 3]]) -> (Vector3d, Vector3d) {
    let mut normal = Vector3d::zeros();
    for &[a, b, c] in faces {
        let pa = to_f64(&positions[a]);
        normal += (to_f64(&positions[b]) - pa).cross(&(to_f64(&positions[c]) - pa));
    }
    let n = normal.try_normalize(1e-300).unwrap_or_else(Vector3d::z);
    let helper = if n.x.abs() < 0.9 { Vector3d::x() } else { Vector3d::y() };
    let u = n.cross(&helper).normalize();
    let v = n.cross(&u);
    (u, v)
}

/// Orthogonal projection of the chart onto its average plane
pub fn planar_projection(positions: &[Point3f], faces: &[[usize; 3]]) -> Vec<Uv2> {
    let (u, v) = chart_frame(positions, faces);
    positions
        .iter()
        .map(|p| {
            let p = to_f64(p).coords;
            Uv2::new(p.dot(&u), p.dot(&v))
        })
        .collect()
}

/// Signed area of a 2D triangle, positive when counter-clockwise
#[inline]
pub fn signed_area(a: &Uv2, b: &Uv2, c: &Uv2) -> f64 {
    0.5 * (b - a).perp(&(c - a))
}

/// Number of triangles whose 2D image is reversed
pub fn count_folded(coords: &[Uv2], faces: &[[usize; 3]]) -> usize {
    faces
        .iter()
        .filter(|&&[a, b, c]| signed_area(&coords[a], &coords[b], &coords[c]) < 0.0)
        .count()
}

/// Complex coefficients `W_j = (re, im)` of one triangle, already scaled by `1/sqrt(2A)`
fn triangle_coefficients(p0: &Point3f, p1: &Point3f, p2: &Point3f) -> Option<[(f64, f64); 3]> {
    let p0 = to_f64(p0);
    let e1 = to_f64(p1) - p0;
    let e2 = to_f64(p2) - p0;
    let l1 = e1.norm();
    let x_axis = e1.try_normalize(1e-300)?;
    let normal = e1.cross(&e2).try_normalize(1e-300)?;
    let y_axis = normal.cross(&x_axis);

    let z = [(0.0, 0.0), (l1, 0.0), (e2.dot(&x_axis), e2.dot(&y_axis))];
    let twice_area = l1 * z[2].1;
    if !twice_area.is_finite() || twice_area <= 0.0 {
        return None;
    }
    let scale = 1.0 / twice_area.sqrt();
    let diff = |a: (f64, f64), b: (f64, f64)| ((a.0 - b.0) * scale, (a.1 - b.1) * scale);
    Some([diff(z[2], z[1]), diff(z[0], z[2]), diff(z[1], z[0])])
}

/// Indices of the two vertices farthest apart along the longer axis of `coords`
fn pick_pins(coords: &[Uv2]) -> (usize, usize) {
    let (mut min, mut max) = (coords[0], coords[0]);
    for c in coords {
        min = min.inf(c);
        max = max.sup(c);
    }
    let axis = if max.x - min.x >= max.y - min.y { 0 } else { 1 };
    let lo = coords
        .iter()
        .enumerate()
        .min_by(|a, b| a.1[axis].total_cmp(&b.1[axis]))
        .map_or(0, |(i, _)| i);
    let hi = coords
        .iter()
        .enumerate()
        .max_by(|a, b| a.1[axis].total_cmp(&b.1[axis]))
        .map_or(0, |(i, _)| i);
    (lo, hi)
}

fn mul(a: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(a.nrows());
    for (row_idx, row) in a.row_iter().enumerate() {
        let mut sum = 0.0;
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
            sum += val * x[col_idx];
        }
        out[row_idx] = sum;
    }
    out
}

fn mul_transpose(a: &CsrMatrix<f64>, v: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::zeros(a.ncols());
    for (row_idx, row) in a.row_iter().enumerate() {
        for (&col_idx, &val) in row.col_indices().iter().zip(row.values().iter()) {
            out[col_idx] += val * v[row_idx];
        }
    }
    out
}

/// Minimize `|A x - b|` starting from `x`. Returns the iteration count and whether
/// the normal-equation residual dropped below `tolerance` relative to `|A^T b|`.
fn cgls(
    a: &CsrMatrix<f64>,
    b: &DVector<f64>,
    x: &mut DVector<f64>,
    max_iterations: usize,
    tolerance: f64,
) -> (usize, bool) {
    let reference = mul_transpose(a, b).norm().max(1e-300);
    let mut r = b - mul(a, x);
    let mut s = mul_transpose(a, &r);
    let mut p = s.clone();
    let mut gamma = s.norm_squared();

    for iteration in 0..max_iterations {
        if gamma.sqrt() <= tolerance * reference {
            return (iteration, true);
        }
        let q = mul(a, &p);
        let qq = q.norm_squared();
        if qq <= 0.0 || !qq.is_finite() {
            return (iteration, gamma.sqrt() <= tolerance * reference);
        }
        let alpha = gamma / qq;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &q, 1.0);
        s = mul_transpose(a, &r);
        let gamma_next = s.norm_squared();
        let beta = gamma_next / gamma;
        p = &s + &p * beta;
        gamma = gamma_next;
    }
    (max_iterations, gamma.sqrt() <= tolerance * reference)
}

/// Flatten one chart given its vertex positions and chart-local faces
///
/// The result is a similarity of the conformal map that agrees with the planar
/// projection at the two pinned vertices. `converged` is false when the solver ran out
/// of iterations or produced non-finite values; callers decide whether to keep it.
pub fn flatten_chart(
    positions: &[Point3f],
    faces: &[[usize; 3]],
    max_iterations: usize,
    tolerance: f64,
) -> Flattening {
    let initial = planar_projection(positions, faces);
    if positions.len() < 3 || faces.is_empty() {
        return Flattening {
            coords: initial,
            iterations: 0,
            converged: true,
        };
    }

    let (pin_a, pin_b) = pick_pins(&initial);
    if pin_a == pin_b {
        return Flattening {
            coords: initial,
            iterations: 0,
            converged: true,
        };
    }

    let mut slot = vec![None; positions.len()];
    let mut free = 0usize;
    for (v, s) in slot.iter_mut().enumerate() {
        if v != pin_a && v != pin_b {
            *s = Some(free);
            free += 1;
        }
    }

    let rows = 2 * faces.len();
    let mut coo = CooMatrix::new(rows, 2 * free);
    let mut rhs = DVector::zeros(rows);
    for (t, face) in faces.iter().enumerate() {
        let Some(w) = triangle_coefficients(
            &positions[face[0]],
            &positions[face[1]],
            &positions[face[2]],
        ) else {
            continue;
        };
        let (re, im) = (2 * t, 2 * t + 1);
        for (&v, &(wr, wi)) in face.iter().zip(w.iter()) {
            match slot[v] {
                Some(k) => {
                    coo.push(re, k, wr);
                    coo.push(re, free + k, -wi);
                    coo.push(im, k, wi);
                    coo.push(im, free + k, wr);
                }
                None => {
                    let p = initial[v];
                    rhs[re] -= wr * p.x - wi * p.y;
                    rhs[im] -= wi * p.x + wr * p.y;
                }
            }
        }
    }
    let matrix = CsrMatrix::from(&coo);

    let mut x = DVector::zeros(2 * free);
    for (v, s) in slot.iter().enumerate() {
        if let Some(k) = *s {
            x[k] = initial[v].x;
            x[free + k] = initial[v].y;
        }
    }

    let (iterations, converged) = cgls(&matrix, &rhs, &mut x, max_iterations, tolerance);
    let coords: Vec<Uv2> = slot
        .iter()
        .enumerate()
        .map(|(v, s)| match *s {
            Some(k) => Uv2::new(x[k], x[free + k]),
            None => initial[v],
        })
        .collect();
    let finite = coords.iter().all(|c| c.x.is_finite() && c.y.is_finite());

    debug!(
        vertices = positions.len(),
        faces = faces.len(),
        iterations,
        converged,
        finite,
        "Chart flattened"
    );
    Flattening {
        coords,
        iterations,
        converged: converged && finite,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn folded_strip() -> (Vec<Point3f>, Vec<[usize; 3]>) {
        let (c, s) = (60f32.to_radians().cos(), 60f32.to_radians().sin());
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(1.0 + c, 0.0, s),
            Point3f::new(1.0 + c, 1.0, s),
        ];
        let faces = vec![[0, 1, 2], [0, 2, 3], [1, 4, 5], [1, 5, 2]];
        (positions, faces)
    }

    #[test]
    fn test_flat_chart_keeps_projection() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 2.0),
            Point3f::new(1.0, 0.0, 2.0),
            Point3f::new(1.0, 1.0, 2.0),
            Point3f::new(0.0, 1.0, 2.0),
            Point3f::new(0.5, 0.4, 2.0),
        ];
        let faces = vec![[0, 1, 4], [1, 2, 4], [2, 3, 4], [3, 0, 4]];
        let result = flatten_chart(&positions, &faces, 1000, 1e-10);
        assert!(result.converged);
        let projected = planar_projection(&positions, &faces);
        for (a, b) in result.coords.iter().zip(&projected) {
            assert_relative_eq!(a, b, epsilon = 1e-6);
        }
        assert_eq!(count_folded(&result.coords, &faces), 0);
    }

    #[test]
    fn test_folded_strip_unfolds_isometrically() {
        let (positions, faces) = folded_strip();
        let result = flatten_chart(&positions, &faces, 1000, 1e-10);
        assert!(result.converged);
        let uv = &result.coords;
        let unit = (uv[1] - uv[0]).norm();
        assert!(unit > 0.0);
        assert_relative_eq!((uv[4] - uv[1]).norm() / unit, 1.0, epsilon = 1e-4);
        assert_relative_eq!((uv[2] - uv[1]).norm() / unit, 1.0, epsilon = 1e-4);
        // The unfolded strip is a straight 2x1 rectangle
        assert_relative_eq!((uv[4] - uv[0]).norm() / unit, 2.0, epsilon = 1e-4);
        assert_eq!(count_folded(uv, &faces), 0);
    }

    #[test]
    fn test_projection_is_counter_clockwise() {
        let (positions, faces) = folded_strip();
        let projected = planar_projection(&positions, &faces);
        assert_eq!(count_folded(&projected, &faces), 0);
    }

    #[test]
    fn test_degenerate_chart_falls_through() {
        let positions = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
        ];
        let result = flatten_chart(&positions, &[[0, 1, 2]], 100, 1e-8);
        assert!(result.converged);
        assert_eq!(result.coords.len(), 3);
    }

    #[test]
    fn test_signed_area_orientation() {
        let a = Uv2::new(0.0, 0.0);
        let b = Uv2::new(1.0, 0.0);
        let c = Uv2::new(0.0, 1.0);
        assert_relative_eq!(signed_area(&a, &b, &c), 0.5);
        assert_relative_eq!(signed_area(&a, &c, &b), -0.5);
    }
}
