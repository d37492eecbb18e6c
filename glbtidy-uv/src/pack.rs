//! Island orientation and shelf packing into the unit square

use crate::lscm::Uv2;
use tracing::debug;

const BISECTION_STEPS: usize = 48;

/// Placement of every island in the unit square
///
/// Island `i` occupies `offsets[i] + scale * local` where `local` lies in
/// `[0, size.x] x [0, size.y]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Packing {
    pub scale: f64,
    pub margin: f64,
    pub offsets: Vec<Uv2>,
}

/// Rotate chart coordinates onto their principal axis, wider than tall, and move the
/// bounding box corner to the origin. Returns the box size.
pub fn align_to_principal_axis(coords: &mut [Uv2]) -> Uv2 {
    if coords.is_empty() {
        return Uv2::zeros();
    }
    let mean = coords.iter().fold(Uv2::zeros(), |acc, c| acc + c) / coords.len() as f64;
    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for c in coords.iter() {
        let d = c - mean;
        sxx += d.x * d.x;
        syy += d.y * d.y;
        sxy += d.x * d.y;
    }
    let angle = 0.5 * (2.0 * sxy).atan2(sxx - syy);
    let (sin, cos) = (-angle).sin_cos();
    for c in coords.iter_mut() {
        let d = *c - mean;
        *c = Uv2::new(cos * d.x - sin * d.y, sin * d.x + cos * d.y);
    }

    let (mut min, mut max) = bounds(coords);
    if max.y - min.y > max.x - min.x {
        // Quarter turn keeps the orientation of every triangle
        for c in coords.iter_mut() {
            *c = Uv2::new(-c.y, c.x);
        }
        (min, max) = bounds(coords);
    }
    for c in coords.iter_mut() {
        *c -= min;
    }
    max - min
}

fn bounds(coords: &[Uv2]) -> (Uv2, Uv2) {
    coords
        .iter()
        .fold((coords[0], coords[0]), |(lo, hi), c| (lo.inf(c), hi.sup(c)))
}

/// Try to place every island at `scale` on shelves, tallest first
fn shelf_place(sizes: &[Uv2], order: &[usize], scale: f64, margin: f64) -> Option<Vec<Uv2>> {
    let half = 0.5 * margin;
    let mut offsets = vec![Uv2::zeros(); sizes.len()];
    let (mut x, mut y, mut row_height) = (half, half, 0.0f64);

    for &i in order {
        let w = sizes[i].x * scale;
        let h = sizes[i].y * scale;
        if x + w + half > 1.0 {
            x = half;
            y += row_height + margin;
            row_height = 0.0;
        }
        if x + w + half > 1.0 || y + h + half > 1.0 {
            return None;
        }
        offsets[i] = Uv2::new(x, y);
        x += w + margin;
        row_height = row_height.max(h);
    }
    Some(offsets)
}

/// Pack islands of the given sizes into `[0, 1]^2` with a common scale
///
/// Islands are separated by at least `margin` and kept `margin / 2` away from the
/// border. The largest scale the shelf layout accepts is found by bisection. Returns
/// `None` when the islands do not fit even at zero size.
pub fn pack_islands(sizes: &[Uv2], margin: f64) -> Option<Packing> {
    if !(0.0..1.0).contains(&margin) {
        return None;
    }
    let mut order: Vec<usize> = (0..sizes.len()).collect();
    order.sort_by(|&a, &b| sizes[b].y.total_cmp(&sizes[a].y).then(a.cmp(&b)));

    let mut best = shelf_place(sizes, &order, 0.0, margin)?;
    let max_dim = sizes.iter().map(|s| s.x.max(s.y)).fold(0.0, f64::max);
    if max_dim <= 0.0 {
        return Some(Packing {
            scale: 1.0,
            margin,
            offsets: best,
        });
    }

    let mut hi = (1.0 - margin) / max_dim;
    if let Some(offsets) = shelf_place(sizes, &order, hi, margin) {
        return Some(Packing {
            scale: hi,
            margin,
            offsets,
        });
    }
    let mut lo = 0.0;
    for _ in 0..BISECTION_STEPS {
        let mid = 0.5 * (lo + hi);
        match shelf_place(sizes, &order, mid, margin) {
            Some(offsets) => {
                lo = mid;
                best = offsets;
            }
            None => hi = mid,
        }
    }
    debug!(islands = sizes.len(), scale = lo, margin, "Islands packed");
    Some(Packing {
        scale: lo,
        margin,
        offsets: best,
    })
}
