//! Property-based tests for UV packing.
//!
//! Every island must land inside the unit square, and islands grown by half the
//! margin must not overlap.

use glbtidy_core::{Point3f, TriangleMesh};
use glbtidy_uv::{pack_islands, unwrap_uvs, IslandBounds, Uv2, UvParams};
use proptest::prelude::*;

// =============================================================================
// Strategies
// =============================================================================

fn arb_sizes() -> impl Strategy<Value = Vec<Uv2>> {
    prop::collection::vec((0.0f64..5.0, 0.0f64..5.0), 1..40)
        .prop_map(|v| v.into_iter().map(|(w, h)| Uv2::new(w, h)).collect())
}

/// Height field over a regular grid; steep cells produce many charts
fn arb_height_field(n: usize) -> impl Strategy<Value = TriangleMesh> {
    prop::collection::vec(-1.5f32..1.5f32, (n + 1) * (n + 1)).prop_map(move |heights| {
        let mut mesh = TriangleMesh::new();
        for y in 0..=n {
            for x in 0..=n {
                mesh.add_vertex(Point3f::new(x as f32, y as f32, heights[y * (n + 1) + x]));
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
    })
}

fn disjoint(a: (Uv2, Uv2), b: (Uv2, Uv2)) -> bool {
    let tol = 1e-9;
    (0..2).any(|axis| a.1[axis] <= b.0[axis] + tol || b.1[axis] <= a.0[axis] + tol)
}

fn grown(bounds: &IslandBounds, grow: f32) -> (Uv2, Uv2) {
    (
        Uv2::new((bounds.min[0] - grow) as f64, (bounds.min[1] - grow) as f64),
        Uv2::new((bounds.max[0] + grow) as f64, (bounds.max[1] + grow) as f64),
    )
}

// =============================================================================
// Packing
// =============================================================================

proptest! {
    #[test]
    fn prop_packed_islands_inside_and_disjoint(sizes in arb_sizes(), margin in 0.0f64..0.05) {
        let packing = pack_islands(&sizes, margin).unwrap();
        let half = margin / 2.0;
        let boxes: Vec<(Uv2, Uv2)> = sizes
            .iter()
            .zip(&packing.offsets)
            .map(|(s, o)| {
                let lo = o - Uv2::repeat(half);
                let hi = o + s * packing.scale + Uv2::repeat(half);
                (lo, hi)
            })
            .collect();
        for (i, &(lo, hi)) in boxes.iter().enumerate() {
            prop_assert!(lo.x >= -1e-12 && lo.y >= -1e-12);
            prop_assert!(hi.x <= 1.0 + 1e-12 && hi.y <= 1.0 + 1e-12);
            for &other in &boxes[i + 1..] {
                prop_assert!(disjoint((lo, hi), other));
            }
        }
        prop_assert!(packing.scale > 0.0 || sizes.iter().all(|s| s.x.max(s.y) == 0.0));
    }
}

// =============================================================================
// Unwrap
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_unwrap_covers_every_vertex(mesh in arb_height_field(4)) {
        let mut mesh = mesh;
        let faces = mesh.face_count();
        let report = unwrap_uvs(&mut mesh, &UvParams::default()).unwrap();
        prop_assert_eq!(mesh.face_count(), faces);
        prop_assert!(mesh.validate().is_ok());

        let uvs = mesh.uvs.as_ref().unwrap();
        prop_assert_eq!(uvs.len(), mesh.vertex_count());
        for uv in uvs {
            prop_assert!((0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]));
        }

        let grow = report.margin / 2.0;
        prop_assert_eq!(report.islands.len(), report.charts);
        for (i, a) in report.islands.iter().enumerate() {
            let a = grown(a, grow);
            prop_assert!(a.0.x >= -1e-5 && a.0.y >= -1e-5);
            prop_assert!(a.1.x <= 1.0 + 1e-5 && a.1.y <= 1.0 + 1e-5);
            for b in &report.islands[i + 1..] {
                let b = grown(b, grow);
                // f32 rounding of touching boxes
                let shrink = |(lo, hi): (Uv2, Uv2)| (lo + Uv2::repeat(1e-5), hi - Uv2::repeat(1e-5));
                prop_assert!(disjoint(shrink(a), shrink(b)));
            }
        }
    }
}
