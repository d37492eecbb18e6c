//! UV re-parameterization
//!
//! The mesh is cut into charts along sharp edges, each chart is flattened with a
//! least-squares conformal map, and the flattened islands are packed into the unit
//! square. Chart boundaries become seams: vertices shared by several charts are
//! duplicated so every vertex carries exactly one UV.

pub mod charts;
pub mod lscm;
pub mod pack;

pub use charts::*;
pub use lscm::*;
pub use pack::*;

use glbtidy_core::{Error, Result, Stage, StageWarning, TriangleMesh, REMOVED};
use std::ops::Range;
use tracing::{info, warn};

/// Parameters for UV unwrapping
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UvParams {
    /// Charts are cut where adjacent faces bend by more than this many degrees
    pub angle_limit_deg: f32,
    /// Gap between packed islands in UV units
    pub island_margin: f32,
    /// Solver iteration cap per chart
    pub max_iterations: usize,
    /// Relative residual at which the conformal solve counts as converged
    pub tolerance: f64,
}

impl Default for UvParams {
    fn default() -> Self {
        Self {
            angle_limit_deg: 66.0,
            island_margin: 0.01,
            max_iterations: 5000,
            tolerance: 1e-6,
        }
    }
}

impl UvParams {
    pub fn with_angle_limit(mut self, angle_limit_deg: f32) -> Self {
        self.angle_limit_deg = angle_limit_deg;
        self
    }

    pub fn with_island_margin(mut self, island_margin: f32) -> Self {
        self.island_margin = island_margin;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.angle_limit_deg > 0.0 && self.angle_limit_deg <= 180.0) {
            return Err(Error::InvalidInput(format!(
                "UV angle limit must be in (0, 180] degrees, got {}",
                self.angle_limit_deg
            )));
        }
        if !(self.island_margin >= 0.0 && self.island_margin < 0.5) {
            return Err(Error::InvalidInput(format!(
                "UV island margin must be in [0, 0.5), got {}",
                self.island_margin
            )));
        }
        Ok(())
    }
}

/// Axis-aligned box of one packed island
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IslandBounds {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

/// Summary of a UV unwrap
#[derive(Debug, Clone, Default)]
pub struct UvReport {
    pub charts: usize,
    /// Vertices added by splitting seams
    pub seam_vertices: usize,
    /// Charts that kept their planar projection because the solve failed
    pub fallback_charts: usize,
    /// Charts with at least one reversed triangle in UV space
    pub folded_charts: usize,
    /// Margin actually used between islands
    pub margin: f32,
    pub islands: Vec<IslandBounds>,
    pub warnings: Vec<StageWarning>,
}

impl UvReport {
    fn warn(&mut self, message: String) {
        warn!("{}", message);
        self.warnings.push(StageWarning::new(Stage::Uv, message));
    }
}

/// Assign a UV in `[0, 1]^2` to every vertex, splitting vertices along chart seams
///
/// Existing UVs are replaced. Normals and colors follow the split vertices. Face order
/// is preserved; vertex order is not.
pub fn unwrap_uvs(mesh: &mut TriangleMesh, params: &UvParams) -> Result<UvReport> {
    params.validate()?;
    let mut report = UvReport {
        margin: params.island_margin,
        ..Default::default()
    };
    if mesh.faces.is_empty() {
        mesh.uvs = Some(vec![[0.0, 0.0]; mesh.vertex_count()]);
        return Ok(report);
    }

    let charts = segment_charts(mesh, params.angle_limit_deg);
    report.charts = charts.len();
    let before = mesh.vertex_count();
    let ranges = split_seams(mesh, &charts)?;
    report.seam_vertices = mesh.vertex_count().saturating_sub(before);

    let mut flattened = Vec::with_capacity(charts.len());
    let mut sizes = Vec::with_capacity(charts.len());
    for (chart, range) in charts.iter().zip(&ranges) {
        let positions = &mesh.vertices[range.clone()];
        let faces: Vec<[usize; 3]> = chart
            .faces
            .iter()
            .map(|&f| mesh.faces[f].map(|v| v - range.start))
            .collect();

        let result = flatten_chart(positions, &faces, params.max_iterations, params.tolerance);
        let mut coords = if result.converged {
            result.coords
        } else {
            report.fallback_charts += 1;
            planar_projection(positions, &faces)
        };
        if count_folded(&coords, &faces) > 0 {
            report.folded_charts += 1;
        }
        sizes.push(align_to_principal_axis(&mut coords));
        flattened.push(coords);
    }

    if report.fallback_charts > 0 {
        report.warn(format!(
            "{} of {} charts did not converge and use planar projection",
            report.fallback_charts, report.charts
        ));
    }
    if report.folded_charts > 0 {
        report.warn(format!(
            "{} of {} charts contain folded triangles",
            report.folded_charts, report.charts
        ));
    }

    let mut margin = params.island_margin as f64;
    let packing = loop {
        if let Some(packing) = pack_islands(&sizes, margin) {
            break packing;
        }
        margin = if margin > 1e-6 { margin * 0.5 } else { 0.0 };
    };
    report.margin = packing.margin as f32;
    if report.margin < params.island_margin {
        report.warn(format!(
            "{} islands do not fit with margin {}; packed with {}",
            sizes.len(),
            params.island_margin,
            report.margin
        ));
    }

    let mut uvs = vec![[0.0f32; 2]; mesh.vertex_count()];
    for ((range, coords), offset) in ranges.iter().zip(&flattened).zip(&packing.offsets) {
        let mut bounds = IslandBounds {
            min: [1.0, 1.0],
            max: [0.0, 0.0],
        };
        for (v, c) in range.clone().zip(coords) {
            let uv = offset + c * packing.scale;
            let uv = [
                (uv.x as f32).clamp(0.0, 1.0),
                (uv.y as f32).clamp(0.0, 1.0),
            ];
            for axis in 0..2 {
                bounds.min[axis] = bounds.min[axis].min(uv[axis]);
                bounds.max[axis] = bounds.max[axis].max(uv[axis]);
            }
            uvs[v] = uv;
        }
        report.islands.push(bounds);
    }
    mesh.uvs = Some(uvs);

    info!(
        charts = report.charts,
        seam_vertices = report.seam_vertices,
        fallback = report.fallback_charts,
        folded = report.folded_charts,
        scale = packing.scale,
        margin = report.margin,
        "UV unwrap complete"
    );
    Ok(report)
}

/// Give every chart its own copy of the vertices it uses
///
/// Returns the contiguous vertex range owned by each chart. Vertices referenced by no
/// face are dropped.
fn split_seams(mesh: &mut TriangleMesh, charts: &[Chart]) -> Result<Vec<Range<usize>>> {
    let mut slot = vec![REMOVED; mesh.vertex_count()];
    let mut source: Vec<usize> = Vec::new();
    source
        .try_reserve(mesh.vertex_count())
        .map_err(|e| Error::exhausted(Stage::Uv, format!("seam split buffer: {e}")))?;
    let mut ranges = Vec::with_capacity(charts.len());

    for chart in charts {
        let start = source.len();
        for &f in &chart.faces {
            for corner in 0..3 {
                let v = mesh.faces[f][corner];
                if slot[v] == REMOVED || slot[v] < start {
                    slot[v] = source.len();
                    source.push(v);
                }
                mesh.faces[f][corner] = slot[v];
            }
        }
        ranges.push(start..source.len());
    }

    mesh.vertices = source.iter().map(|&v| mesh.vertices[v]).collect();
    if let Some(normals) = mesh.normals.take() {
        mesh.normals = Some(source.iter().map(|&v| normals[v]).collect());
    }
    if let Some(colors) = mesh.colors.take() {
        mesh.colors = Some(source.iter().map(|&v| colors[v]).collect());
    }
    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use glbtidy_core::{EdgeTopology, Point3f};

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

    fn overlaps(a: &IslandBounds, b: &IslandBounds, grow: f32) -> bool {
        let tol = 1e-5;
        (0..2).all(|axis| {
            a.min[axis] - grow < b.max[axis] + grow - tol
                && b.min[axis] - grow < a.max[axis] + grow - tol
        })
    }

    #[test]
    fn test_cube_unwraps_into_six_islands() {
        let mut colored = cube();
        colored.set_colors((0..8).map(|i| [i as u8, 0, 0]).collect());
        let report = unwrap_uvs(&mut colored, &UvParams::default()).unwrap();
        assert_eq!(report.charts, 6);
        assert_eq!(report.seam_vertices, 16);
        assert!(report.warnings.is_empty());
        assert_eq!(colored.vertex_count(), 24);
        assert!(colored.validate().is_ok());

        // Positions and colors travel together through the split
        let colors = colored.colors.as_ref().unwrap();
        for (p, c) in colored.vertices.iter().zip(colors) {
            let original = cube().vertices.iter().position(|q| q == p).unwrap();
            assert_eq!(c[0] as usize, original);
        }
    }

    #[test]
    fn test_uvs_inside_unit_square_and_islands_disjoint() {
        let mut mesh = cube();
        let params = UvParams::default().with_island_margin(0.02);
        let report = unwrap_uvs(&mut mesh, &params).unwrap();
        for uv in mesh.uvs.as_ref().unwrap() {
            assert!((0.0..=1.0).contains(&uv[0]) && (0.0..=1.0).contains(&uv[1]));
        }
        let grow = report.margin / 2.0;
        for (i, a) in report.islands.iter().enumerate() {
            assert!(a.min[0] - grow >= -1e-5 && a.max[0] + grow <= 1.0 + 1e-5);
            assert!(a.min[1] - grow >= -1e-5 && a.max[1] + grow <= 1.0 + 1e-5);
            for b in &report.islands[i + 1..] {
                assert!(!overlaps(a, b, grow));
            }
        }
    }

    #[test]
    fn test_faces_keep_orientation_in_uv() {
        let mut mesh = cube();
        unwrap_uvs(&mut mesh, &UvParams::default()).unwrap();
        let uvs = mesh.uvs.as_ref().unwrap();
        for &[a, b, c] in &mesh.faces {
            let ua = Uv2::new(uvs[a][0] as f64, uvs[a][1] as f64);
            let ub = Uv2::new(uvs[b][0] as f64, uvs[b][1] as f64);
            let uc = Uv2::new(uvs[c][0] as f64, uvs[c][1] as f64);
            assert!(signed_area(&ua, &ub, &uc) > 0.0);
        }
    }

    #[test]
    fn test_topology_preserved_apart_from_seams() {
        let mut mesh = cube();
        unwrap_uvs(&mut mesh, &UvParams::default()).unwrap();
        assert_eq!(mesh.face_count(), 12);
        // Every chart is a separate sheet after the split
        let topology = EdgeTopology::build(&mesh.faces);
        assert_eq!(topology.count_of_kind(glbtidy_core::EdgeKind::Boundary), 24);
    }

    #[test]
    fn test_empty_mesh_gets_empty_uvs() {
        let mut mesh = TriangleMesh::new();
        let report = unwrap_uvs(&mut mesh, &UvParams::default()).unwrap();
        assert_eq!(report.charts, 0);
        assert_eq!(mesh.uvs, Some(vec![]));
    }

    #[test]
    fn test_invalid_params_rejected() {
        let mut mesh = cube();
        assert!(unwrap_uvs(&mut mesh, &UvParams::default().with_angle_limit(0.0)).is_err());
        assert!(unwrap_uvs(&mut mesh, &UvParams::default().with_island_margin(0.7)).is_err());
        assert_eq!(mesh, cube());
    }
}
