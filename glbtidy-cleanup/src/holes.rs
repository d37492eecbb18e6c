//! Hole detection and filling
//!
//! A hole is a closed loop of boundary half-edges (edges with a single incident face).
//! Loops are traced along the half-edge direction of their faces and each is closed
//! with a patch wound against the loop, so the patch agrees with its neighbours.

use glbtidy_core::{
    face_edges, EdgeKind, EdgeTopology, Point3f, Stage, StageWarning, TriangleMesh, Vector3d,
};
use itertools::Itertools;
use nalgebra::{Point2, Vector3};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use tracing::{debug, info, warn};

/// Parameters for hole filling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoleFillParams {
    /// Loops with more edges than this are left open; `None` fills every loop
    pub max_hole_edges: Option<usize>,
    /// Loops deviating from their fitted plane by more than this fraction of their
    /// diameter are counted as non-planar (they are still filled)
    pub planarity_tolerance: f32,
}

impl Default for HoleFillParams {
    fn default() -> Self {
        Self {
            max_hole_edges: None,
            planarity_tolerance: 0.05,
        }
    }
}

impl HoleFillParams {
    pub fn with_max_hole_edges(max_hole_edges: usize) -> Self {
        Self {
            max_hole_edges: Some(max_hole_edges),
            ..Default::default()
        }
    }
}

/// A closed boundary loop, in the direction of its faces' half-edges
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryLoop {
    pub vertices: Vec<usize>,
}

impl BoundaryLoop {
    /// Number of edges (and vertices) in the loop
    pub fn edge_count(&self) -> usize {
        self.vertices.len()
    }
}

/// Summary of a hole filling pass
#[derive(Debug, Clone, Default)]
pub struct HoleFillReport {
    pub loops_found: usize,
    pub loops_filled: usize,
    pub triangles_added: usize,
    pub non_planar_loops: usize,
    /// Boundary chains that could not be closed into a loop
    pub open_chains: usize,
    pub warnings: Vec<StageWarning>,
}

/// Trace every boundary loop of the face list
///
/// Each boundary half-edge belongs to exactly one loop. When a walk passes through a
/// vertex twice (two holes touching at a vertex), the inner cycle is split off as its
/// own loop, so no returned loop repeats a vertex. The second value counts chains
/// that dead-end, which happens when adjacent faces disagree on winding.
pub fn detect_holes(faces: &[[usize; 3]], topology: &EdgeTopology) -> (Vec<BoundaryLoop>, usize) {
    let mut outgoing: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for face in faces {
        for (a, b) in face_edges(face) {
            if topology.kind(a, b) == Some(EdgeKind::Boundary) {
                outgoing.entry(a).or_default().push(b);
            }
        }
    }
    let total: usize = outgoing.values().map(Vec::len).sum();
    debug!(boundary_half_edges = total, "Collected boundary half-edges");

    let mut loops = Vec::new();
    let mut open_chains = 0;
    let mut used: HashSet<(usize, usize)> = HashSet::with_capacity(total);

    let starts: Vec<usize> = outgoing.keys().copied().collect();
    for start in starts {
        loop {
            let Some(first) = next_unused(&outgoing, &used, start) else {
                break;
            };
            used.insert((start, first));

            let mut path = vec![start];
            let mut index_of: HashMap<usize, usize> = HashMap::from([(start, 0)]);
            let mut current = first;

            loop {
                if let Some(&k) = index_of.get(&current) {
                    // Closed a cycle back to a vertex already on the path
                    let cycle: Vec<usize> = path.drain(k..).collect();
                    for v in &cycle {
                        index_of.remove(v);
                    }
                    if cycle.len() >= 3 {
                        loops.push(BoundaryLoop { vertices: cycle });
                    }
                    if path.is_empty() {
                        break;
                    }
                    index_of.insert(current, path.len());
                    path.push(current);
                } else {
                    index_of.insert(current, path.len());
                    path.push(current);
                }

                match next_unused(&outgoing, &used, current) {
                    Some(next) => {
                        used.insert((current, next));
                        current = next;
                    }
                    None => {
                        open_chains += 1;
                        warn!(
                            start,
                            length = path.len(),
                            "Boundary chain does not close into a loop"
                        );
                        break;
                    }
                }
            }
        }
    }

    info!(
        holes = loops.len(),
        sizes = ?loops.iter().map(BoundaryLoop::edge_count).collect::<Vec<_>>(),
        "Detected boundary loops"
    );
    (loops, open_chains)
}

fn next_unused(
    outgoing: &BTreeMap<usize, Vec<usize>>,
    used: &HashSet<(usize, usize)>,
    from: usize,
) -> Option<usize> {
    outgoing
        .get(&from)?
        .iter()
        .copied()
        .find(|&to| !used.contains(&(from, to)))
}

/// Why a loop was left open
#[derive(Debug, Clone, PartialEq)]
pub enum PatchError {
    RepeatedVertex,
    DegenerateLoop,
    DegenerateTriangle,
    ExistingEdge(usize, usize),
    ExistingFace([usize; 3]),
}

impl std::fmt::Display for PatchError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatchError::RepeatedVertex => write!(f, "loop repeats a vertex"),
            PatchError::DegenerateLoop => write!(f, "loop has no usable plane"),
            PatchError::DegenerateTriangle => write!(f, "triangulation yields a degenerate triangle"),
            PatchError::ExistingEdge(a, b) => {
                write!(f, "triangulation would reuse existing edge ({a}, {b})")
            }
            PatchError::ExistingFace([a, b, c]) => {
                write!(f, "patch would duplicate existing face ({a}, {b}, {c})")
            }
        }
    }
}

/// A triangulated patch for one loop
#[derive(Debug, Clone)]
pub struct HolePatch {
    pub triangles: Vec<[usize; 3]>,
    pub non_planar: bool,
}

/// Triangulate one boundary loop by ear clipping in its best-fit plane
///
/// The patch polygon runs against the loop direction. Ears are convex corners with no
/// other loop vertex inside and whose diagonal is not already an edge of the mesh;
/// when no ear remains, the rest of the polygon is fanned from its first vertex.
pub fn triangulate_loop(
    vertices: &[Point3f],
    boundary: &BoundaryLoop,
    topology: &EdgeTopology,
    planarity_tolerance: f32,
) -> Result<HolePatch, PatchError> {
    let n = boundary.vertices.len();
    if n < 3 {
        return Err(PatchError::DegenerateLoop);
    }
    let unique: HashSet<usize> = boundary.vertices.iter().copied().collect();
    if unique.len() != n {
        return Err(PatchError::RepeatedVertex);
    }

    let polygon: Vec<usize> = boundary.vertices.iter().rev().copied().collect();
    let points: Vec<Vector3d> = polygon
        .iter()
        .map(|&v| vertices[v].coords.cast::<f64>())
        .collect();

    let centroid = points.iter().sum::<Vector3d>() / n as f64;
    let (lo, hi) = points.iter().fold(
        (points[0], points[0]),
        |(lo, hi), p| (lo.inf(p), hi.sup(p)),
    );
    let diameter = (hi - lo).norm();
    let normal = newell_normal(&points);
    let Some(normal) = normal.try_normalize(1e-12 * diameter.max(f64::MIN_POSITIVE)) else {
        return Err(PatchError::DegenerateLoop);
    };

    let deviation = points
        .iter()
        .map(|p| (p - centroid).dot(&normal).abs())
        .fold(0.0f64, f64::max);
    let non_planar = deviation > planarity_tolerance as f64 * diameter;

    // Right-handed frame with u x v = normal, so the polygon is counter-clockwise in 2D
    let u_axis = any_perpendicular(&normal);
    let v_axis = normal.cross(&u_axis);
    let flat: Vec<Point2<f64>> = points
        .iter()
        .map(|p| {
            let d = p - centroid;
            Point2::new(d.dot(&u_axis), d.dot(&v_axis))
        })
        .collect();

    let area_eps = 1e-12 * diameter * diameter;
    let corners = EarClipper::new(&flat, &polygon, topology, area_eps).clip();

    // Every triangle must have real area, and no diagonal may already exist in the mesh
    let loop_edges: HashSet<(usize, usize)> = (0..n).map(|i| sorted_pair(i, (i + 1) % n)).collect();
    let mut triangles = Vec::with_capacity(corners.len());
    for [a, b, c] in corners {
        if (points[b] - points[a]).cross(&(points[c] - points[a])).norm() <= 2.0 * area_eps {
            return Err(PatchError::DegenerateTriangle);
        }
        for (x, y) in [(a, b), (b, c), (c, a)] {
            if !loop_edges.contains(&sorted_pair(x, y)) && topology.contains(polygon[x], polygon[y]) {
                return Err(PatchError::ExistingEdge(polygon[x], polygon[y]));
            }
        }
        let triangle = [polygon[a], polygon[b], polygon[c]];
        if has_face(topology, &triangle) {
            return Err(PatchError::ExistingFace(triangle));
        }
        triangles.push(triangle);
    }

    Ok(HolePatch {
        triangles,
        non_planar,
    })
}

/// Whether some face of the mesh already spans these three vertices
fn has_face(topology: &EdgeTopology, [a, b, c]: &[usize; 3]) -> bool {
    let bc = topology.faces_of(*b, *c);
    let ca = topology.faces_of(*c, *a);
    topology
        .faces_of(*a, *b)
        .iter()
        .any(|f| bc.contains(f) && ca.contains(f))
}

/// Ear clipping over a doubly linked ring of polygon corners
///
/// Ear status is cached per corner and only the two neighbours of a clipped ear are
/// re-examined. Only non-convex corners can lie inside a candidate ear, so those are
/// the only ones tested for containment.
struct EarClipper<'a> {
    flat: &'a [Point2<f64>],
    ids: &'a [usize],
    topology: &'a EdgeTopology,
    area_eps: f64,
    prev: Vec<usize>,
    next: Vec<usize>,
    reflex: BTreeSet<usize>,
    ear: Vec<bool>,
}

impl<'a> EarClipper<'a> {
    fn new(flat: &'a [Point2<f64>], ids: &'a [usize], topology: &'a EdgeTopology, area_eps: f64) -> Self {
        let n = flat.len();
        let mut clipper = Self {
            flat,
            ids,
            topology,
            area_eps,
            prev: (0..n).map(|i| (i + n - 1) % n).collect(),
            next: (0..n).map(|i| (i + 1) % n).collect(),
            reflex: BTreeSet::new(),
            ear: vec![false; n],
        };
        clipper.reflex = (0..n).filter(|&i| !clipper.is_convex(i)).collect();
        clipper.refresh_all();
        clipper
    }

    fn is_convex(&self, i: usize) -> bool {
        let (a, c) = (self.prev[i], self.next[i]);
        cross2(&self.flat[a], &self.flat[i], &self.flat[c]) > self.area_eps
    }

    fn is_ear(&self, i: usize) -> bool {
        let (a, c) = (self.prev[i], self.next[i]);
        if !self.is_convex(i) || self.topology.contains(self.ids[a], self.ids[c]) {
            return false;
        }
        !self.reflex.iter().any(|&k| {
            k != a
                && k != i
                && k != c
                && point_in_triangle(&self.flat[k], &self.flat[a], &self.flat[i], &self.flat[c])
        })
    }

    fn refresh_all(&mut self) {
        for i in 0..self.flat.len() {
            self.ear[i] = self.is_ear(i);
        }
    }

    fn find_ear(&self, start: usize, remaining: usize) -> Option<usize> {
        let mut i = start;
        for _ in 0..remaining {
            if self.ear[i] {
                return Some(i);
            }
            i = self.next[i];
        }
        None
    }

    /// Corner triples of the triangulation, in ring order
    fn clip(mut self) -> Vec<[usize; 3]> {
        let n = self.flat.len();
        let mut corners = Vec::with_capacity(n.saturating_sub(2));
        let mut remaining = n;
        let mut cursor = 0;

        while remaining > 3 {
            let found = self.find_ear(cursor, remaining).or_else(|| {
                // Cached flags can go stale when a neighbour turns convex
                self.refresh_all();
                self.find_ear(cursor, remaining)
            });
            let Some(i) = found else {
                debug!(remaining, "Ear clipping stalled, fanning remainder");
                let mut b = self.next[cursor];
                while self.next[b] != cursor {
                    corners.push([cursor, b, self.next[b]]);
                    b = self.next[b];
                }
                return corners;
            };

            let (a, c) = (self.prev[i], self.next[i]);
            corners.push([a, i, c]);
            self.next[a] = c;
            self.prev[c] = a;
            self.ear[i] = false;
            self.reflex.remove(&i);
            remaining -= 1;

            for v in [a, c] {
                if self.is_convex(v) {
                    self.reflex.remove(&v);
                } else {
                    self.reflex.insert(v);
                }
            }
            self.ear[a] = self.is_ear(a);
            self.ear[c] = self.is_ear(c);
            cursor = c;
        }
        if remaining == 3 {
            corners.push([self.prev[cursor], cursor, self.next[cursor]]);
        }
        corners
    }
}

/// Fill every boundary loop of the mesh
///
/// Loops that cannot be triangulated cleanly are left open and reported as warnings,
/// as are loops above `max_hole_edges` and boundary chains that never close.
pub fn fill_holes(mesh: &mut TriangleMesh, params: &HoleFillParams) -> HoleFillReport {
    let topology = EdgeTopology::build(&mesh.faces);
    let (holes, open_chains) = detect_holes(&mesh.faces, &topology);

    let mut report = HoleFillReport {
        loops_found: holes.len(),
        open_chains,
        ..Default::default()
    };
    if open_chains > 0 {
        report.warnings.push(StageWarning::new(
            Stage::HoleFill,
            format!("{open_chains} boundary chain(s) do not close into loops and were left open"),
        ));
    }

    let mut new_faces = Vec::new();
    for hole in &holes {
        if let Some(max) = params.max_hole_edges {
            if hole.edge_count() > max {
                let message = format!(
                    "hole with {} edges exceeds the limit of {} and was left open",
                    hole.edge_count(),
                    max
                );
                warn!("{}", message);
                report.warnings.push(StageWarning::new(Stage::HoleFill, message));
                continue;
            }
        }

        match triangulate_loop(&mesh.vertices, hole, &topology, params.planarity_tolerance) {
            Ok(patch) => {
                if patch.non_planar {
                    debug!(edges = hole.edge_count(), "Filling non-planar hole");
                    report.non_planar_loops += 1;
                }
                report.loops_filled += 1;
                report.triangles_added += patch.triangles.len();
                new_faces.extend(patch.triangles);
            }
            Err(reason) => {
                let message = format!(
                    "hole with {} edges starting at vertex {} left open: {}",
                    hole.edge_count(),
                    hole.vertices[0],
                    reason
                );
                warn!("{}", message);
                report.warnings.push(StageWarning::new(Stage::HoleFill, message));
            }
        }
    }

    mesh.faces.extend(new_faces);

    info!(
        found = report.loops_found,
        filled = report.loops_filled,
        triangles = report.triangles_added,
        non_planar = report.non_planar_loops,
        "Hole filling complete"
    );
    report
}

fn newell_normal(points: &[Vector3d]) -> Vector3d {
    let mut normal = Vector3d::zeros();
    for (p, q) in points.iter().circular_tuple_windows() {
        normal.x += (p.y - q.y) * (p.z + q.z);
        normal.y += (p.z - q.z) * (p.x + q.x);
        normal.z += (p.x - q.x) * (p.y + q.y);
    }
    normal
}

fn any_perpendicular(n: &Vector3d) -> Vector3d {
    let helper = if n.x.abs() < 0.9 {
        Vector3::x()
    } else {
        Vector3::y()
    };
    n.cross(&helper).normalize()
}

#[inline]
fn cross2(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    (b.x - a.x) * (c.y - a.y) - (b.y - a.y) * (c.x - a.x)
}

/// Inside or on the edge of the counter-clockwise triangle (a, b, c)
fn point_in_triangle(p: &Point2<f64>, a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> bool {
    cross2(a, b, p) >= 0.0 && cross2(b, c, p) >= 0.0 && cross2(c, a, p) >= 0.0
}

#[inline]
fn sorted_pair(a: usize, b: usize) -> (usize, usize) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}
