//! Edge collapse simplification
//!
//! Greedy quadric error metric (QEM) decimation. Each vertex carries the quadric of
//! its incident face planes; every edge is scored by the error of its best
//! replacement point and the cheapest edge is collapsed first. Collapses that would
//! break manifoldness are refused, so a manifold input stays manifold.

use crate::{DecimationResult, MeshSimplifier, Quadric};
use glbtidy_core::{edge_key, EdgeKey, Error, Point3f, Result, Stage, TriangleMesh, Vector3d, UV};
use priority_queue::PriorityQueue;
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

// ============================================================
// Incidence mesh
// ============================================================

/// Indexed mesh with per-vertex incident face lists for local collapse queries.
struct CollapseMesh {
    positions: Vec<Point3f>,
    faces: Vec<[usize; 3]>,
    face_alive: Vec<bool>,
    /// Live faces incident to each vertex
    vertex_faces: Vec<Vec<usize>>,
    vertex_alive: Vec<bool>,
    quadrics: Vec<Quadric>,
    uvs: Option<Vec<UV>>,
    colors: Option<Vec<[u8; 3]>>,
    active_face_count: usize,
}

impl CollapseMesh {
    fn from_triangle_mesh(mesh: &TriangleMesh, boundary_weight: f64) -> Result<Self> {
        let nv = mesh.vertices.len();
        let nf = mesh.faces.len();

        let mut vertex_faces: Vec<Vec<usize>> = Vec::new();
        vertex_faces
            .try_reserve_exact(nv)
            .map_err(|e| Error::exhausted(Stage::Decimation, format!("incidence lists: {e}")))?;
        vertex_faces.resize_with(nv, Vec::new);
        for (fi, face) in mesh.faces.iter().enumerate() {
            for &v in face {
                vertex_faces[v].push(fi);
            }
        }

        let mut cm = CollapseMesh {
            positions: mesh.vertices.clone(),
            faces: mesh.faces.clone(),
            face_alive: vec![true; nf],
            vertex_faces,
            vertex_alive: vec![true; nv],
            quadrics: vec![Quadric::zero(); nv],
            uvs: mesh.uvs.clone(),
            colors: mesh.colors.clone(),
            active_face_count: nf,
        };
        cm.initialize_quadrics(boundary_weight);
        Ok(cm)
    }

    #[inline]
    fn position(&self, v: usize) -> Vector3d {
        self.positions[v].coords.cast::<f64>()
    }

    /// Area-weighted face plane quadrics, plus a constraint plane through every
    /// boundary edge perpendicular to its face.
    fn initialize_quadrics(&mut self, boundary_weight: f64) {
        for fi in 0..self.faces.len() {
            let [a, b, c] = self.faces[fi];
            let (pa, pb, pc) = (self.position(a), self.position(b), self.position(c));
            let cross = (pb - pa).cross(&(pc - pa));
            let area = 0.5 * cross.norm();
            let Some(normal) = cross.try_normalize(f64::EPSILON) else {
                continue;
            };
            let q = Quadric::from_point_normal(&pa, &normal, area);
            self.quadrics[a] += q;
            self.quadrics[b] += q;
            self.quadrics[c] += q;

            if boundary_weight <= 0.0 {
                continue;
            }
            for (u, v) in [(a, b), (b, c), (c, a)] {
                if self.edge_faces(u, v).len() != 1 {
                    continue;
                }
                let (pu, pv) = (self.position(u), self.position(v));
                let edge = pv - pu;
                let Some(side) = edge.cross(&normal).try_normalize(f64::EPSILON) else {
                    continue;
                };
                let q = Quadric::from_point_normal(&pu, &side, boundary_weight * edge.norm_squared());
                self.quadrics[u] += q;
                self.quadrics[v] += q;
            }
        }
    }

    /// Live faces containing both `a` and `b`
    fn edge_faces(&self, a: usize, b: usize) -> Vec<usize> {
        self.vertex_faces[a]
            .iter()
            .copied()
            .filter(|&f| self.faces[f].contains(&b))
            .collect()
    }

    /// Ordered so queue updates, and therefore tie-breaking, are reproducible
    fn neighbors(&self, v: usize) -> BTreeSet<usize> {
        self.vertex_faces[v]
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&u| u != v)
            .collect()
    }

    fn is_boundary_vertex(&self, v: usize) -> bool {
        self.neighbors(v)
            .into_iter()
            .any(|u| self.edge_faces(v, u).len() == 1)
    }

    fn edges(&self) -> Result<Vec<EdgeKey>> {
        let mut seen = HashSet::new();
        seen.try_reserve(self.active_face_count * 3 / 2 + 1)
            .map_err(|e| Error::exhausted(Stage::Decimation, format!("edge set: {e}")))?;
        for (fi, face) in self.faces.iter().enumerate() {
            if !self.face_alive[fi] {
                continue;
            }
            for (u, v) in [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])] {
                seen.insert(edge_key(u, v));
            }
        }
        let mut edges: Vec<EdgeKey> = seen.into_iter().collect();
        edges.sort_unstable();
        Ok(edges)
    }

    /// Check the link condition: common neighbors must equal exactly the
    /// face apices opposite the edge (2 for interior, 1 for boundary).
    fn check_link_condition(&self, v1: usize, v2: usize, shared: &[usize]) -> bool {
        let apices: HashSet<usize> = shared
            .iter()
            .flat_map(|&f| self.faces[f])
            .filter(|&u| u != v1 && u != v2)
            .collect();
        if apices.len() != shared.len() {
            return false;
        }
        let n1 = self.neighbors(v1);
        let n2 = self.neighbors(v2);
        let common: HashSet<usize> = n1.intersection(&n2).copied().collect();
        common == apices
    }

    /// Why collapsing (v1, v2) would damage the topology, if it would
    fn collapse_blocker(&self, v1: usize, v2: usize, preserve_boundary: bool) -> Option<&'static str> {
        let shared = self.edge_faces(v1, v2);
        match shared.len() {
            0 => return Some("vertices no longer share a face"),
            1 | 2 => {}
            _ => return Some("edge is non-manifold"),
        }
        if !self.check_link_condition(v1, v2, &shared) {
            return Some("link condition fails");
        }
        let boundary_1 = self.is_boundary_vertex(v1);
        let boundary_2 = self.is_boundary_vertex(v2);
        if preserve_boundary && (boundary_1 || boundary_2) {
            return Some("boundary is preserved");
        }
        if shared.len() == 2 && boundary_1 && boundary_2 {
            return Some("interior edge joins two boundary vertices");
        }

        // Edges (v1, x) for each apex x absorb (v2, x); both lose the removed face.
        for &f in &shared {
            let Some(x) = self.faces[f].iter().copied().find(|&u| u != v1 && u != v2) else {
                continue;
            };
            let merged = self.edge_faces(v1, x).len() + self.edge_faces(v2, x).len() - 2;
            if merged > 2 {
                return Some("collapse would create a non-manifold edge");
            }
        }

        // No surviving face may end up spanning the same vertices as another
        let mut seen: HashSet<[usize; 3]> = HashSet::new();
        for &f in self.vertex_faces[v1].iter().chain(&self.vertex_faces[v2]) {
            if shared.contains(&f) {
                continue;
            }
            let mut key = self.faces[f].map(|u| if u == v2 { v1 } else { u });
            key.sort_unstable();
            if !seen.insert(key) {
                return Some("collapse would duplicate a face");
            }
        }
        None
    }

    /// Number of faces around v1 and v2 (other than those removed) whose normal
    /// would turn by more than 90 degrees or vanish if both moved to `p`.
    fn count_folds(&self, v1: usize, v2: usize, p: &Vector3d) -> u32 {
        let mut folds = 0;
        for &f in self.vertex_faces[v1].iter().chain(&self.vertex_faces[v2]) {
            let face = self.faces[f];
            if face.contains(&v1) && face.contains(&v2) {
                continue;
            }
            let old = face.map(|u| self.position(u));
            let new = face.map(|u| if u == v1 || u == v2 { *p } else { self.position(u) });
            let n_old = (old[1] - old[0]).cross(&(old[2] - old[0]));
            let n_new = (new[1] - new[0]).cross(&(new[2] - new[0]));
            if n_new.dot(&n_old) <= 0.0 {
                folds += 1;
            }
        }
        folds
    }

    /// Best replacement point for (v1, v2) and its cost.
    ///
    /// The closed-form optimum is tried when the combined quadric is invertible;
    /// the endpoints and midpoint are always candidates. Fewer folds win, then lower error.
    fn compute_collapse_cost(&self, v1: usize, v2: usize) -> (Point3f, EdgeCost) {
        let q = self.quadrics[v1] + self.quadrics[v2];
        let p1 = self.position(v1);
        let p2 = self.position(v2);

        let mut candidates = vec![(p1 + p2) * 0.5, p1, p2];
        if let Some(opt) = q.optimal_point() {
            // Reject optima far outside the neighbourhood of the edge
            if (opt - (p1 + p2) * 0.5).norm() <= 2.0 * (p2 - p1).norm() {
                candidates.insert(0, opt);
            }
        }

        let mut best: Option<(Vector3d, EdgeCost)> = None;
        for p in candidates {
            let cost = EdgeCost {
                folds: self.count_folds(v1, v2, &p),
                error: q.evaluate(&p),
            };
            if best.as_ref().map_or(true, |(_, b)| cost.better_than(b)) {
                best = Some((p, cost));
            }
        }
        let (p, cost) = best.unwrap_or((p1, EdgeCost::blocked()));
        (Point3f::new(p.x as f32, p.y as f32, p.z as f32), cost)
    }

    /// Collapse edge (v1, v2), merging v2 into v1 at new_pos.
    fn collapse_edge(&mut self, v1: usize, v2: usize, new_pos: Point3f) {
        let shared = self.edge_faces(v1, v2);
        for &f in &shared {
            self.face_alive[f] = false;
            self.active_face_count -= 1;
            for u in self.faces[f] {
                self.vertex_faces[u].retain(|&g| g != f);
            }
        }

        let moved = std::mem::take(&mut self.vertex_faces[v2]);
        for &f in &moved {
            for u in self.faces[f].iter_mut() {
                if *u == v2 {
                    *u = v1;
                }
            }
        }
        self.vertex_faces[v1].extend(moved);
        self.vertex_alive[v2] = false;

        // Interpolate attributes by where the new point falls along the edge
        let p1 = self.positions[v1];
        let p2 = self.positions[v2];
        let len_sq = (p2 - p1).norm_squared();
        let t = if len_sq > 0.0 {
            ((new_pos - p1).dot(&(p2 - p1)) / len_sq).clamp(0.0, 1.0)
        } else {
            0.5
        };
        if let Some(uvs) = self.uvs.as_mut() {
            let (a, b) = (uvs[v1], uvs[v2]);
            uvs[v1] = [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
        }
        if let Some(colors) = self.colors.as_mut() {
            let (a, b) = (colors[v1], colors[v2]);
            for k in 0..3 {
                colors[v1][k] = (a[k] as f32 + (b[k] as f32 - a[k] as f32) * t).round() as u8;
            }
        }

        let v2_quadric = self.quadrics[v2];
        self.positions[v1] = new_pos;
        self.quadrics[v1] += v2_quadric;
    }

    fn to_triangle_mesh(&self, had_normals: bool) -> TriangleMesh {
        let mut keep = vec![false; self.positions.len()];
        for (fi, face) in self.faces.iter().enumerate() {
            if self.face_alive[fi] {
                for &v in face {
                    keep[v] = self.vertex_alive[v];
                }
            }
        }

        let mut mesh = TriangleMesh::from_vertices_and_faces(
            self.positions.clone(),
            self.faces
                .iter()
                .zip(&self.face_alive)
                .filter(|&(_, &alive)| alive)
                .map(|(f, _)| *f)
                .collect(),
        );
        mesh.uvs = self.uvs.clone();
        mesh.colors = self.colors.clone();
        mesh.compact_vertices(&keep);
        if had_normals {
            mesh.update_vertex_normals();
        }
        mesh
    }
}

// ============================================================
// Edge Cost for Priority Queue
// ============================================================

/// Priority of a collapse candidate: fewer folded faces first, then lower error.
#[derive(Debug, Clone, Copy)]
pub struct EdgeCost {
    pub folds: u32,
    pub error: f64,
}

impl EdgeCost {
    /// Cost of a candidate that must not be collapsed
    pub fn blocked() -> Self {
        Self {
            folds: u32::MAX,
            error: f64::INFINITY,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.error.is_infinite()
    }

    fn key_cmp(&self, other: &Self) -> Ordering {
        self.folds
            .cmp(&other.folds)
            .then(self.error.total_cmp(&other.error))
    }

    fn better_than(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Less
    }
}

impl PartialEq for EdgeCost {
    fn eq(&self, other: &Self) -> bool {
        self.key_cmp(other) == Ordering::Equal
    }
}
impl Eq for EdgeCost {}

impl PartialOrd for EdgeCost {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EdgeCost {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-queue pops the cheapest candidate first
        other.key_cmp(self)
    }
}

// ============================================================
// Edge Collapse Simplifier
// ============================================================

/// Edge collapse mesh simplifier using quadric error metrics.
pub struct EdgeCollapseSimplifier {
    /// Stop when the minimum collapse error exceeds this threshold
    pub error_threshold: Option<f64>,
    /// Never collapse an edge touching the mesh boundary
    pub preserve_boundary: bool,
    /// Weight of the constraint planes that hold boundary edges in place
    pub boundary_weight: f64,
}

impl Default for EdgeCollapseSimplifier {
    fn default() -> Self {
        Self {
            error_threshold: None,
            preserve_boundary: false,
            boundary_weight: 100.0,
        }
    }
}

impl EdgeCollapseSimplifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_params(
        error_threshold: Option<f64>,
        preserve_boundary: bool,
        boundary_weight: f64,
    ) -> Self {
        Self {
            error_threshold,
            preserve_boundary,
            boundary_weight,
        }
    }

    /// Build the initial priority queue of edge collapse candidates.
    fn build_queue(&self, cm: &CollapseMesh) -> Result<PriorityQueue<EdgeKey, EdgeCost>> {
        let edges = cm.edges()?;
        let mut queue = PriorityQueue::with_capacity(edges.len());
        for (v1, v2) in edges {
            let (_, cost) = cm.compute_collapse_cost(v1, v2);
            queue.push((v1, v2), cost);
        }
        Ok(queue)
    }

    /// Re-score every edge touching the 1-ring of `v`.
    ///
    /// Errors only change on edges at `v`, but fold counts change on any edge whose
    /// faces include `v`. Edges in `blocked` keep their infinite cost.
    fn rescore_around(
        &self,
        cm: &CollapseMesh,
        v: usize,
        queue: &mut PriorityQueue<EdgeKey, EdgeCost>,
        blocked: &HashSet<EdgeKey>,
    ) {
        let mut ring: Vec<usize> = cm.neighbors(v).into_iter().collect();
        ring.push(v);
        let mut done: HashSet<EdgeKey> = HashSet::new();
        for &u in &ring {
            for w in cm.neighbors(u) {
                let key = edge_key(u, w);
                if !blocked.contains(&key) && done.insert(key) {
                    let (_, cost) = cm.compute_collapse_cost(key.0, key.1);
                    queue.push(key, cost);
                }
            }
        }
    }
}

impl MeshSimplifier for EdgeCollapseSimplifier {
    fn decimate(&self, mesh: TriangleMesh, target_faces: usize) -> Result<DecimationResult> {
        let original = mesh.face_count();
        if original <= target_faces {
            debug!(faces = original, target = target_faces, "Mesh already within budget");
            return Ok(DecimationResult::unchanged(mesh, target_faces));
        }

        info!(original, target = target_faces, "Starting mesh decimation");

        let mut cm = CollapseMesh::from_triangle_mesh(&mesh, self.boundary_weight)?;
        let mut queue = self.build_queue(&cm)?;
        let mut collapses = 0usize;
        let mut rejected = 0usize;
        let mut blocked: HashSet<EdgeKey> = HashSet::new();

        while cm.active_face_count > target_faces {
            let Some(((v1, v2), cost)) = queue.pop() else {
                break;
            };
            if cost.is_blocked() {
                // Everything left in the queue is blocked too
                queue.push((v1, v2), cost);
                break;
            }
            if let Some(threshold) = self.error_threshold {
                if cost.error > threshold {
                    break;
                }
            }
            if !cm.vertex_alive[v1] || !cm.vertex_alive[v2] {
                continue;
            }

            if let Some(reason) = cm.collapse_blocker(v1, v2, self.preserve_boundary) {
                debug!(v1, v2, reason, "Collapse rejected");
                rejected += 1;
                blocked.insert((v1, v2));
                queue.push((v1, v2), EdgeCost::blocked());
                continue;
            }

            let (pos, _) = cm.compute_collapse_cost(v1, v2);
            let stale: Vec<EdgeKey> = cm
                .neighbors(v2)
                .into_iter()
                .map(|u| edge_key(v2, u))
                .collect();
            cm.collapse_edge(v1, v2, pos);
            for key in stale {
                queue.remove(&key);
            }
            self.rescore_around(&cm, v1, &mut queue, &blocked);
            collapses += 1;
        }

        let had_normals = mesh.normals.is_some();
        let result = DecimationResult {
            mesh: cm.to_triangle_mesh(had_normals),
            original_faces: original,
            final_faces: cm.active_face_count,
            target_faces,
            collapses_performed: collapses,
            collapses_rejected: rejected,
        };
        info!(
            final_faces = result.final_faces,
            collapses,
            rejected,
            shortfall = result.shortfall(),
            "Mesh decimation complete"
        );
        Ok(result)
    }
}

/// Count edges shared by three or more faces
pub fn non_manifold_edge_count(faces: &[[usize; 3]]) -> usize {
    let mut counts: HashMap<EdgeKey, usize> = HashMap::with_capacity(faces.len() * 3 / 2 + 1);
    for f in faces {
        for (u, v) in [(f[0], f[1]), (f[1], f[2]), (f[2], f[0])] {
            *counts.entry(edge_key(u, v)).or_default() += 1;
        }
    }
    counts.values().filter(|&&c| c > 2).count()
}
