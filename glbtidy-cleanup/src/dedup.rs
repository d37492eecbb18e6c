//! Vertex deduplication
//!
//! Vertices closer than `epsilon` are merged into the lowest original index of their
//! group. Candidate pairs come from a uniform grid with cell size `epsilon`, so every
//! pair within range lies in the same or an adjacent cell; groups are built with
//! union-find, which makes merging transitive.

use glbtidy_core::{Error, Result, Stage, StageWarning, TriangleMesh};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Parameters for vertex deduplication
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DedupParams {
    /// Merge distance in model units (inclusive)
    pub epsilon: f32,
}

impl Default for DedupParams {
    fn default() -> Self {
        Self { epsilon: 1e-4 }
    }
}

impl DedupParams {
    pub fn with_epsilon(epsilon: f32) -> Self {
        Self { epsilon }
    }
}

/// Summary of a deduplication pass
#[derive(Debug, Clone, Default)]
pub struct DedupReport {
    pub vertices_before: usize,
    pub vertices_after: usize,
    /// Faces dropped because two or more corners merged
    pub collapsed_faces: usize,
    /// Faces dropped because another face already spans the same vertices
    pub duplicate_faces: usize,
    pub warnings: Vec<StageWarning>,
}

impl DedupReport {
    pub fn merged_vertices(&self) -> usize {
        self.vertices_before - self.vertices_after
    }
}

type Cell = (i64, i64, i64);

#[inline]
fn cell_of(p: &glbtidy_core::Point3f, inv_cell: f64) -> Cell {
    (
        (p.x as f64 * inv_cell).floor() as i64,
        (p.y as f64 * inv_cell).floor() as i64,
        (p.z as f64 * inv_cell).floor() as i64,
    )
}

/// Union-find over vertex indices whose root is always the smallest member
struct MinUnionFind {
    parent: Vec<usize>,
}

impl MinUnionFind {
    fn new(n: usize) -> Self {
        Self {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, mut x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) -> bool {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra == rb {
            return false;
        }
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[hi] = lo;
        true
    }
}

/// Merge every group of vertices within `params.epsilon` of each other
///
/// Each group collapses to its lowest original index; that vertex keeps its own
/// attributes. Faces left with fewer than three distinct corners are dropped, as are
/// faces whose vertex set repeats an earlier face. Vertex arrays are compacted.
///
/// A non-positive or non-finite epsilon leaves the mesh untouched and reports a warning.
pub fn deduplicate_vertices(mesh: &mut TriangleMesh, params: &DedupParams) -> Result<DedupReport> {
    let n = mesh.vertex_count();
    let mut report = DedupReport {
        vertices_before: n,
        vertices_after: n,
        ..Default::default()
    };
    if n == 0 {
        return Ok(report);
    }

    let epsilon = params.epsilon;
    if !(epsilon.is_finite() && epsilon > 0.0) {
        let message = format!("merge distance {epsilon} is not positive; vertices left unmerged");
        warn!("{}", message);
        report.warnings.push(StageWarning::new(Stage::Dedup, message));
        return Ok(report);
    }

    let eps = epsilon as f64;
    let eps_sq = eps * eps;
    let inv_cell = 1.0 / eps;

    let mut grid: HashMap<Cell, Vec<usize>> = HashMap::new();
    grid.try_reserve(n)
        .map_err(|e| Error::exhausted(Stage::Dedup, format!("vertex grid for {n} vertices: {e}")))?;

    let mut sets = MinUnionFind::new(n);
    let mut unions = 0usize;

    for i in 0..n {
        let p = mesh.vertices[i];
        let (cx, cy, cz) = cell_of(&p, inv_cell);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let Some(candidates) = grid.get(&(cx + dx, cy + dy, cz + dz)) else {
                        continue;
                    };
                    for &j in candidates {
                        let q = mesh.vertices[j];
                        let d = nalgebra::Vector3::new(
                            p.x as f64 - q.x as f64,
                            p.y as f64 - q.y as f64,
                            p.z as f64 - q.z as f64,
                        );
                        if d.norm_squared() <= eps_sq && sets.union(i, j) {
                            unions += 1;
                        }
                    }
                }
            }
        }
        grid.entry((cx, cy, cz)).or_default().push(i);
    }

    debug!(cells = grid.len(), unions, "Vertex grid scan complete");

    if unions == 0 {
        info!(vertices = n, "No duplicate vertices found");
        return Ok(report);
    }

    let representative: Vec<usize> = (0..n).map(|i| sets.find(i)).collect();
    for face in mesh.faces.iter_mut() {
        for v in face.iter_mut() {
            *v = representative[*v];
        }
    }
    report.collapsed_faces = mesh.remove_degenerate_faces();
    report.duplicate_faces = remove_duplicate_faces(mesh);

    let keep: Vec<bool> = (0..n).map(|i| representative[i] == i).collect();
    mesh.compact_vertices(&keep);
    report.vertices_after = mesh.vertex_count();

    info!(
        merged = report.merged_vertices(),
        collapsed_faces = report.collapsed_faces,
        duplicate_faces = report.duplicate_faces,
        "Vertex deduplication complete"
    );
    Ok(report)
}

/// Drop faces spanning the same vertex set as an earlier face, in either winding
pub fn remove_duplicate_faces(mesh: &mut TriangleMesh) -> usize {
    let before = mesh.faces.len();
    let mut seen: HashSet<[usize; 3]> = HashSet::with_capacity(before);
    mesh.faces.retain(|face| {
        let mut key = *face;
        key.sort_unstable();
        seen.insert(key)
    });
    before - mesh.faces.len()
}
