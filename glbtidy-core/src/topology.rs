//! Derived edge topology and face connectivity
//!
//! Nothing here is cached on the mesh; stages rebuild what they need after
//! they mutate the face list.

use std::collections::{HashMap, VecDeque};

/// Unordered edge key with the smaller vertex index first
pub type EdgeKey = (usize, usize);

#[inline]
pub fn edge_key(a: usize, b: usize) -> EdgeKey {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

/// The three directed edges of a face in winding order
#[inline]
pub fn face_edges(face: &[usize; 3]) -> [(usize, usize); 3] {
    [(face[0], face[1]), (face[1], face[2]), (face[2], face[0])]
}

/// Classification of an edge by the number of faces sharing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Exactly one incident face
    Boundary,
    /// Exactly two incident faces
    Manifold,
    /// Three or more incident faces
    NonManifold,
}

impl EdgeKind {
    pub fn from_face_count(count: usize) -> Self {
        match count {
            0 | 1 => EdgeKind::Boundary,
            2 => EdgeKind::Manifold,
            _ => EdgeKind::NonManifold,
        }
    }
}

/// Edge-to-face incidence for a face list
#[derive(Debug, Clone, Default)]
pub struct EdgeTopology {
    edge_faces: HashMap<EdgeKey, Vec<usize>>,
}

impl EdgeTopology {
    pub fn build(faces: &[[usize; 3]]) -> Self {
        let mut edge_faces: HashMap<EdgeKey, Vec<usize>> =
            HashMap::with_capacity(faces.len() * 3 / 2 + 1);
        for (f, face) in faces.iter().enumerate() {
            for (a, b) in face_edges(face) {
                edge_faces.entry(edge_key(a, b)).or_default().push(f);
            }
        }
        Self { edge_faces }
    }

    /// Faces incident to the edge (a, b), in either direction
    pub fn faces_of(&self, a: usize, b: usize) -> &[usize] {
        self.edge_faces
            .get(&edge_key(a, b))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn kind(&self, a: usize, b: usize) -> Option<EdgeKind> {
        self.edge_faces
            .get(&edge_key(a, b))
            .map(|faces| EdgeKind::from_face_count(faces.len()))
    }

    pub fn contains(&self, a: usize, b: usize) -> bool {
        self.edge_faces.contains_key(&edge_key(a, b))
    }

    pub fn edge_count(&self) -> usize {
        self.edge_faces.len()
    }

    /// All edges with their incident faces, sorted by key
    pub fn edges(&self) -> Vec<(EdgeKey, &[usize])> {
        let mut edges: Vec<_> = self
            .edge_faces
            .iter()
            .map(|(k, f)| (*k, f.as_slice()))
            .collect();
        edges.sort_unstable_by_key(|(k, _)| *k);
        edges
    }

    /// Edges of the given kind, sorted by key
    pub fn edges_of_kind(&self, kind: EdgeKind) -> Vec<EdgeKey> {
        let mut edges: Vec<EdgeKey> = self
            .edge_faces
            .iter()
            .filter(|(_, f)| EdgeKind::from_face_count(f.len()) == kind)
            .map(|(k, _)| *k)
            .collect();
        edges.sort_unstable();
        edges
    }

    pub fn count_of_kind(&self, kind: EdgeKind) -> usize {
        self.edge_faces
            .values()
            .filter(|f| EdgeKind::from_face_count(f.len()) == kind)
            .count()
    }

    /// True when every edge is shared by exactly two faces
    pub fn is_closed_manifold(&self) -> bool {
        !self.edge_faces.is_empty()
            && self.edge_faces.values().all(|f| f.len() == 2)
    }
}

/// Faces incident to each vertex
pub fn vertex_faces(faces: &[[usize; 3]], vertex_count: usize) -> Vec<Vec<usize>> {
    let mut incident = vec![Vec::new(); vertex_count];
    for (f, face) in faces.iter().enumerate() {
        for &v in face {
            incident[v].push(f);
        }
    }
    incident
}

/// Connected components of the face-adjacency graph
///
/// Two faces are adjacent when they share an edge. With `manifold_only`, only edges
/// with exactly two incident faces connect faces. Components are returned in order of
/// their lowest face index and each lists its faces in breadth-first order from it.
pub fn face_components(
    faces: &[[usize; 3]],
    topology: &EdgeTopology,
    manifold_only: bool,
) -> Vec<Vec<usize>> {
    let mut component_of = vec![usize::MAX; faces.len()];
    let mut components = Vec::new();

    for seed in 0..faces.len() {
        if component_of[seed] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = vec![seed];
        let mut queue = VecDeque::from([seed]);
        component_of[seed] = id;

        while let Some(f) = queue.pop_front() {
            for (a, b) in face_edges(&faces[f]) {
                let shared = topology.faces_of(a, b);
                if manifold_only && shared.len() != 2 {
                    continue;
                }
                for &g in shared {
                    if component_of[g] == usize::MAX {
                        component_of[g] = id;
                        members.push(g);
                        queue.push_back(g);
                    }
                }
            }
        }
        components.push(members);
    }
    components
}
