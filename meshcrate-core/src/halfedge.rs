//! Half-edge mesh
//!
//! Vertices and half-edges live in contiguous arrays and are addressed by
//! index handles. Topology edits (edge collapse and edge split) never move
//! or reuse slots: removed elements are tombstoned so that handles held by
//! callers stay valid until [`HalfEdgeMesh::rebuild`] compacts the arrays.

use crate::error::{Error, Result};
use crate::geometry::tri_aspect_ratio;
use crate::mesh::{MeshData, PrimitiveType};
use crate::point::*;
use itertools::Itertools;
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};

/// Handle of a vertex slot
pub type VertexId = usize;

/// Handle of a half-edge slot
pub type EdgeId = usize;

const INVALID: usize = usize::MAX;

/// A directed edge of a triangle. Its face is the cycle `e -> next -> next`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalfEdge {
    pub from: VertexId,
    pub to: VertexId,
    pub next: EdgeId,
    /// Oppositely directed twin, `None` on a mesh boundary
    pub opp: Option<EdgeId>,
    deleted: bool,
}

impl HalfEdge {
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

/// Half-edge mesh supporting traversal, edge collapse and edge split.
#[derive(Debug, Clone)]
pub struct HalfEdgeMesh {
    edges: Vec<HalfEdge>,
    /// Outgoing half-edges per vertex
    vertex_edges: Vec<Vec<EdgeId>>,
    positions: Vec<Point3f>,
    normals: Option<Vec<Vector3f>>,
    tex_coords: Option<Vec<TexCoord>>,
    vertex_removed: Vec<bool>,
    face_count: usize,
    vertex_count: usize,
}

impl HalfEdgeMesh {
    /// Build a half-edge mesh from an indexed triangle mesh.
    ///
    /// Triangles with repeated vertex indices are skipped. A directed edge
    /// used by more than one triangle (non-manifold edge or inconsistent
    /// winding) is rejected.
    pub fn from_mesh(mesh: &MeshData) -> Result<Self> {
        Error::check_primitive_type(PrimitiveType::Triangles, mesh.primitive_type)?;
        mesh.check_indices()?;
        let nv = mesh.vertices.len();

        let mut edges: Vec<HalfEdge> = Vec::with_capacity(mesh.indices.len());
        let mut vertex_edges = vec![Vec::new(); nv];
        let mut edge_map: HashMap<(VertexId, VertexId), EdgeId> = HashMap::with_capacity(mesh.indices.len());
        let mut skipped = 0usize;

        for face in mesh.triangles() {
            if face[0] == face[1] || face[1] == face[2] || face[2] == face[0] {
                skipped += 1;
                continue;
            }
            let base = edges.len();
            for (j, (from, to)) in face.into_iter().circular_tuple_windows().enumerate() {
                if edge_map.insert((from, to), base + j).is_some() {
                    return Err(Error::InvalidData(format!(
                        "directed edge {from} -> {to} is used by more than one triangle"
                    )));
                }
                edges.push(HalfEdge {
                    from,
                    to,
                    next: base + (j + 1) % 3,
                    opp: None,
                    deleted: false,
                });
                vertex_edges[from].push(base + j);
            }
        }
        if skipped > 0 {
            warn!(skipped, "skipped degenerate triangles while building half-edge mesh");
        }

        for e in edges.iter_mut() {
            e.opp = edge_map.get(&(e.to, e.from)).copied();
        }

        let vertex_removed: Vec<bool> = vertex_edges.iter().map(|out| out.is_empty()).collect();
        let vertex_count = vertex_removed.iter().filter(|&&r| !r).count();
        let face_count = edges.len() / 3;

        Ok(Self {
            edges,
            vertex_edges,
            positions: mesh.vertices.clone(),
            normals: mesh.normals.clone().filter(|n| n.len() == nv),
            tex_coords: mesh.tex_coords.clone().filter(|t| t.len() == nv),
            vertex_removed,
            face_count,
            vertex_count,
        })
    }

    /// Number of live triangles
    pub fn face_count(&self) -> usize {
        self.face_count
    }

    /// Number of live vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_count
    }

    /// Number of vertex slots, including tombstoned ones
    pub fn vertex_capacity(&self) -> usize {
        self.positions.len()
    }

    pub fn edge(&self, e: EdgeId) -> &HalfEdge {
        &self.edges[e]
    }

    #[inline]
    pub fn next(&self, e: EdgeId) -> EdgeId {
        self.edges[e].next
    }

    #[inline]
    pub fn prev(&self, e: EdgeId) -> EdgeId {
        self.next(self.next(e))
    }

    #[inline]
    pub fn opp(&self, e: EdgeId) -> Option<EdgeId> {
        self.edges[e].opp
    }

    pub fn position(&self, v: VertexId) -> Point3f {
        self.positions[v]
    }

    pub fn update_position(&mut self, v: VertexId, position: Point3f) {
        self.positions[v] = position;
    }

    /// Outgoing half-edges of a vertex
    pub fn vertex_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex_edges[v]
    }

    pub fn is_vertex_deleted(&self, v: VertexId) -> bool {
        self.vertex_removed[v]
    }

    pub fn is_edge_deleted(&self, e: EdgeId) -> bool {
        self.edges[e].deleted
    }

    /// All live half-edges
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        (0..self.edges.len()).filter(move |&e| !self.edges[e].deleted)
    }

    /// All live vertices
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        (0..self.positions.len()).filter(move |&v| !self.vertex_removed[v])
    }

    /// One half-edge per live triangle
    pub fn distinct_triangle_edges(&self) -> Vec<EdgeId> {
        self.edge_ids()
            .filter(|&e| {
                let n = self.next(e);
                e < n && e < self.next(n)
            })
            .collect()
    }

    /// Vertices of the triangle `e` belongs to, starting at `e.from`
    pub fn triangle(&self, e: EdgeId) -> [VertexId; 3] {
        let he = &self.edges[e];
        [he.from, he.to, self.edges[he.next].to]
    }

    pub fn find_edge(&self, from: VertexId, to: VertexId) -> Option<EdgeId> {
        self.vertex_edges[from]
            .iter()
            .copied()
            .find(|&e| self.edges[e].to == to)
    }

    pub fn neighbors(&self, v: VertexId) -> HashSet<VertexId> {
        let mut result = HashSet::with_capacity(self.vertex_edges[v].len() + 1);
        for &out in &self.vertex_edges[v] {
            result.insert(self.edges[out].to);
            result.insert(self.edges[self.prev(out)].from);
        }
        result
    }

    pub fn valence(&self, v: VertexId) -> usize {
        self.neighbors(v).len()
    }

    /// A vertex is on the border if any incident half-edge has no opposite.
    pub fn is_border_vertex(&self, v: VertexId) -> bool {
        self.vertex_edges[v]
            .iter()
            .any(|&out| self.edges[out].opp.is_none() || self.edges[self.prev(out)].opp.is_none())
    }

    pub fn edge_length(&self, e: EdgeId) -> f32 {
        let he = &self.edges[e];
        (self.positions[he.to] - self.positions[he.from]).norm()
    }

    /// Aspect ratio of the triangle `e` belongs to
    pub fn tri_aspect_ratio(&self, e: EdgeId) -> f32 {
        let [a, b, c] = self.triangle(e);
        tri_aspect_ratio(&self.positions[a], &self.positions[b], &self.positions[c])
    }

    /// Whether collapsing `e` keeps the mesh a manifold.
    ///
    /// Requires the link condition (the endpoints share exactly the apex
    /// vertices of the adjacent faces), refuses to pinch an interior edge
    /// whose endpoints both lie on the border, and never folds a closed
    /// tetrahedron-like neighborhood into a double sided sheet.
    pub fn can_collapse(&self, e: EdgeId) -> bool {
        let he = self.edges[e];
        if he.deleted {
            return false;
        }
        let apex1 = self.edges[he.next].to;
        let apex2 = he.opp.map(|o| self.edges[self.edges[o].next].to);

        let na = self.neighbors(he.from);
        let nb = self.neighbors(he.to);
        let expected = if apex2.is_some() { 2 } else { 1 };
        if na.intersection(&nb).count() != expected {
            return false;
        }
        if apex2.is_some() && self.is_border_vertex(he.from) && self.is_border_vertex(he.to) {
            return false;
        }
        std::iter::once(apex1)
            .chain(apex2)
            .all(|apex| self.is_border_vertex(apex) || self.valence(apex) > 3)
    }

    /// Whether moving the merged vertex of collapsing `e` to `target` would
    /// invert any triangle that survives the collapse.
    pub fn collapse_flips_faces(&self, e: EdgeId, target: &Point3f) -> bool {
        let he = &self.edges[e];
        let (a, b) = (he.from, he.to);
        for v in [a, b] {
            let pv = self.positions[v];
            for &out in &self.vertex_edges[v] {
                let x = self.edges[out].to;
                let y = self.edges[self.next(out)].to;
                if x == a || x == b || y == a || y == b {
                    // removed by the collapse
                    continue;
                }
                let px = self.positions[x];
                let py = self.positions[y];
                let old_n = (px - pv).cross(&(py - pv));
                let new_n = (px - target).cross(&(py - target));
                let d = old_n.dot(&new_n);
                if d < 0.0 || (d == 0.0 && old_n.norm_squared() > 0.0) {
                    return true;
                }
            }
        }
        false
    }

    /// Collapse half-edge `e`, merging `e.to` into `e.from`.
    ///
    /// The surviving vertex keeps the slot of `e.from` and is placed at
    /// `from + t * (to - from)`; `t = 0` keeps its current position. The one
    /// or two triangles adjacent to the edge are deleted. Callers must check
    /// [`can_collapse`](Self::can_collapse) first.
    pub fn collapse(&mut self, e: EdgeId, t: f32) {
        let he = self.edges[e];
        debug_assert!(!he.deleted, "collapsing deleted half-edge {e}");
        let (a, b) = (he.from, he.to);
        let apex1 = self.edges[he.next].to;
        let apex2 = he.opp.map(|o| self.edges[self.edges[o].next].to);

        self.remove_collapsed_face(e);
        if let Some(o) = he.opp {
            self.remove_collapsed_face(o);
        }

        for out in std::mem::take(&mut self.vertex_edges[b]) {
            self.edges[out].from = a;
            let incoming = self.prev(out);
            self.edges[incoming].to = a;
            self.vertex_edges[a].push(out);
        }
        self.mark_removed(b);

        let pa = self.positions[a];
        self.positions[a] = pa + (self.positions[b] - pa) * t;
        if let Some(normals) = self.normals.as_mut() {
            let n = normals[a].lerp(&normals[b], t);
            normals[a] = n.try_normalize(0.0).unwrap_or(normals[a]);
        }
        if let Some(uvs) = self.tex_coords.as_mut() {
            uvs[a] = uvs[a] + (uvs[b] - uvs[a]) * t;
        }

        for v in std::iter::once(a).chain(Some(apex1)).chain(apex2) {
            if !self.vertex_removed[v] && self.vertex_edges[v].is_empty() {
                self.mark_removed(v);
            }
        }
    }

    /// Delete the face of `e0` as part of collapsing `e0` and stitch the
    /// opposites of its two other edges together.
    fn remove_collapsed_face(&mut self, e0: EdgeId) {
        let e1 = self.next(e0);
        let e2 = self.next(e1);
        let o1 = self.edges[e1].opp;
        let o2 = self.edges[e2].opp;
        if let Some(o1) = o1 {
            self.edges[o1].opp = o2;
        }
        if let Some(o2) = o2 {
            self.edges[o2].opp = o1;
        }
        for id in [e0, e1, e2] {
            let from = self.edges[id].from;
            self.vertex_edges[from].retain(|&x| x != id);
            self.edges[id].deleted = true;
            self.edges[id].opp = None;
        }
        self.face_count -= 1;
    }

    fn mark_removed(&mut self, v: VertexId) {
        self.vertex_edges[v].clear();
        self.vertex_removed[v] = true;
        self.vertex_count -= 1;
    }

    fn add_vertex(&mut self, a: VertexId, b: VertexId, f: f32) -> VertexId {
        let pa = self.positions[a];
        self.positions.push(pa + (self.positions[b] - pa) * f);
        if let Some(normals) = self.normals.as_mut() {
            let n = normals[a].lerp(&normals[b], f);
            normals.push(n.try_normalize(0.0).unwrap_or(normals[a]));
        }
        if let Some(uvs) = self.tex_coords.as_mut() {
            uvs.push(uvs[a] + (uvs[b] - uvs[a]) * f);
        }
        self.vertex_edges.push(Vec::new());
        self.vertex_removed.push(false);
        self.vertex_count += 1;
        self.positions.len() - 1
    }

    fn push_edge(&mut self, from: VertexId, to: VertexId, next: EdgeId, opp: Option<EdgeId>) -> EdgeId {
        let id = self.edges.len();
        self.edges.push(HalfEdge {
            from,
            to,
            next,
            opp,
            deleted: false,
        });
        self.vertex_edges[from].push(id);
        id
    }

    /// Split half-edge `e` at `from + f * (to - from)`, splitting the one or
    /// two adjacent triangles in two. Returns the inserted vertex.
    pub fn split(&mut self, e: EdgeId, f: f32) -> VertexId {
        let he = self.edges[e];
        debug_assert!(!he.deleted, "splitting deleted half-edge {e}");
        let (a, b) = (he.from, he.to);
        let x = he.next;
        let y = self.next(x);
        let c = self.edges[x].to;
        let m = self.add_vertex(a, b, f);

        // (a, b, c) becomes (a, m, c) + (m, b, c)
        let n1 = self.edges.len();
        let (n2, n3) = (n1 + 1, n1 + 2);
        self.edges[e].to = m;
        self.edges[e].next = n1;
        self.push_edge(m, c, y, Some(n3));
        self.push_edge(m, b, x, None);
        self.push_edge(c, m, n2, Some(n1));
        self.edges[x].next = n3;
        self.face_count += 1;

        if let Some(o) = he.opp {
            // (b, a, d) becomes (m, a, d) + (b, m, d)
            let p = self.next(o);
            let q = self.next(p);
            let d = self.edges[p].to;

            self.vertex_edges[b].retain(|&id| id != o);
            self.edges[o].from = m;
            self.vertex_edges[m].push(o);

            let n4 = self.edges.len();
            let (n5, n6) = (n4 + 1, n4 + 2);
            self.push_edge(d, m, o, Some(n6));
            self.push_edge(b, m, n6, Some(n2));
            self.push_edge(m, d, q, Some(n4));
            self.edges[p].next = n4;
            self.edges[q].next = n5;
            self.edges[n2].opp = Some(n5);
            self.face_count += 1;
        }
        m
    }

    /// Compact the backing arrays, dropping tombstoned vertices and edges.
    /// All previously handed out handles are invalidated.
    pub fn rebuild(&mut self) {
        let vertex_map = self.live_vertex_map();
        let mut edge_map = vec![INVALID; self.edges.len()];
        let mut live = 0;
        for (i, e) in self.edges.iter().enumerate() {
            if !e.deleted {
                edge_map[i] = live;
                live += 1;
            }
        }

        let mut vertex_edges = vec![Vec::new(); self.vertex_count];
        let edges: Vec<HalfEdge> = self
            .edges
            .iter()
            .filter(|e| !e.deleted)
            .enumerate()
            .map(|(id, e)| {
                let from = vertex_map[e.from];
                vertex_edges[from].push(id);
                HalfEdge {
                    from,
                    to: vertex_map[e.to],
                    next: edge_map[e.next],
                    opp: e.opp.map(|o| edge_map[o]),
                    deleted: false,
                }
            })
            .collect();

        let keep = |v: &usize| !self.vertex_removed[*v];
        self.positions = (0..self.positions.len()).filter(keep).map(|v| self.positions[v]).collect();
        self.normals = self
            .normals
            .as_ref()
            .map(|n| (0..n.len()).filter(keep).map(|v| n[v]).collect());
        self.tex_coords = self
            .tex_coords
            .as_ref()
            .map(|t| (0..t.len()).filter(keep).map(|v| t[v]).collect());

        debug!(
            vertices = self.vertex_count,
            faces = self.face_count,
            dropped_edges = self.edges.len() - edges.len(),
            "compacted half-edge mesh"
        );
        self.vertex_removed = vec![false; self.vertex_count];
        self.vertex_edges = vertex_edges;
        self.edges = edges;
    }

    fn live_vertex_map(&self) -> Vec<usize> {
        let mut map = vec![INVALID; self.positions.len()];
        for (new, old) in self.vertex_ids().enumerate() {
            map[old] = new;
        }
        map
    }

    /// Export the live triangles as an indexed mesh.
    pub fn to_mesh(&self, generate_normals: bool, generate_tangents: bool) -> MeshData {
        let vertex_map = self.live_vertex_map();
        let live: Vec<VertexId> = self.vertex_ids().collect();

        let faces = self
            .distinct_triangle_edges()
            .into_iter()
            .map(|e| self.triangle(e).map(|v| vertex_map[v]))
            .collect();
        let mut mesh = MeshData::from_triangles(live.iter().map(|&v| self.positions[v]).collect(), faces);
        mesh.normals = self.normals.as_ref().map(|n| live.iter().map(|&v| n[v]).collect());
        mesh.tex_coords = self.tex_coords.as_ref().map(|t| live.iter().map(|&v| t[v]).collect());

        if generate_normals {
            mesh.generate_normals();
        }
        if generate_tangents && !mesh.generate_tangents() {
            debug!("mesh has no texture coordinates, tangents not generated");
        }
        mesh
    }

    /// Verify the half-edge invariants. Intended for tests and debugging.
    pub fn check_consistency(&self) -> Result<()> {
        let fail = |msg: String| Err(Error::InvalidData(msg));
        let mut live_edges = 0;
        for e in self.edge_ids() {
            live_edges += 1;
            let he = &self.edges[e];
            if self.vertex_removed[he.from] || self.vertex_removed[he.to] {
                return fail(format!("half-edge {e} references a removed vertex"));
            }
            if self.edges[he.next].deleted || self.prev(self.prev(e)) != he.next {
                return fail(format!("half-edge {e} is not part of a live triangle"));
            }
            if self.edges[he.next].from != he.to {
                return fail(format!("half-edge {e} and its successor are not connected"));
            }
            if let Some(o) = he.opp {
                let ho = &self.edges[o];
                if ho.deleted || ho.opp != Some(e) || ho.from != he.to || ho.to != he.from {
                    return fail(format!("half-edge {e} and its opposite {o} disagree"));
                }
            }
            if !self.vertex_edges[he.from].contains(&e) {
                return fail(format!("half-edge {e} missing from outgoing list of {}", he.from));
            }
        }
        for v in self.vertex_ids() {
            for &out in &self.vertex_edges[v] {
                if self.edges[out].deleted || self.edges[out].from != v {
                    return fail(format!("vertex {v} lists invalid outgoing half-edge {out}"));
                }
            }
            if self.vertex_edges[v].is_empty() {
                return fail(format!("live vertex {v} has no incident faces"));
            }
        }
        if live_edges != self.face_count * 3 {
            return fail(format!("{live_edges} live half-edges for {} faces", self.face_count));
        }
        if self.vertex_ids().count() != self.vertex_count {
            return fail("live vertex count out of sync".to_string());
        }
        Ok(())
    }
}
