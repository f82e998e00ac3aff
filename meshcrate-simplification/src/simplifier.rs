//! Quadric error metric edge collapse simplifier
//!
//! The simplifier keeps one collapse candidate per undirected edge in an
//! error ordered queue and repeatedly applies the cheapest collapse. After
//! every collapse only the candidates around the merged vertex are
//! recomputed; candidates elsewhere whose error changed in the meantime are
//! detected when they reach the front of the queue and put back. Whenever
//! the face count halves, sliver triangles are split so they can collapse
//! away cleanly.

use crate::candidates::{CollapseCandidate, CollapseQueue, EdgeKey};
use crate::criterion::TermCriterion;
use crate::params::SimplifyParams;
use crate::quadric::ErrorQuadric;
use crate::stats::{SimplifyEvent, SimplifyStats, TerminationReason};
use crate::strategy::{CollapseStrategy, CollapseTarget, QuadricCollapseStrategy};
use itertools::Itertools;
use meshcrate_core::{EdgeId, Error, HalfEdgeMesh, MeshData, PrimitiveType, Result, VertexId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;
use tracing::{debug, warn};

/// Edge collapse mesh simplifier
pub struct MeshSimplifier {
    params: SimplifyParams,
    strategy: Box<dyn CollapseStrategy>,
    excluded_edges: HashSet<EdgeKey>,
}

impl Default for MeshSimplifier {
    fn default() -> Self {
        Self::new(SimplifyParams::default())
    }
}

impl MeshSimplifier {
    pub fn new(params: SimplifyParams) -> Self {
        Self {
            params,
            strategy: Box::new(QuadricCollapseStrategy),
            excluded_edges: HashSet::new(),
        }
    }

    pub fn with_strategy<S: CollapseStrategy + 'static>(mut self, strategy: S) -> Self {
        self.strategy = Box::new(strategy);
        self
    }

    /// Edges that must never be collapsed
    pub fn with_excluded_edges<I: IntoIterator<Item = EdgeKey>>(mut self, edges: I) -> Self {
        self.excluded_edges.extend(edges);
        self
    }

    pub fn params(&self) -> &SimplifyParams {
        &self.params
    }

    pub fn excluded_edges(&self) -> &HashSet<EdgeKey> {
        &self.excluded_edges
    }

    /// Simplify an indexed triangle mesh in place.
    ///
    /// Fails without touching `mesh` if it is not a non-empty, manifold
    /// triangle mesh.
    pub fn simplify(&self, mesh: &mut MeshData, criterion: &mut dyn TermCriterion) -> Result<SimplifyStats> {
        Error::check_primitive_type(PrimitiveType::Triangles, mesh.primitive_type)?;
        if mesh.is_empty() {
            return Err(Error::InvalidData("Mesh is empty".to_string()));
        }

        let mut hem = HalfEdgeMesh::from_mesh(mesh)?;
        let stats = self.simplify_mesh(&mut hem, criterion);
        *mesh = hem.to_mesh(self.params.generate_normals, self.params.generate_tangents);
        Ok(stats)
    }

    /// Simplify a half-edge mesh in place. The mesh is compacted afterwards,
    /// which invalidates all vertex and edge handles.
    pub fn simplify_mesh(&self, mesh: &mut HalfEdgeMesh, criterion: &mut dyn TermCriterion) -> SimplifyStats {
        let mut run = SimplifyRun::new(self, mesh);
        criterion.init(run.mesh);
        run.rebuild_queue();
        run.process(criterion)
    }
}

/// State of a single simplification run
struct SimplifyRun<'a> {
    params: &'a SimplifyParams,
    strategy: &'a dyn CollapseStrategy,
    excluded_edges: &'a HashSet<EdgeKey>,
    mesh: &'a mut HalfEdgeMesh,
    quadrics: HashMap<VertexId, ErrorQuadric>,
    queue: CollapseQueue,
    stats: SimplifyStats,
}

impl<'a> SimplifyRun<'a> {
    fn new(simplifier: &'a MeshSimplifier, mesh: &'a mut HalfEdgeMesh) -> Self {
        let stats = SimplifyStats::new(mesh.face_count(), mesh.vertex_count());
        Self {
            params: &simplifier.params,
            strategy: simplifier.strategy.as_ref(),
            excluded_edges: &simplifier.excluded_edges,
            mesh,
            quadrics: HashMap::new(),
            queue: CollapseQueue::new(),
            stats,
        }
    }

    fn process(mut self, criterion: &mut dyn TermCriterion) -> SimplifyStats {
        let start = Instant::now();
        debug!(
            faces = self.mesh.face_count(),
            vertices = self.mesh.vertex_count(),
            candidates = self.queue.len(),
            "simplifying mesh"
        );

        let mut next_reshape = self.mesh.face_count() / 2;
        let mut last_error = 0.0;
        let mut collapses_since_build = 0;

        let termination = loop {
            if self.mesh.face_count() < next_reshape {
                self.reshape_triangles();
                next_reshape = self.mesh.face_count() / 2;
                collapses_since_build = 0;
            }

            match self.queue.min_error() {
                None => break TerminationReason::QueueExhausted,
                Some(e) if e == f64::INFINITY => {
                    // infinite entries may be outdated since the last full build
                    if collapses_since_build == 0 {
                        break TerminationReason::NoViableCandidates;
                    }
                    debug!(candidates = self.queue.len(), "only infinite candidates left, refreshing queue");
                    collapses_since_build = 0;
                    self.stats.queue_refreshes += 1;
                    self.record(SimplifyEvent::QueueRefresh);
                    self.rebuild_queue();
                    continue;
                }
                Some(_) => {}
            }
            if criterion.is_finished(self.mesh, last_error) {
                break TerminationReason::CriterionMet;
            }

            let Some(mut candidate) = self.queue.poll() else {
                break TerminationReason::QueueExhausted;
            };
            if self.is_stale(&candidate) {
                self.stats.stale_entries += 1;
                debug!(edge = candidate.edge, "skipping stale collapse candidate");
                continue;
            }

            let he = *self.mesh.edge(candidate.edge);
            if he.from != candidate.from || he.to != candidate.to {
                warn!(
                    edge = candidate.edge,
                    expected = ?(candidate.from, candidate.to),
                    actual = ?(he.from, he.to),
                    "collapse candidate out of sync with mesh, rebuilding queue"
                );
                self.stats.queue_rebuilds += 1;
                self.record(SimplifyEvent::QueueRebuild);
                self.rebuild_queue();
                collapses_since_build = 0;
                continue;
            }

            let target = self.collapse_target(candidate.edge);
            let changed = target.error != candidate.error;
            let behind_front = self
                .queue
                .min_error()
                .is_some_and(|min| target.error > min || target.error == f64::INFINITY);
            let may_requeue = candidate.requeues < self.params.max_requeues || target.error == f64::INFINITY;
            if changed && behind_front && may_requeue {
                candidate.error = target.error;
                candidate.position = target.position;
                candidate.requeues += 1;
                self.stats.requeued += 1;
                self.queue.insert(candidate);
                continue;
            }

            if target.error.is_finite() {
                last_error = target.error;
                self.collapse(&candidate, target);
                collapses_since_build += 1;
            } else {
                debug!("no more collapsible edges");
                break TerminationReason::NoViableCandidates;
            }
        };

        self.mesh.rebuild();

        let mut stats = self.stats;
        stats.final_faces = self.mesh.face_count();
        stats.final_vertices = self.mesh.vertex_count();
        stats.last_error = last_error;
        stats.termination = termination;
        stats.elapsed = start.elapsed();
        debug!(
            faces = stats.final_faces,
            vertices = stats.final_vertices,
            last_error,
            ?termination,
            elapsed_ms = stats.elapsed.as_millis() as u64,
            "mesh simplification done"
        );
        stats
    }

    fn record(&mut self, event: SimplifyEvent) {
        if self.params.record_events {
            self.stats.events.push(event);
        }
    }

    fn is_stale(&self, candidate: &CollapseCandidate) -> bool {
        self.mesh.is_edge_deleted(candidate.edge)
            || [candidate.from, candidate.to]
                .iter()
                .any(|v| self.quadrics.get(v).map_or(true, |q| q.is_deleted(self.mesh)))
    }

    /// Where collapsing `edge` would put the merged vertex and at what
    /// cost. Collapses the mesh forbids or that would flip a face cost
    /// infinity.
    fn collapse_target(&self, edge: EdgeId) -> CollapseTarget {
        let he = self.mesh.edge(edge);
        let (Some(q1), Some(q2)) = (self.quadrics.get(&he.from), self.quadrics.get(&he.to)) else {
            return CollapseTarget {
                position: self.mesh.position(he.from),
                error: f64::INFINITY,
            };
        };

        let mut target = self.strategy.compute_collapse(self.mesh, q1, q2);
        if !self.mesh.can_collapse(edge) || self.mesh.collapse_flips_faces(edge, &target.position) {
            target.error = f64::INFINITY;
        }
        target
    }

    /// Queue a candidate for the undirected edge of `edge`, if `edge` is the
    /// half-edge representing it.
    fn insert_edge(&mut self, edge: EdgeId) {
        let he = *self.mesh.edge(edge);
        if he.is_deleted() || !(he.from < he.to || he.opp.is_none()) {
            return;
        }
        let key = EdgeKey::new(he.from, he.to);
        if self.excluded_edges.contains(&key) {
            return;
        }

        let mesh = &*self.mesh;
        let area_weighted = self.params.area_weighted_quadrics;
        let mut touches_border = false;
        for v in [he.from, he.to] {
            let q = self
                .quadrics
                .entry(v)
                .or_insert_with(|| ErrorQuadric::new(mesh, v, area_weighted));
            touches_border |= q.is_border;
        }
        if self.params.keep_borders && touches_border {
            return;
        }

        let target = self.collapse_target(edge);
        self.queue.insert(CollapseCandidate {
            edge,
            key,
            from: he.from,
            to: he.to,
            position: target.position,
            error: target.error,
            requeues: 0,
        });
    }

    fn rebuild_queue(&mut self) {
        self.queue.clear();
        let edges: Vec<EdgeId> = self.mesh.edge_ids().collect();
        for e in edges {
            self.insert_edge(e);
        }
    }

    /// Outgoing and incoming half-edges of `v`
    fn incident_edges(&self, v: VertexId) -> Vec<EdgeId> {
        self.mesh
            .vertex_edges(v)
            .iter()
            .flat_map(|&out| [out, self.mesh.prev(out)])
            .collect()
    }

    fn collapse(&mut self, candidate: &CollapseCandidate, target: CollapseTarget) {
        let (kept, removed) = (candidate.from, candidate.to);
        let Some(removed_quadric) = self.quadrics.remove(&removed) else {
            return;
        };

        let affected: Vec<EdgeKey> = self
            .incident_edges(kept)
            .into_iter()
            .chain(self.incident_edges(removed))
            .map(|e| {
                let he = self.mesh.edge(e);
                EdgeKey::new(he.from, he.to)
            })
            .unique()
            .collect();
        for key in &affected {
            self.queue.remove(key);
        }

        if let Some(q) = self.quadrics.get_mut(&kept) {
            q.consume(&removed_quadric);
        }
        self.mesh.collapse(candidate.edge, 0.0);
        self.mesh.update_position(kept, target.position);

        for e in self.incident_edges(kept) {
            self.insert_edge(e);
        }

        self.stats.collapses += 1;
        self.record(SimplifyEvent::Collapse {
            edge: candidate.key,
            kept,
            removed,
            error: target.error,
        });
    }

    /// Split the longest edge of every sliver triangle at the foot of the
    /// opposite vertex, then rebuild the queue. Border edges stay whole
    /// when borders are kept.
    fn reshape_triangles(&mut self) {
        let mut splits = 0;
        for e in self.mesh.distinct_triangle_edges() {
            if self.mesh.is_edge_deleted(e) || !(self.mesh.tri_aspect_ratio(e) > self.params.reshape_aspect_ratio) {
                continue;
            }
            let Some(longest) = [e, self.mesh.next(e), self.mesh.prev(e)]
                .into_iter()
                .max_by(|&x, &y| self.mesh.edge_length(x).total_cmp(&self.mesh.edge_length(y)))
            else {
                continue;
            };

            let he = *self.mesh.edge(longest);
            if self.params.keep_borders && he.opp.is_none() {
                continue;
            }
            let a = self.mesh.position(he.from);
            let b = self.mesh.position(he.to);
            let c = self.mesh.position(self.mesh.edge(he.next).to);
            let ab = b - a;
            let len_sqr = ab.norm_squared();
            if len_sqr <= 0.0 {
                continue;
            }
            let f = (c - a).dot(&ab) / len_sqr;
            if f > 0.1 && f < 0.9 {
                self.mesh.split(longest, f);
                splits += 1;
            }
        }

        let faces = self.mesh.face_count();
        debug!(splits, faces, "reshaped sliver triangles");
        self.stats.reshape_passes += 1;
        self.stats.splits += splits;
        self.record(SimplifyEvent::Reshape { splits, faces });
        self.rebuild_queue();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criterion::{FaceCountCriterion, FaceCountRatioCriterion};
    use crate::quadric::Quadric;
    use crate::strategy::MidpointCollapseStrategy;
    use approx::assert_relative_eq;
    use meshcrate_core::Point3f;

    fn make_plane_grid(size: usize) -> MeshData {
        let mut vertices = Vec::new();
        for y in 0..size {
            for x in 0..size {
                vertices.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        let mut faces = Vec::new();
        for y in 0..(size - 1) {
            for x in 0..(size - 1) {
                let tl = y * size + x;
                let tr = tl + 1;
                let bl = (y + 1) * size + x;
                let br = bl + 1;
                faces.push([tl, tr, bl]);
                faces.push([tr, br, bl]);
            }
        }
        MeshData::from_triangles(vertices, faces)
    }

    fn make_curved_surface(size: usize) -> MeshData {
        let mut mesh = make_plane_grid(size);
        for v in &mut mesh.vertices {
            let fx = v.x / (size - 1) as f32 * std::f32::consts::PI;
            let fy = v.y / (size - 1) as f32 * std::f32::consts::PI;
            v.z = fx.sin() * fy.sin() * 2.0;
        }
        mesh
    }

    fn half_edge(mesh: &MeshData) -> HalfEdgeMesh {
        HalfEdgeMesh::from_mesh(mesh).unwrap()
    }

    #[test]
    fn test_simplify_grid_to_face_count() {
        let mut hem = half_edge(&make_plane_grid(10));
        let stats = MeshSimplifier::default().simplify_mesh(&mut hem, &mut FaceCountCriterion::new(50));

        assert_eq!(stats.initial_faces, 162);
        assert_eq!(stats.termination, TerminationReason::CriterionMet);
        assert!(hem.face_count() <= 50);
        assert_eq!(stats.final_faces, hem.face_count());
        hem.check_consistency().unwrap();
    }

    #[test]
    fn test_initial_queue_has_one_candidate_per_edge() {
        let mut hem = half_edge(&make_curved_surface(6));
        let simplifier = MeshSimplifier::default();
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.rebuild_queue();

        let mut keys: Vec<EdgeKey> = run
            .mesh
            .edge_ids()
            .map(|e| {
                let he = run.mesh.edge(e);
                EdgeKey::new(he.from, he.to)
            })
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(run.queue.len(), keys.len());
        assert!(keys.iter().all(|k| run.queue.contains(k)));
        assert!(run.queue.is_consistent());
    }

    #[test]
    fn test_queue_stays_consistent_during_collapses() {
        let mut hem = half_edge(&make_curved_surface(8));
        let simplifier = MeshSimplifier::default();
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.rebuild_queue();

        for _ in 0..20 {
            let Some(candidate) = run.queue.poll() else { break };
            let target = run.collapse_target(candidate.edge);
            if target.error.is_finite() {
                run.collapse(&candidate, target);
            }
            assert!(run.queue.is_consistent());
            for key in run.queue.keys() {
                let c = run.queue.get(key).unwrap();
                assert!(!run.mesh.is_edge_deleted(c.edge));
            }
        }
        run.mesh.check_consistency().unwrap();
    }

    #[test]
    fn test_merged_quadric_is_sum_of_absorbed_vertices() {
        let mut hem = half_edge(&make_curved_surface(12));
        let simplifier = MeshSimplifier::default();
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.rebuild_queue();

        let original = run.quadrics.clone();
        let mut absorbed: HashMap<VertexId, Vec<VertexId>> = original.keys().map(|&v| (v, vec![v])).collect();

        let mut collapses = 0;
        while collapses < 100 {
            let Some(candidate) = run.queue.poll() else { break };
            let he = *run.mesh.edge(candidate.edge);
            if run.is_stale(&candidate) || he.from != candidate.from || he.to != candidate.to {
                continue;
            }
            let target = run.collapse_target(candidate.edge);
            if !target.error.is_finite() {
                continue;
            }
            run.collapse(&candidate, target);
            let merged = absorbed.remove(&candidate.to).unwrap();
            absorbed.get_mut(&candidate.from).unwrap().extend(merged);
            collapses += 1;
        }
        assert!(collapses > 20);

        for (v, members) in &absorbed {
            let q = &run.quadrics[v];
            let expected = members
                .iter()
                .fold(Quadric::zero(), |acc, m| acc + original[m].quadric);
            for (a, b) in q.quadric.coefficients().iter().zip(expected.coefficients().iter()) {
                assert_relative_eq!(*a, *b, epsilon = 1e-9, max_relative = 1e-4);
            }
            assert_eq!(q.is_border, members.iter().any(|m| original[m].is_border));
        }
    }

    #[test]
    fn test_out_of_sync_candidate_triggers_rebuild() {
        let mut hem = half_edge(&make_plane_grid(6));
        let simplifier = MeshSimplifier::new(SimplifyParams::default().with_events(true));
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.rebuild_queue();

        let mut corrupt = run.queue.poll().unwrap();
        std::mem::swap(&mut corrupt.from, &mut corrupt.to);
        corrupt.error = -1.0;
        run.queue.insert(corrupt);

        let mut criterion = FaceCountCriterion::new(20);
        criterion.init(run.mesh);
        let stats = run.process(&mut criterion);

        assert_eq!(stats.queue_rebuilds, 1);
        assert!(stats.events.contains(&SimplifyEvent::QueueRebuild));
        assert_eq!(stats.termination, TerminationReason::CriterionMet);
        hem.check_consistency().unwrap();
    }

    #[test]
    fn test_stale_candidate_is_skipped() {
        let mut hem = half_edge(&make_plane_grid(6));
        let simplifier = MeshSimplifier::default();
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.rebuild_queue();

        let mut stale = run.queue.poll().unwrap();
        run.quadrics.remove(&stale.to);
        stale.error = -1.0;
        run.queue.insert(stale);

        let stats = run.process(&mut FaceCountCriterion::new(30));
        assert!(stats.stale_entries >= 1);
        hem.check_consistency().unwrap();
    }

    #[test]
    fn test_reshape_splits_slivers() {
        let mesh = MeshData::from_triangles(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(10.0, 0.0, 0.0),
                Point3f::new(5.0, 0.1, 0.0),
                Point3f::new(5.0, -5.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 0, 3]],
        );
        let mut hem = half_edge(&mesh);
        let simplifier = MeshSimplifier::default();
        let mut run = SimplifyRun::new(&simplifier, &mut hem);
        run.reshape_triangles();

        assert_eq!(run.stats.splits, 1);
        assert_eq!(run.stats.reshape_passes, 1);
        assert_eq!(run.mesh.face_count(), 4);
        assert!(!run.queue.is_empty());
        run.mesh.check_consistency().unwrap();
    }

    #[test]
    fn test_excluded_edges_are_never_collapsed() {
        let mesh = make_plane_grid(4);
        let mut hem = half_edge(&mesh);
        let all_edges: Vec<EdgeKey> = hem
            .edge_ids()
            .map(|e| EdgeKey::new(hem.edge(e).from, hem.edge(e).to))
            .collect();

        let simplifier = MeshSimplifier::default().with_excluded_edges(all_edges);
        let stats = simplifier.simplify_mesh(&mut hem, &mut FaceCountCriterion::new(0));
        assert_eq!(stats.termination, TerminationReason::QueueExhausted);
        assert_eq!(stats.collapses, 0);
        assert_eq!(hem.face_count(), 18);
    }

    #[test]
    fn test_zero_requeues_still_terminates() {
        let mut hem = half_edge(&make_curved_surface(12));
        let simplifier = MeshSimplifier::new(SimplifyParams::default().with_max_requeues(0));
        let stats = simplifier.simplify_mesh(&mut hem, &mut FaceCountRatioCriterion::new(0.2).unwrap());
        assert!(stats.final_faces < stats.initial_faces);
        hem.check_consistency().unwrap();
    }

    #[test]
    fn test_midpoint_strategy() {
        let mut hem = half_edge(&make_curved_surface(10));
        let simplifier = MeshSimplifier::default().with_strategy(MidpointCollapseStrategy);
        let stats = simplifier.simplify_mesh(&mut hem, &mut FaceCountRatioCriterion::new(0.5).unwrap());
        assert_eq!(stats.termination, TerminationReason::CriterionMet);
        assert!(hem.face_count() <= stats.initial_faces / 2);
        hem.check_consistency().unwrap();
    }

    #[test]
    fn test_simplify_mesh_data() {
        let mut mesh = make_curved_surface(10);
        let stats = MeshSimplifier::default()
            .simplify(&mut mesh, &mut FaceCountRatioCriterion::new(0.5).unwrap())
            .unwrap();

        assert_eq!(mesh.face_count(), stats.final_faces);
        assert_eq!(mesh.vertex_count(), stats.final_vertices);
        assert!(mesh.triangles().flatten().all(|i| i < mesh.vertex_count()));
        assert_eq!(mesh.normals.as_ref().map(Vec::len), Some(mesh.vertex_count()));
        // no texture coordinates, so no tangents
        assert!(mesh.tangents.is_none());
    }

    #[test]
    fn test_simplify_rejects_invalid_input() {
        let mut lines = MeshData::from_lines(vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0)], vec![[0, 1]]);
        let before = lines.clone();
        let result = MeshSimplifier::default().simplify(&mut lines, &mut FaceCountCriterion::new(0));
        assert!(matches!(result, Err(Error::InvalidPrimitiveType { .. })));
        assert_eq!(lines.indices, before.indices);

        let mut empty = MeshData::default();
        let result = MeshSimplifier::default().simplify(&mut empty, &mut FaceCountCriterion::new(0));
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }
}
