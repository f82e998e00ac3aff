//! Tree traversers
//!
//! A traverser is asked at every inner node which children to descend into
//! and in what order, and sees the items of every leaf it reaches.

use crate::adapter::ItemAdapter;
use crate::kd_tree::{KdNode, KdTree};
use meshcrate_core::{Point3f, Ray, Triangle};
use priority_queue::PriorityQueue;
use std::cmp::Ordering;

/// Which children of an inner node to visit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalOrder {
    NoPreference,
    LeftFirst,
    LeftOnly,
    RightFirst,
    RightOnly,
    None,
}

pub trait KdTreeTraverser<T, A: ItemAdapter<T>> {
    fn on_start(&mut self, _tree: &KdTree<T, A>) {}

    fn traversal_order(&mut self, _tree: &KdTree<T, A>, _left: &KdNode, _right: &KdNode) -> TraversalOrder {
        TraversalOrder::NoPreference
    }

    fn traverse_leaf(&mut self, tree: &KdTree<T, A>, leaf: &KdNode);
}

/// Collects the items whose center is within a radius of a point.
#[derive(Debug, Clone)]
pub struct InRadiusTraverser {
    center: Point3f,
    radius: f32,
    radius_sqr: f32,
    result: Vec<usize>,
}

impl InRadiusTraverser {
    pub fn new(center: Point3f, radius: f32) -> Self {
        Self {
            center,
            radius,
            radius_sqr: radius * radius,
            result: Vec::new(),
        }
    }

    pub fn reset(&mut self, center: Point3f, radius: f32) -> &mut Self {
        self.center = center;
        self.radius = radius;
        self.radius_sqr = radius * radius;
        self.result.clear();
        self
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Indices of the matching items in visiting order
    pub fn result(&self) -> &[usize] {
        &self.result
    }

    pub fn into_result(self) -> Vec<usize> {
        self.result
    }
}

impl<T, A: ItemAdapter<T>> KdTreeTraverser<T, A> for InRadiusTraverser {
    fn on_start(&mut self, _tree: &KdTree<T, A>) {
        self.result.clear();
    }

    fn traversal_order(&mut self, _tree: &KdTree<T, A>, left: &KdNode, right: &KdNode) -> TraversalOrder {
        let d_left = left.bounds.point_distance_sqr(&self.center);
        let d_right = right.bounds.point_distance_sqr(&self.center);

        match (d_left > self.radius_sqr, d_right > self.radius_sqr) {
            (true, true) => TraversalOrder::None,
            (true, false) => TraversalOrder::RightOnly,
            (false, true) => TraversalOrder::LeftOnly,
            (false, false) => TraversalOrder::NoPreference,
        }
    }

    fn traverse_leaf(&mut self, tree: &KdTree<T, A>, leaf: &KdNode) {
        for &i in tree.node_items(leaf) {
            if (tree.center(i) - self.center).norm_squared() <= self.radius_sqr {
                self.result.push(i);
            }
        }
    }
}

/// Squared distance with a total order so it can serve as a heap priority
#[derive(Debug, Clone, Copy)]
struct SqrDistance(f32);

impl PartialEq for SqrDistance {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SqrDistance {}

impl PartialOrd for SqrDistance {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SqrDistance {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Finds the `k` items whose centers are closest to a query point.
#[derive(Debug, Clone)]
pub struct KNearestTraverser {
    query: Point3f,
    k: usize,
    // max-heap, the current k-th nearest sits on top
    heap: PriorityQueue<usize, SqrDistance>,
}

impl KNearestTraverser {
    pub fn new(query: Point3f, k: usize) -> Self {
        Self {
            query,
            k,
            heap: PriorityQueue::with_capacity(k + 1),
        }
    }

    /// Squared distance an item must beat to enter the result
    fn worst_sqr(&self) -> f32 {
        if self.heap.len() < self.k {
            f32::INFINITY
        } else {
            self.heap.peek().map_or(f32::INFINITY, |(_, d)| d.0)
        }
    }

    /// Item indices and distances, nearest first
    pub fn into_sorted(self) -> Vec<(usize, f32)> {
        let mut result: Vec<(usize, f32)> = self.heap.into_iter().map(|(i, d)| (i, d.0.sqrt())).collect();
        result.sort_by(|a, b| a.1.total_cmp(&b.1));
        result
    }
}

impl<T, A: ItemAdapter<T>> KdTreeTraverser<T, A> for KNearestTraverser {
    fn on_start(&mut self, _tree: &KdTree<T, A>) {
        self.heap.clear();
    }

    fn traversal_order(&mut self, _tree: &KdTree<T, A>, left: &KdNode, right: &KdNode) -> TraversalOrder {
        if self.k == 0 {
            return TraversalOrder::None;
        }
        let worst = self.worst_sqr();
        let d_left = left.bounds.point_distance_sqr(&self.query);
        let d_right = right.bounds.point_distance_sqr(&self.query);

        match (d_left > worst, d_right > worst) {
            (true, true) => TraversalOrder::None,
            (true, false) => TraversalOrder::RightOnly,
            (false, true) => TraversalOrder::LeftOnly,
            (false, false) if d_left <= d_right => TraversalOrder::LeftFirst,
            (false, false) => TraversalOrder::RightFirst,
        }
    }

    fn traverse_leaf(&mut self, tree: &KdTree<T, A>, leaf: &KdNode) {
        if self.k == 0 {
            return;
        }
        for &i in tree.node_items(leaf) {
            let d = (tree.center(i) - self.query).norm_squared();
            if self.heap.len() < self.k {
                self.heap.push(i, SqrDistance(d));
            } else if d < self.worst_sqr() {
                self.heap.push(i, SqrDistance(d));
                self.heap.pop();
            }
        }
    }
}

/// Finds the first triangle hit by a ray.
#[derive(Debug, Clone)]
pub struct RayHitTraverser {
    ray: Ray,
    nearest: Option<(usize, f32)>,
}

impl RayHitTraverser {
    pub fn new(ray: Ray) -> Self {
        Self { ray, nearest: None }
    }

    /// Index of the hit triangle and the distance along the ray
    pub fn nearest(&self) -> Option<(usize, f32)> {
        self.nearest
    }

    fn best_distance(&self) -> f32 {
        self.nearest.map_or(f32::INFINITY, |(_, d)| d)
    }
}

impl<A: ItemAdapter<Triangle>> KdTreeTraverser<Triangle, A> for RayHitTraverser {
    fn on_start(&mut self, _tree: &KdTree<Triangle, A>) {
        self.nearest = None;
    }

    fn traversal_order(&mut self, _tree: &KdTree<Triangle, A>, left: &KdNode, right: &KdNode) -> TraversalOrder {
        let best = self.best_distance();
        let d_left = left.bounds.hit_distance(&self.ray).filter(|&d| d <= best);
        let d_right = right.bounds.hit_distance(&self.ray).filter(|&d| d <= best);

        match (d_left, d_right) {
            (None, None) => TraversalOrder::None,
            (Some(_), None) => TraversalOrder::LeftOnly,
            (None, Some(_)) => TraversalOrder::RightOnly,
            (Some(l), Some(r)) if l <= r => TraversalOrder::LeftFirst,
            (Some(_), Some(_)) => TraversalOrder::RightFirst,
        }
    }

    fn traverse_leaf(&mut self, tree: &KdTree<Triangle, A>, leaf: &KdNode) {
        for &i in tree.node_items(leaf) {
            if let Some(d) = tree.item(i).hit_distance(&self.ray) {
                if d < self.best_distance() {
                    self.nearest = Some((i, d));
                }
            }
        }
    }
}
