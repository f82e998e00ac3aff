//! Bounding-volume k-d tree
//!
//! Every node covers a contiguous range of a shared permutation of the item
//! indices together with the bounding box of the full extent of those items.
//! Inner nodes split their range at the median of the item centers along
//! the axis of largest extent, so the tree is balanced by construction.

use crate::adapter::{EdgeAdapter, ItemAdapter, PointAdapter, TriangleAdapter};
use crate::traverser::{InRadiusTraverser, KNearestTraverser, KdTreeTraverser, RayHitTraverser, TraversalOrder};
use meshcrate_core::{BoundingBox, Edge, Error, MeshData, Point3f, Ray, Result, Triangle};
use std::cmp::Ordering;
use std::ops::Range;
use tracing::debug;

/// Default leaf size for point trees
pub const DEFAULT_POINT_BUCKET_SIZE: usize = 20;

/// Default leaf size for trees over triangles and edges
pub const DEFAULT_SHAPE_BUCKET_SIZE: usize = 10;

/// Ranges larger than this are narrowed by recursing on a sample first
const FLOYD_RIVEST_SAMPLE_THRESHOLD: isize = 600;

/// A node of a [`KdTree`]
#[derive(Debug, Clone)]
pub struct KdNode {
    /// Range into the tree's item permutation
    pub range: Range<usize>,
    pub bounds: BoundingBox,
    pub depth: usize,
    children: Option<(usize, usize)>,
}

impl KdNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// K-d tree over arbitrary items described by an [`ItemAdapter`].
///
/// The tree is immutable once built. Items keep their original order;
/// traversers receive item indices into [`KdTree::items`].
#[derive(Debug, Clone)]
pub struct KdTree<T, A> {
    items: Vec<T>,
    adapter: A,
    centers: Vec<Point3f>,
    order: Vec<usize>,
    nodes: Vec<KdNode>,
    bucket_size: usize,
}

impl<T, A: ItemAdapter<T>> KdTree<T, A> {
    /// Build a tree whose leaves hold at most `bucket_size` items.
    pub fn new(items: Vec<T>, adapter: A, bucket_size: usize) -> Result<Self> {
        if bucket_size == 0 {
            return Err(Error::InvalidArgument("bucket size must be at least 1".to_string()));
        }

        let centers = items.iter().map(|it| adapter.center(it)).collect();
        let order = (0..items.len()).collect();
        let mut tree = Self {
            items,
            adapter,
            centers,
            order,
            nodes: Vec::new(),
            bucket_size,
        };
        tree.build_node(0..tree.items.len(), 0);

        debug!(
            items = tree.items.len(),
            nodes = tree.nodes.len(),
            bucket_size,
            "built k-d tree"
        );
        Ok(tree)
    }

    fn build_node(&mut self, range: Range<usize>, depth: usize) -> usize {
        let mut bounds = BoundingBox::new();
        for &i in &self.order[range.clone()] {
            bounds.add_point(&self.adapter.min(&self.items[i]));
            bounds.add_point(&self.adapter.max(&self.items[i]));
        }

        let id = self.nodes.len();
        self.nodes.push(KdNode {
            range: range.clone(),
            bounds,
            depth,
            children: None,
        });

        if range.len() > self.bucket_size {
            let axis = bounds.largest_axis();
            let (first, last) = (range.start, range.end - 1);
            let k = first + (last - first) / 2;

            let centers = &self.centers;
            floyd_rivest_select(&mut self.order[first..=last], k - first, &|&i: &usize| {
                centers[i][axis]
            });

            let left = self.build_node(first..k + 1, depth + 1);
            let right = self.build_node(k + 1..range.end, depth + 1);
            self.nodes[id].children = Some((left, right));
        }
        id
    }

    /// Items in their original order
    pub fn items(&self) -> &[T] {
        &self.items
    }

    pub fn item(&self, index: usize) -> &T {
        &self.items[index]
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Cached center of the item at `index`
    pub fn center(&self, index: usize) -> &Point3f {
        &self.centers[index]
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn bucket_size(&self) -> usize {
        self.bucket_size
    }

    pub fn root(&self) -> &KdNode {
        &self.nodes[0]
    }

    pub fn nodes(&self) -> &[KdNode] {
        &self.nodes
    }

    /// Child nodes of an inner node
    pub fn children(&self, node: &KdNode) -> Option<(&KdNode, &KdNode)> {
        node.children.map(|(l, r)| (&self.nodes[l], &self.nodes[r]))
    }

    /// Item indices covered by `node`
    pub fn node_items(&self, node: &KdNode) -> &[usize] {
        &self.order[node.range.clone()]
    }

    /// Maximum depth of any leaf
    pub fn depth(&self) -> usize {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }

    /// Walk the tree with `traverser` steering the descent.
    pub fn traverse<V>(&self, traverser: &mut V)
    where
        V: KdTreeTraverser<T, A> + ?Sized,
    {
        traverser.on_start(self);
        self.traverse_node(0, traverser);
    }

    fn traverse_node<V>(&self, id: usize, traverser: &mut V)
    where
        V: KdTreeTraverser<T, A> + ?Sized,
    {
        let node = &self.nodes[id];
        let Some((l, r)) = node.children else {
            traverser.traverse_leaf(self, node);
            return;
        };
        match traverser.traversal_order(self, &self.nodes[l], &self.nodes[r]) {
            TraversalOrder::None => {}
            TraversalOrder::LeftOnly => self.traverse_node(l, traverser),
            TraversalOrder::RightOnly => self.traverse_node(r, traverser),
            TraversalOrder::RightFirst => {
                self.traverse_node(r, traverser);
                self.traverse_node(l, traverser);
            }
            TraversalOrder::LeftFirst | TraversalOrder::NoPreference => {
                self.traverse_node(l, traverser);
                self.traverse_node(r, traverser);
            }
        }
    }

    /// All items whose center lies within `radius` of `center`, in
    /// traversal order.
    pub fn radius_query(&self, center: &Point3f, radius: f32) -> Vec<&T> {
        let mut traverser = InRadiusTraverser::new(*center, radius);
        self.traverse(&mut traverser);
        traverser.result().iter().map(|&i| &self.items[i]).collect()
    }

    /// Indices and center distances of the `k` items closest to `query`,
    /// nearest first.
    pub fn k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        let mut traverser = KNearestTraverser::new(*query, k);
        self.traverse(&mut traverser);
        traverser.into_sorted()
    }
}

impl<A: ItemAdapter<Triangle>> KdTree<Triangle, A> {
    /// Index of the first triangle hit by `ray` and the hit distance.
    pub fn ray_hit(&self, ray: &Ray) -> Option<(usize, f32)> {
        let mut traverser = RayHitTraverser::new(*ray);
        self.traverse(&mut traverser);
        traverser.nearest()
    }
}

/// Reorder `items` so that the element at `k` is the one that would be
/// there after sorting by `key`, with no larger key before it and no
/// smaller key after it (Floyd–Rivest selection).
pub fn floyd_rivest_select<T, F>(items: &mut [T], k: usize, key: &F)
where
    F: Fn(&T) -> f32,
{
    if items.len() < 2 || k >= items.len() {
        return;
    }
    select_range(items, 0, items.len() as isize - 1, k as isize, key);
}

fn select_range<T, F>(items: &mut [T], mut left: isize, mut right: isize, k: isize, key: &F)
where
    F: Fn(&T) -> f32,
{
    let cmp = |item: &T, pivot: f32| key(item).total_cmp(&pivot);
    let at = |i: isize| i as usize;

    while right > left {
        if right - left > FLOYD_RIVEST_SAMPLE_THRESHOLD {
            let n = (right - left + 1) as f64;
            let i = (k - left + 1) as f64;
            let z = n.ln();
            let s = 0.5 * (2.0 * z / 3.0).exp();
            let sign = match i.total_cmp(&(n / 2.0)) {
                Ordering::Less => -1.0,
                Ordering::Equal => 0.0,
                Ordering::Greater => 1.0,
            };
            let sd = 0.5 * (z * s * (n - s) / n).sqrt() * sign;
            let new_left = left.max((k as f64 - i * s / n + sd) as isize);
            let new_right = right.min((k as f64 + (n - i) * s / n + sd) as isize);
            select_range(items, new_left, new_right, k, key);
        }

        let pivot = key(&items[at(k)]);
        let mut i = left;
        let mut j = right;
        items.swap(at(left), at(k));
        if cmp(&items[at(right)], pivot) == Ordering::Greater {
            items.swap(at(right), at(left));
        }
        while i < j {
            items.swap(at(i), at(j));
            i += 1;
            j -= 1;
            while cmp(&items[at(i)], pivot) == Ordering::Less {
                i += 1;
            }
            while cmp(&items[at(j)], pivot) == Ordering::Greater {
                j -= 1;
            }
        }
        if cmp(&items[at(left)], pivot) == Ordering::Equal {
            items.swap(at(left), at(j));
        } else {
            j += 1;
            items.swap(at(j), at(right));
        }
        if j <= k {
            left = j + 1;
        }
        if k <= j {
            right = j - 1;
        }
    }
}

/// Build a tree over points
pub fn point_kd_tree(points: Vec<Point3f>, bucket_size: usize) -> Result<KdTree<Point3f, PointAdapter>> {
    KdTree::new(points, PointAdapter, bucket_size)
}

/// Build a tree over triangles
pub fn triangle_kd_tree(triangles: Vec<Triangle>, bucket_size: usize) -> Result<KdTree<Triangle, TriangleAdapter>> {
    KdTree::new(triangles, TriangleAdapter, bucket_size)
}

/// Build a triangle tree from a mesh with [`PrimitiveType::Triangles`](meshcrate_core::PrimitiveType)
pub fn triangle_kd_tree_from_mesh(mesh: &MeshData, bucket_size: usize) -> Result<KdTree<Triangle, TriangleAdapter>> {
    triangle_kd_tree(Triangle::from_mesh(mesh)?, bucket_size)
}

/// Build an edge tree from a mesh with [`PrimitiveType::Lines`](meshcrate_core::PrimitiveType)
pub fn edge_kd_tree_from_mesh(mesh: &MeshData, bucket_size: usize) -> Result<KdTree<Edge, EdgeAdapter>> {
    KdTree::new(Edge::from_mesh(mesh)?, EdgeAdapter, bucket_size)
}
