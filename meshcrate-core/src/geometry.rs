//! Geometric primitives and queries: rays, bounding boxes, triangles and edges

use crate::error::{Error, Result};
use crate::mesh::{MeshData, PrimitiveType};
use crate::point::*;
use serde::{Deserialize, Serialize};

/// Tolerance used for fuzzy float comparisons
pub const FUZZY_EQ_F: f32 = 1e-5;

#[inline]
pub fn is_fuzzy_zero(value: f32) -> bool {
    value.abs() <= FUZZY_EQ_F
}

#[inline]
pub fn is_fuzzy_equal(a: f32, b: f32) -> bool {
    is_fuzzy_zero(a - b)
}

/// Area of the triangle (a, b, c)
pub fn tri_area(a: &Point3f, b: &Point3f, c: &Point3f) -> f32 {
    let ab = b - a;
    let ac = c - a;
    let ab_sqr = ab.norm_squared();
    let ac_sqr = ac.norm_squared();
    let ab_ac = ab.dot(&ac);
    0.5 * (ab_sqr * ac_sqr - ab_ac * ab_ac).max(0.0).sqrt()
}

/// Ratio of circumradius to twice the inradius.
///
/// Equals 1 for an equilateral triangle and grows without bound for
/// needle and cap shaped triangles. Degenerate triangles yield infinity.
pub fn tri_aspect_ratio(a: &Point3f, b: &Point3f, c: &Point3f) -> f32 {
    let la = (a - b).norm();
    let lb = (b - c).norm();
    let lc = (c - a).norm();
    let s = (la + lb + lc) / 2.0;
    let denom = 8.0 * (s - la) * (s - lb) * (s - lc);
    if denom <= 0.0 || !denom.is_finite() {
        return f32::INFINITY;
    }
    (la * lb * lc / denom).abs()
}

/// Barycentric weights of `pt` (projected onto the triangle plane) with
/// respect to the triangle (a, b, c).
pub fn barycentric_weights(pt: &Point3f, a: &Point3f, b: &Point3f, c: &Point3f) -> Vector3f {
    let n = (b - a).cross(&(c - a));
    let aa = n.norm_squared();
    if aa == 0.0 {
        return Vector3f::new(f32::NAN, f32::NAN, f32::NAN);
    }
    Vector3f::new(
        n.dot(&(c - b).cross(&(pt - b))) / aa,
        n.dot(&(a - c).cross(&(pt - c))) / aa,
        n.dot(&(b - a).cross(&(pt - a))) / aa,
    )
}

/// A half-infinite ray with normalized direction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ray {
    pub origin: Point3f,
    pub direction: Vector3f,
}

impl Ray {
    /// Create a ray; the direction is normalized if it has non-zero length.
    pub fn new(origin: Point3f, direction: Vector3f) -> Self {
        Self {
            origin,
            direction: direction.try_normalize(0.0).unwrap_or(direction),
        }
    }

    /// Ray starting at `origin` pointing towards `look_at`
    pub fn from_look_at(origin: Point3f, look_at: Point3f) -> Self {
        Self::new(origin, look_at - origin)
    }

    pub fn point_at(&self, t: f32) -> Point3f {
        self.origin + self.direction * t
    }

    /// Squared distance from `point` to the nearest point on the ray
    pub fn sqr_distance_to_point(&self, point: &Point3f) -> f32 {
        let w = point - self.origin;
        let t = w.dot(&self.direction);
        if t <= 0.0 {
            w.norm_squared()
        } else {
            (w - self.direction * t).norm_squared()
        }
    }

    pub fn distance_to_point(&self, point: &Point3f) -> f32 {
        self.sqr_distance_to_point(point).sqrt()
    }
}

/// Axis aligned bounding box. A freshly created box is empty.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min: Point3f,
    pub max: Point3f,
}

impl BoundingBox {
    pub fn new() -> Self {
        Self {
            min: Point3f::new(f32::INFINITY, f32::INFINITY, f32::INFINITY),
            max: Point3f::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        }
    }

    pub fn from_min_max(min: Point3f, max: Point3f) -> Self {
        let mut bounds = Self::new();
        bounds.add_point(&min);
        bounds.add_point(&max);
        bounds
    }

    pub fn is_empty(&self) -> bool {
        self.min.x > self.max.x || self.min.y > self.max.y || self.min.z > self.max.z
    }

    pub fn add_point(&mut self, p: &Point3f) {
        self.min = self.min.inf(p);
        self.max = self.max.sup(p);
    }

    pub fn add_box(&mut self, other: &BoundingBox) {
        if !other.is_empty() {
            self.add_point(&other.min);
            self.add_point(&other.max);
        }
    }

    pub fn size(&self) -> Vector3f {
        if self.is_empty() {
            Vector3f::zeros()
        } else {
            self.max - self.min
        }
    }

    pub fn center(&self) -> Point3f {
        nalgebra::center(&self.min, &self.max)
    }

    /// Index (0 = x, 1 = y, 2 = z) of the axis with the largest extent.
    /// Falls back to x unless y or z is strictly the largest.
    pub fn largest_axis(&self) -> usize {
        let sz = self.size();
        if sz.y > sz.x && sz.y > sz.z {
            1
        } else if sz.z > sz.x && sz.z > sz.y {
            2
        } else {
            0
        }
    }

    pub fn contains(&self, p: &Point3f) -> bool {
        (0..3).all(|i| p[i] >= self.min[i] && p[i] <= self.max[i])
    }

    /// Squared distance from `p` to the box, 0 if `p` lies inside.
    pub fn point_distance_sqr(&self, p: &Point3f) -> f32 {
        if self.is_empty() {
            return f32::INFINITY;
        }
        (0..3)
            .map(|i| {
                let d = (self.min[i] - p[i]).max(p[i] - self.max[i]).max(0.0);
                d * d
            })
            .sum()
    }

    /// Distance along `ray` at which it enters the box (0 if the origin is
    /// inside), or `None` if the ray misses.
    pub fn hit_distance(&self, ray: &Ray) -> Option<f32> {
        if self.is_empty() {
            return None;
        }
        let mut t_near = 0.0f32;
        let mut t_far = f32::INFINITY;
        for i in 0..3 {
            let o = ray.origin[i];
            let d = ray.direction[i];
            if d == 0.0 {
                if o < self.min[i] || o > self.max[i] {
                    return None;
                }
                continue;
            }
            let t0 = (self.min[i] - o) / d;
            let t1 = (self.max[i] - o) / d;
            t_near = t_near.max(t0.min(t1));
            t_far = t_far.min(t0.max(t1));
            if t_near > t_far {
                return None;
            }
        }
        Some(t_near)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::new()
    }
}

/// A triangle with precomputed edge vectors and bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub pt0: Point3f,
    pub pt1: Point3f,
    pub pt2: Point3f,
    e1: Vector3f,
    e2: Vector3f,
    bounds: BoundingBox,
}

impl Triangle {
    pub fn new(pt0: Point3f, pt1: Point3f, pt2: Point3f) -> Self {
        let mut bounds = BoundingBox::new();
        bounds.add_point(&pt0);
        bounds.add_point(&pt1);
        bounds.add_point(&pt2);
        Self {
            pt0,
            pt1,
            pt2,
            e1: pt1 - pt0,
            e2: pt2 - pt0,
            bounds,
        }
    }

    /// Collect all triangles of a triangle mesh
    pub fn from_mesh(mesh: &MeshData) -> Result<Vec<Triangle>> {
        Error::check_primitive_type(PrimitiveType::Triangles, mesh.primitive_type)?;
        mesh.check_indices()?;
        Ok(mesh
            .triangles()
            .map(|[a, b, c]| Triangle::new(mesh.vertices[a], mesh.vertices[b], mesh.vertices[c]))
            .collect())
    }

    pub fn min(&self) -> Point3f {
        self.bounds.min
    }

    pub fn max(&self) -> Point3f {
        self.bounds.max
    }

    pub fn bounds(&self) -> &BoundingBox {
        &self.bounds
    }

    pub fn area(&self) -> f32 {
        0.5 * self.e1.cross(&self.e2).norm()
    }

    /// Unit face normal, zero for degenerate triangles
    pub fn normal(&self) -> Vector3f {
        self.e1
            .cross(&self.e2)
            .try_normalize(0.0)
            .unwrap_or_else(Vector3f::zeros)
    }

    pub fn aspect_ratio(&self) -> f32 {
        tri_aspect_ratio(&self.pt0, &self.pt1, &self.pt2)
    }

    /// Distance along `ray` to the intersection with this triangle
    /// (Möller–Trumbore), `None` if the ray misses.
    pub fn hit_distance(&self, ray: &Ray) -> Option<f32> {
        let p = ray.direction.cross(&self.e2);
        let det = p.dot(&self.e1);
        if det.abs() < f32::EPSILON {
            return None;
        }
        let f = 1.0 / det;
        let s = ray.origin - self.pt0;
        let q = s.cross(&self.e1);

        let t = f * q.dot(&self.e2);
        let u = f * p.dot(&s);
        let v = f * q.dot(&ray.direction);

        if u >= 0.0 && v >= 0.0 && u + v <= 1.0 && t >= 0.0 {
            Some(t)
        } else {
            None
        }
    }
}

/// A line segment with precomputed direction, length and bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub pt0: Point3f,
    pub pt1: Point3f,
    dir: Vector3f,
    length: f32,
    bounds: BoundingBox,
}

impl Edge {
    pub fn new(pt0: Point3f, pt1: Point3f) -> Self {
        let d = pt1 - pt0;
        Self {
            pt0,
            pt1,
            dir: d.try_normalize(0.0).unwrap_or_else(Vector3f::zeros),
            length: d.norm(),
            bounds: BoundingBox::from_min_max(pt0, pt1),
        }
    }

    /// Collect all segments of a line mesh
    pub fn from_mesh(mesh: &MeshData) -> Result<Vec<Edge>> {
        Error::check_primitive_type(PrimitiveType::Lines, mesh.primitive_type)?;
        mesh.check_indices()?;
        Ok(mesh
            .lines()
            .map(|[a, b]| Edge::new(mesh.vertices[a], mesh.vertices[b]))
            .collect())
    }

    pub fn min(&self) -> Point3f {
        self.bounds.min
    }

    pub fn max(&self) -> Point3f {
        self.bounds.max
    }

    pub fn length(&self) -> f32 {
        self.length
    }

    pub fn direction(&self) -> Vector3f {
        self.dir
    }

    /// Point on this edge closest to `ray`
    pub fn nearest_point_to_ray(&self, ray: &Ray) -> Point3f {
        let dot = self.dir.dot(&ray.direction);
        let n = 1.0 - dot * dot;
        if is_fuzzy_zero(n) {
            // edge and ray are parallel
            return if (self.pt0 - ray.origin).norm_squared() < (self.pt1 - ray.origin).norm_squared() {
                self.pt0
            } else {
                self.pt1
            };
        }

        let w = ray.origin - self.pt0;
        let a = w.dot(&self.dir);
        let b = w.dot(&ray.direction);
        let l = (a - b * dot) / n;
        if l > 0.0 {
            self.pt0 + self.dir * l.min(self.length)
        } else {
            self.pt0
        }
    }

    pub fn ray_distance_sqr(&self, ray: &Ray) -> f32 {
        ray.sqr_distance_to_point(&self.nearest_point_to_ray(ray))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tri_area() {
        let a = Point3f::new(0.0, 0.0, 0.0);
        let b = Point3f::new(2.0, 0.0, 0.0);
        let c = Point3f::new(0.0, 2.0, 0.0);
        assert_relative_eq!(tri_area(&a, &b, &c), 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_aspect_ratio() {
        let a = Point3f::new(0.0, 0.0, 0.0);
        let b = Point3f::new(1.0, 0.0, 0.0);
        let c = Point3f::new(0.5, 3.0f32.sqrt() / 2.0, 0.0);
        assert_relative_eq!(tri_aspect_ratio(&a, &b, &c), 1.0, epsilon = 1e-4);

        let needle = Point3f::new(0.5, 0.001, 0.0);
        assert!(tri_aspect_ratio(&a, &b, &needle) > 50.0);

        let collinear = Point3f::new(2.0, 0.0, 0.0);
        assert_eq!(tri_aspect_ratio(&a, &b, &collinear), f32::INFINITY);
    }

    #[test]
    fn test_barycentric_weights() {
        let a = Point3f::new(0.0, 0.0, 0.0);
        let b = Point3f::new(1.0, 0.0, 0.0);
        let c = Point3f::new(0.0, 1.0, 0.0);
        let w = barycentric_weights(&Point3f::new(0.25, 0.25, 0.0), &a, &b, &c);
        assert_relative_eq!(w.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(w.y, 0.25, epsilon = 1e-6);
        assert_relative_eq!(w.z, 0.25, epsilon = 1e-6);
    }

    #[test]
    fn test_ray_distance() {
        let ray = Ray::new(Point3f::origin(), Vector3f::new(2.0, 0.0, 0.0));
        assert_relative_eq!(ray.direction.norm(), 1.0);
        assert_relative_eq!(ray.distance_to_point(&Point3f::new(5.0, 3.0, 0.0)), 3.0);
        // behind the origin the distance is measured to the origin
        assert_relative_eq!(ray.distance_to_point(&Point3f::new(-4.0, 3.0, 0.0)), 5.0);
    }

    #[test]
    fn test_bounding_box() {
        let mut bounds = BoundingBox::new();
        assert!(bounds.is_empty());
        assert_eq!(bounds.size(), Vector3f::zeros());

        bounds.add_point(&Point3f::new(0.0, 0.0, 0.0));
        bounds.add_point(&Point3f::new(1.0, 4.0, 2.0));
        assert!(!bounds.is_empty());
        assert_eq!(bounds.largest_axis(), 1);
        assert!(bounds.contains(&Point3f::new(0.5, 1.0, 1.0)));
        assert_eq!(bounds.point_distance_sqr(&Point3f::new(0.5, 1.0, 1.0)), 0.0);
        assert_relative_eq!(bounds.point_distance_sqr(&Point3f::new(2.0, 5.0, 1.0)), 2.0);
    }

    #[test]
    fn test_box_hit_distance() {
        let bounds = BoundingBox::from_min_max(Point3f::new(1.0, -1.0, -1.0), Point3f::new(2.0, 1.0, 1.0));
        let ray = Ray::new(Point3f::origin(), Vector3f::x());
        assert_relative_eq!(bounds.hit_distance(&ray).unwrap(), 1.0);

        let miss = Ray::new(Point3f::origin(), Vector3f::y());
        assert!(bounds.hit_distance(&miss).is_none());

        let away = Ray::new(Point3f::origin(), -Vector3f::x());
        assert!(bounds.hit_distance(&away).is_none());
    }

    #[test]
    fn test_triangle_hit() {
        let tri = Triangle::new(
            Point3f::new(-1.0, -1.0, 3.0),
            Point3f::new(1.0, -1.0, 3.0),
            Point3f::new(0.0, 1.0, 3.0),
        );
        let ray = Ray::new(Point3f::origin(), Vector3f::z());
        assert_relative_eq!(tri.hit_distance(&ray).unwrap(), 3.0, epsilon = 1e-6);
        assert!(tri.hit_distance(&Ray::new(Point3f::new(5.0, 0.0, 0.0), Vector3f::z())).is_none());
        assert_relative_eq!(tri.normal().z.abs(), 1.0);
    }

    #[test]
    fn test_edge_nearest_point() {
        let edge = Edge::new(Point3f::new(0.0, 0.0, 0.0), Point3f::new(4.0, 0.0, 0.0));
        let ray = Ray::new(Point3f::new(1.0, 2.0, 0.0), Vector3f::new(0.0, -1.0, 0.0));
        let p = edge.nearest_point_to_ray(&ray);
        assert_relative_eq!(p.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(edge.ray_distance_sqr(&ray), 0.0, epsilon = 1e-6);

        // parallel ray picks the endpoint closer to the origin
        let parallel = Ray::new(Point3f::new(5.0, 1.0, 0.0), Vector3f::x());
        assert_eq!(edge.nearest_point_to_ray(&parallel), edge.pt1);
    }

    #[test]
    fn test_from_mesh_checks_primitive_type() {
        let tri_mesh = MeshData::from_triangles(
            vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0), Point3f::new(0.0, 1.0, 0.0)],
            vec![[0, 1, 2]],
        );
        assert_eq!(Triangle::from_mesh(&tri_mesh).unwrap().len(), 1);
        assert!(matches!(
            Edge::from_mesh(&tri_mesh),
            Err(Error::InvalidPrimitiveType { .. })
        ));

        let line_mesh = MeshData::from_lines(tri_mesh.vertices.clone(), vec![[0, 1], [1, 2]]);
        assert_eq!(Edge::from_mesh(&line_mesh).unwrap().len(), 2);
        assert!(Triangle::from_mesh(&line_mesh).is_err());
    }

    #[test]
    fn test_triangle_from_mesh_rejects_bad_index() {
        let mesh = MeshData::from_triangles(vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0)], vec![[0, 1, 5]]);
        match Triangle::from_mesh(&mesh) {
            Err(Error::InvalidData(msg)) => assert!(msg.contains("out of range")),
            other => panic!("expected InvalidData, got {other:?}"),
        }
    }

    #[test]
    fn test_edge_from_mesh_rejects_bad_index() {
        let mesh = MeshData::from_lines(vec![Point3f::origin(), Point3f::new(1.0, 0.0, 0.0)], vec![[0, 1], [1, 2]]);
        assert!(matches!(Edge::from_mesh(&mesh), Err(Error::InvalidData(_))));
    }
}
