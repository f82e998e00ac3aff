//! Collapse strategies decide where the merged vertex of an edge collapse
//! goes and what error the collapse introduces.

use crate::quadric::ErrorQuadric;
use meshcrate_core::{to_f32, to_f64, HalfEdgeMesh, Point3d, Point3f};

/// Position of the merged vertex and the resulting quadric error
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CollapseTarget {
    pub position: Point3f,
    pub error: f64,
}

pub trait CollapseStrategy {
    fn compute_collapse(&self, mesh: &HalfEdgeMesh, q1: &ErrorQuadric, q2: &ErrorQuadric) -> CollapseTarget;
}

/// Places the merged vertex at the minimum of the combined quadric.
///
/// When the quadric system is singular (all planes parallel, or no planes
/// at all) the best of the edge midpoint and the two endpoints is used,
/// preferring them in that order on ties.
#[derive(Debug, Clone, Copy, Default)]
pub struct QuadricCollapseStrategy;

impl CollapseStrategy for QuadricCollapseStrategy {
    fn compute_collapse(&self, mesh: &HalfEdgeMesh, q1: &ErrorQuadric, q2: &ErrorQuadric) -> CollapseTarget {
        let q = q1.quadric + q2.quadric;

        let (position, error) = match q.optimal_position() {
            Some(p) => (p, q.evaluate(&p)),
            None => {
                let p1 = to_f64(&mesh.position(q1.vertex));
                let p2 = to_f64(&mesh.position(q2.vertex));
                let mut best = (nalgebra::center(&p1, &p2), f64::INFINITY);
                best.1 = q.evaluate(&best.0);
                for p in [p1, p2] {
                    let e = q.evaluate(&p);
                    if e < best.1 {
                        best = (p, e);
                    }
                }
                best
            }
        };

        CollapseTarget {
            position: to_f32(&position),
            error: error.max(0.0),
        }
    }
}

/// Always collapses to the edge midpoint
#[derive(Debug, Clone, Copy, Default)]
pub struct MidpointCollapseStrategy;

impl CollapseStrategy for MidpointCollapseStrategy {
    fn compute_collapse(&self, mesh: &HalfEdgeMesh, q1: &ErrorQuadric, q2: &ErrorQuadric) -> CollapseTarget {
        let mid: Point3d = nalgebra::center(&to_f64(&mesh.position(q1.vertex)), &to_f64(&mesh.position(q2.vertex)));
        let error = (q1.quadric + q2.quadric).evaluate(&mid);
        CollapseTarget {
            position: to_f32(&mid),
            error: error.max(0.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadric::Quadric;
    use approx::assert_relative_eq;
    use meshcrate_core::{MeshData, Vector3d};

    fn make_strip() -> HalfEdgeMesh {
        let mesh = MeshData::from_triangles(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
                Point3f::new(2.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        );
        HalfEdgeMesh::from_mesh(&mesh).unwrap()
    }

    fn quadric_for(vertex: usize, quadric: Quadric) -> ErrorQuadric {
        ErrorQuadric {
            quadric,
            vertex,
            is_border: false,
        }
    }

    #[test]
    fn test_singular_falls_back_to_midpoint() {
        let mesh = make_strip();
        let q1 = ErrorQuadric::new(&mesh, 0, false);
        let q2 = ErrorQuadric::new(&mesh, 1, false);

        // coplanar faces: singular, midpoint wins the tie
        let target = QuadricCollapseStrategy.compute_collapse(&mesh, &q1, &q2);
        assert_eq!(target.position, Point3f::new(1.0, 0.0, 0.0));
        assert_relative_eq!(target.error, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_singular_prefers_lowest_error_endpoint() {
        let mesh = make_strip();
        // planes x = 2 only: vertex 1 sits on it, midpoint does not
        let plane = Quadric::from_plane(&Vector3d::x(), -2.0, 1.0);
        let q1 = quadric_for(0, plane);
        let q2 = quadric_for(1, Quadric::zero());

        let target = QuadricCollapseStrategy.compute_collapse(&mesh, &q1, &q2);
        assert_eq!(target.position, Point3f::new(2.0, 0.0, 0.0));
        assert_relative_eq!(target.error, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_regular_solve() {
        let mesh = make_strip();
        let corner = Quadric::from_plane(&Vector3d::x(), -0.5, 1.0)
            + Quadric::from_plane(&Vector3d::y(), -0.25, 1.0)
            + Quadric::from_plane(&Vector3d::z(), 0.0, 1.0);
        let q1 = quadric_for(0, corner);
        let q2 = quadric_for(1, Quadric::zero());

        let target = QuadricCollapseStrategy.compute_collapse(&mesh, &q1, &q2);
        assert_relative_eq!(target.position.x, 0.5, epsilon = 1e-6);
        assert_relative_eq!(target.position.y, 0.25, epsilon = 1e-6);
        assert!(target.error >= 0.0);
    }

    #[test]
    fn test_midpoint_strategy() {
        let mesh = make_strip();
        let q1 = quadric_for(0, Quadric::from_plane(&Vector3d::x(), 0.0, 1.0));
        let q2 = quadric_for(1, Quadric::zero());
        let target = MidpointCollapseStrategy.compute_collapse(&mesh, &q1, &q2);
        assert_eq!(target.position, Point3f::new(1.0, 0.0, 0.0));
        assert_relative_eq!(target.error, 1.0, epsilon = 1e-12);
    }
}
