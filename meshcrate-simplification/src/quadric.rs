//! Error quadrics
//!
//! A quadric measures the sum of squared distances of a point to a set of
//! planes. It is the symmetric 4x4 matrix `Σ w [n; d][n; d]ᵀ`, stored as its
//! 10 distinct coefficients in double precision.

use meshcrate_core::{to_f64, HalfEdgeMesh, Matrix3, Point3d, Vector3d, VertexId};
use serde::{Deserialize, Serialize};
use std::ops::{Add, AddAssign};

/// Systems whose determinant, relative to the cubed mean diagonal, falls
/// below this are treated as singular. The ratio does not change when all
/// plane weights are scaled, so area weighted quadrics of small meshes are
/// judged like those of large ones.
pub const SINGULAR_DET_THRESHOLD: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Quadric {
    a2: f64,
    ab: f64,
    ac: f64,
    ad: f64,
    b2: f64,
    bc: f64,
    bd: f64,
    c2: f64,
    cd: f64,
    d2: f64,
}

impl Quadric {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Quadric of the plane `n·p + d = 0` scaled by `weight`
    pub fn from_plane(n: &Vector3d, d: f64, weight: f64) -> Self {
        let (a, b, c) = (n.x, n.y, n.z);
        Self {
            a2: weight * a * a,
            ab: weight * a * b,
            ac: weight * a * c,
            ad: weight * a * d,
            b2: weight * b * b,
            bc: weight * b * c,
            bd: weight * b * d,
            c2: weight * c * c,
            cd: weight * c * d,
            d2: weight * d * d,
        }
    }

    pub fn coefficients(&self) -> [f64; 10] {
        [
            self.a2, self.ab, self.ac, self.ad, self.b2, self.bc, self.bd, self.c2, self.cd, self.d2,
        ]
    }

    /// Upper left 3x3 block
    pub fn matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.a2, self.ab, self.ac,
            self.ab, self.b2, self.bc,
            self.ac, self.bc, self.c2,
        )
    }

    pub fn linear(&self) -> Vector3d {
        Vector3d::new(self.ad, self.bd, self.cd)
    }

    /// Weighted sum of squared plane distances at `p`
    pub fn evaluate(&self, p: &Point3d) -> f64 {
        let (x, y, z) = (p.x, p.y, p.z);
        x * x * self.a2
            + 2.0 * x * y * self.ab
            + 2.0 * x * z * self.ac
            + 2.0 * x * self.ad
            + y * y * self.b2
            + 2.0 * y * z * self.bc
            + 2.0 * y * self.bd
            + z * z * self.c2
            + 2.0 * z * self.cd
            + self.d2
    }

    /// Point minimizing the quadric, `None` if the system is singular
    pub fn optimal_position(&self) -> Option<Point3d> {
        let m = self.matrix();
        let scale = m.trace() / 3.0;
        if !(scale > 0.0) || (m.determinant() / (scale * scale * scale)).abs() < SINGULAR_DET_THRESHOLD {
            return None;
        }
        m.try_inverse().map(|inv| Point3d::from(-(inv * self.linear())))
    }
}

impl AddAssign for Quadric {
    fn add_assign(&mut self, rhs: Self) {
        self.a2 += rhs.a2;
        self.ab += rhs.ab;
        self.ac += rhs.ac;
        self.ad += rhs.ad;
        self.b2 += rhs.b2;
        self.bc += rhs.bc;
        self.bd += rhs.bd;
        self.c2 += rhs.c2;
        self.cd += rhs.cd;
        self.d2 += rhs.d2;
    }
}

impl Add for Quadric {
    type Output = Quadric;

    fn add(mut self, rhs: Self) -> Quadric {
        self += rhs;
        self
    }
}

/// Accumulated quadric of a (possibly merged) mesh vertex
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorQuadric {
    pub quadric: Quadric,
    pub vertex: VertexId,
    pub is_border: bool,
}

impl ErrorQuadric {
    /// Sum of the plane quadrics of all faces around `vertex`. Degenerate
    /// faces have no plane and contribute nothing.
    pub fn new(mesh: &HalfEdgeMesh, vertex: VertexId, area_weighted: bool) -> Self {
        let mut quadric = Quadric::zero();
        for &out in mesh.vertex_edges(vertex) {
            let [v0, v1, v2] = mesh.triangle(out).map(|v| to_f64(&mesh.position(v)));
            let n = (v1 - v0).cross(&(v2 - v0));
            let len = n.norm();
            if len <= f64::EPSILON {
                continue;
            }
            let n = n / len;
            let weight = if area_weighted { 0.5 * len } else { 1.0 };
            quadric += Quadric::from_plane(&n, -n.dot(&v0.coords), weight);
        }
        Self {
            quadric,
            vertex,
            is_border: mesh.is_border_vertex(vertex),
        }
    }

    /// Absorb the quadric of a vertex merged into this one.
    pub fn consume(&mut self, other: &ErrorQuadric) {
        self.quadric += other.quadric;
        self.is_border |= other.is_border;
    }

    pub fn error(&self, p: &Point3d) -> f64 {
        self.quadric.evaluate(p)
    }

    /// Whether the vertex this quadric belongs to has been collapsed away
    pub fn is_deleted(&self, mesh: &HalfEdgeMesh) -> bool {
        mesh.is_vertex_deleted(self.vertex)
    }
}
