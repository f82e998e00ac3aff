//! Indexed mesh data structures and functionality

use crate::error::{Error, Result};
use crate::geometry::BoundingBox;
use crate::point::*;
use serde::{Deserialize, Serialize};

/// Primitive topology of an indexed mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Points,
    Lines,
    Triangles,
}

impl PrimitiveType {
    /// Number of indices that make up one primitive
    pub fn indices_per_primitive(self) -> usize {
        match self {
            PrimitiveType::Points => 1,
            PrimitiveType::Lines => 2,
            PrimitiveType::Triangles => 3,
        }
    }
}

/// An indexed mesh with optional per-vertex attributes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeshData {
    pub primitive_type: PrimitiveType,
    pub vertices: Vec<Point3f>,
    pub indices: Vec<usize>,
    pub normals: Option<Vec<Vector3f>>,
    pub tex_coords: Option<Vec<TexCoord>>,
    pub tangents: Option<Vec<Vector3f>>,
}

impl MeshData {
    /// Create a new empty mesh
    pub fn new(primitive_type: PrimitiveType) -> Self {
        Self {
            primitive_type,
            vertices: Vec::new(),
            indices: Vec::new(),
            normals: None,
            tex_coords: None,
            tangents: None,
        }
    }

    /// Create a triangle mesh from vertices and faces
    pub fn from_triangles(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            indices: faces.into_iter().flatten().collect(),
            ..Self::new(PrimitiveType::Triangles)
        }
    }

    /// Create a line mesh from vertices and line segments
    pub fn from_lines(vertices: Vec<Point3f>, lines: Vec<[usize; 2]>) -> Self {
        Self {
            vertices,
            indices: lines.into_iter().flatten().collect(),
            ..Self::new(PrimitiveType::Lines)
        }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of primitives (triangles, lines or points)
    pub fn face_count(&self) -> usize {
        self.indices.len() / self.primitive_type.indices_per_primitive()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.indices.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a triangle to the mesh
    pub fn add_triangle(&mut self, face: [usize; 3]) {
        self.indices.extend_from_slice(&face);
    }

    /// Add a line segment to the mesh
    pub fn add_line(&mut self, line: [usize; 2]) {
        self.indices.extend_from_slice(&line);
    }

    /// Iterate over triangle index triples
    pub fn triangles(&self) -> impl Iterator<Item = [usize; 3]> + '_ {
        self.indices.chunks_exact(3).map(|c| [c[0], c[1], c[2]])
    }

    /// Iterate over line index pairs
    pub fn lines(&self) -> impl Iterator<Item = [usize; 2]> + '_ {
        self.indices.chunks_exact(2).map(|c| [c[0], c[1]])
    }

    /// Fail if any index points past the vertex list
    pub fn check_indices(&self) -> Result<()> {
        let nv = self.vertices.len();
        match self.indices.iter().find(|&&i| i >= nv) {
            Some(&idx) => Err(Error::InvalidData(format!(
                "vertex index {idx} out of range for {nv} vertices"
            ))),
            None => Ok(()),
        }
    }

    /// Compute area weighted vertex normals from the triangles.
    pub fn generate_normals(&mut self) {
        let mut normals = vec![Vector3f::zeros(); self.vertices.len()];
        for face in self.triangles() {
            let v0 = self.vertices[face[0]];
            let v1 = self.vertices[face[1]];
            let v2 = self.vertices[face[2]];
            // cross product length is twice the face area
            let n = (v1 - v0).cross(&(v2 - v0));
            for &i in &face {
                normals[i] += n;
            }
        }
        for n in &mut normals {
            *n = n.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::z);
        }
        self.normals = Some(normals);
    }

    /// Compute per-vertex tangents from positions and texture coordinates.
    ///
    /// Returns false (leaving tangents untouched) if the mesh has no texture
    /// coordinates.
    pub fn generate_tangents(&mut self) -> bool {
        let tex_coords = match &self.tex_coords {
            Some(uv) if uv.len() == self.vertices.len() => uv,
            _ => return false,
        };

        let mut tangents = vec![Vector3f::zeros(); self.vertices.len()];
        for face in self.triangles() {
            let [i0, i1, i2] = face;
            let e1 = self.vertices[i1] - self.vertices[i0];
            let e2 = self.vertices[i2] - self.vertices[i0];
            let du1 = tex_coords[i1].x - tex_coords[i0].x;
            let dv1 = tex_coords[i1].y - tex_coords[i0].y;
            let du2 = tex_coords[i2].x - tex_coords[i0].x;
            let dv2 = tex_coords[i2].y - tex_coords[i0].y;

            let det = du1 * dv2 - du2 * dv1;
            if det.abs() < f32::EPSILON {
                continue;
            }
            let t = (e1 * dv2 - e2 * dv1) / det;
            for &i in &face {
                tangents[i] += t;
            }
        }

        let normals = self.normals.as_ref().filter(|n| n.len() == self.vertices.len());
        for (i, t) in tangents.iter_mut().enumerate() {
            // Gram-Schmidt against the vertex normal if there is one
            if let Some(n) = normals.map(|n| n[i]) {
                let along_normal = n * n.dot(t);
                *t -= along_normal;
            }
            *t = t.try_normalize(f32::EPSILON).unwrap_or_else(Vector3f::x);
        }
        self.tangents = Some(tangents);
        true
    }

    /// Set vertex texture coordinates
    pub fn set_tex_coords(&mut self, tex_coords: Vec<TexCoord>) {
        if tex_coords.len() == self.vertices.len() {
            self.tex_coords = Some(tex_coords);
        }
    }

    /// Bounding box of all vertices
    pub fn bounds(&self) -> BoundingBox {
        let mut bounds = BoundingBox::new();
        for v in &self.vertices {
            bounds.add_point(v);
        }
        bounds
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.indices.clear();
        self.normals = None;
        self.tex_coords = None;
        self.tangents = None;
    }
}

impl Default for MeshData {
    fn default() -> Self {
        Self::new(PrimitiveType::Triangles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_quad() -> MeshData {
        MeshData::from_triangles(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [0, 2, 3]],
        )
    }

    #[test]
    fn test_counts() {
        let mesh = make_quad();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.face_count(), 2);
        assert!(!mesh.is_empty());

        let lines = MeshData::from_lines(mesh.vertices.clone(), vec![[0, 1], [1, 2], [2, 3]]);
        assert_eq!(lines.primitive_type, PrimitiveType::Lines);
        assert_eq!(lines.face_count(), 3);
        assert_eq!(lines.lines().nth(1), Some([1, 2]));
    }

    #[test]
    fn test_generate_normals() {
        let mut mesh = make_quad();
        mesh.generate_normals();
        for n in mesh.normals.as_ref().unwrap() {
            assert_relative_eq!(n.z, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_generate_tangents_requires_tex_coords() {
        let mut mesh = make_quad();
        assert!(!mesh.generate_tangents());
        assert!(mesh.tangents.is_none());

        mesh.set_tex_coords(vec![
            TexCoord::new(0.0, 0.0),
            TexCoord::new(1.0, 0.0),
            TexCoord::new(1.0, 1.0),
            TexCoord::new(0.0, 1.0),
        ]);
        mesh.generate_normals();
        assert!(mesh.generate_tangents());
        for t in mesh.tangents.as_ref().unwrap() {
            assert_relative_eq!(t.x, 1.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_generate_tangents_ignores_short_normals() {
        let mut mesh = make_quad();
        mesh.set_tex_coords(vec![
            TexCoord::new(0.0, 0.0),
            TexCoord::new(1.0, 0.0),
            TexCoord::new(1.0, 1.0),
            TexCoord::new(0.0, 1.0),
        ]);
        mesh.normals = Some(vec![Vector3f::z()]);
        assert!(mesh.generate_tangents());
        assert_eq!(mesh.tangents.as_ref().map(Vec::len), Some(4));
    }

    #[test]
    fn test_check_indices() {
        let mut mesh = make_quad();
        assert!(mesh.check_indices().is_ok());
        mesh.add_triangle([0, 2, 4]);
        assert!(matches!(mesh.check_indices(), Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_bounds() {
        let bounds = make_quad().bounds();
        assert_eq!(bounds.min, Point3f::new(0.0, 0.0, 0.0));
        assert_eq!(bounds.max, Point3f::new(1.0, 1.0, 0.0));
    }
}
