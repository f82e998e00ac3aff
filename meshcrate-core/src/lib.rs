//! Core data structures and traits for meshcrate
//!
//! This crate provides the geometric primitives, indexed meshes and the
//! half-edge mesh shared by the spatial index and the simplifier.

pub mod error;
pub mod geometry;
pub mod halfedge;
pub mod mesh;
pub mod point;
pub mod traits;

pub use error::*;
pub use geometry::*;
pub use halfedge::*;
pub use mesh::*;
pub use point::*;
pub use traits::*;

/// Re-export commonly used types from nalgebra
pub use nalgebra::{Matrix3, Point2, Point3, Vector3};
