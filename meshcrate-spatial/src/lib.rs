//! # meshcrate spatial
//!
//! Bounding-volume k-d tree over points, triangles and edges.
//!
//! Queries are expressed as traversers that steer the descent through the
//! tree: radius search, k-nearest search and nearest ray hit are provided,
//! and custom traversers can be plugged in through [`KdTreeTraverser`].

pub mod adapter;
pub mod kd_tree;
pub mod nearest_neighbor;
pub mod traverser;

// Re-export commonly used items
pub use adapter::*;
pub use kd_tree::*;
pub use nearest_neighbor::*;
pub use traverser::*;
