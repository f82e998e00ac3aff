//! Mesh simplification for meshcrate
//!
//! Triangle meshes are decimated by repeatedly collapsing the edge whose
//! removal adds the least quadric error (Garland and Heckbert). The loop
//! runs on a [`HalfEdgeMesh`], keeps the mesh manifold, never flips a
//! face and can optionally leave open borders untouched.
//!
//! ```no_run
//! use meshcrate_core::MeshData;
//! use meshcrate_simplification::{simplify, FaceCountRatioCriterion};
//!
//! # fn run(mut mesh: MeshData) -> meshcrate_core::Result<()> {
//! let mut criterion = FaceCountRatioCriterion::new(0.25)?;
//! let stats = simplify(&mut mesh, &mut criterion)?;
//! println!("{stats}");
//! # Ok(())
//! # }
//! ```

pub mod candidates;
pub mod criterion;
pub mod params;
pub mod quadric;
pub mod simplifier;
pub mod stats;
pub mod strategy;

pub use candidates::*;
pub use criterion::*;
pub use params::*;
pub use quadric::*;
pub use simplifier::*;
pub use stats::*;
pub use strategy::*;

use meshcrate_core::{HalfEdgeMesh, MeshData, Result};
use std::collections::HashSet;

/// Simplify an indexed triangle mesh with default parameters.
pub fn simplify(mesh: &mut MeshData, criterion: &mut dyn TermCriterion) -> Result<SimplifyStats> {
    MeshSimplifier::default().simplify(mesh, criterion)
}

/// Simplify a half-edge mesh, never collapsing any of `excluded_edges`.
///
/// With `keep_borders` set, no edge touching a border vertex is collapsed.
pub fn simplify_half_edge_mesh(
    mesh: &mut HalfEdgeMesh,
    criterion: &mut dyn TermCriterion,
    excluded_edges: &HashSet<EdgeKey>,
    keep_borders: bool,
) -> SimplifyStats {
    let params = SimplifyParams::default().with_keep_borders(keep_borders);
    MeshSimplifier::new(params)
        .with_excluded_edges(excluded_edges.iter().copied())
        .simplify_mesh(mesh, criterion)
}
