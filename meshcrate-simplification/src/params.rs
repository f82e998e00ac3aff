//! Simplification parameters

use serde::{Deserialize, Serialize};

/// Parameters controlling a simplification run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimplifyParams {
    /// Never collapse an edge touching a border vertex
    pub keep_borders: bool,
    /// Recompute vertex normals of the simplified mesh
    pub generate_normals: bool,
    /// Recompute tangents of the simplified mesh (needs texture coordinates)
    pub generate_tangents: bool,
    /// Weight face planes by face area when building quadrics
    pub area_weighted_quadrics: bool,
    /// Triangles above this aspect ratio get their longest edge split during
    /// a reshape pass
    pub reshape_aspect_ratio: f32,
    /// Re-insertions with a changed error allowed per candidate before the
    /// recomputed value is accepted as is
    pub max_requeues: usize,
    /// Collect a [`SimplifyEvent`](crate::SimplifyEvent) log in the stats
    pub record_events: bool,
}

impl Default for SimplifyParams {
    fn default() -> Self {
        Self {
            keep_borders: false,
            generate_normals: true,
            generate_tangents: true,
            area_weighted_quadrics: false,
            reshape_aspect_ratio: 50.0,
            max_requeues: 8,
            record_events: false,
        }
    }
}

impl SimplifyParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults, but with mesh borders left untouched
    pub fn preserving_borders() -> Self {
        Self {
            keep_borders: true,
            ..Self::default()
        }
    }

    pub fn with_keep_borders(mut self, keep_borders: bool) -> Self {
        self.keep_borders = keep_borders;
        self
    }

    pub fn with_normals(mut self, generate_normals: bool) -> Self {
        self.generate_normals = generate_normals;
        self
    }

    pub fn with_tangents(mut self, generate_tangents: bool) -> Self {
        self.generate_tangents = generate_tangents;
        self
    }

    pub fn with_area_weighted_quadrics(mut self, area_weighted: bool) -> Self {
        self.area_weighted_quadrics = area_weighted;
        self
    }

    pub fn with_reshape_aspect_ratio(mut self, ratio: f32) -> Self {
        self.reshape_aspect_ratio = ratio;
        self
    }

    pub fn with_max_requeues(mut self, max_requeues: usize) -> Self {
        self.max_requeues = max_requeues;
        self
    }

    pub fn with_events(mut self, record_events: bool) -> Self {
        self.record_events = record_events;
        self
    }
}
