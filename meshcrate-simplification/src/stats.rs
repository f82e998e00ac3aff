//! Run statistics and the optional event log

use crate::candidates::EdgeKey;
use meshcrate_core::VertexId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Why the simplification loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TerminationReason {
    /// No candidates were left
    QueueExhausted,
    /// Every remaining candidate has infinite error
    NoViableCandidates,
    /// The termination criterion was met
    CriterionMet,
}

/// Something the simplifier did, recorded when
/// [`SimplifyParams::record_events`](crate::SimplifyParams) is set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SimplifyEvent {
    Collapse {
        edge: EdgeKey,
        kept: VertexId,
        removed: VertexId,
        error: f64,
    },
    Reshape {
        splits: usize,
        faces: usize,
    },
    QueueRebuild,
    /// All candidates were recomputed after the front of the queue turned
    /// infinite
    QueueRefresh,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimplifyStats {
    pub initial_faces: usize,
    pub initial_vertices: usize,
    pub final_faces: usize,
    pub final_vertices: usize,
    pub collapses: usize,
    /// Polled candidates whose edge or vertices were already gone
    pub stale_entries: usize,
    /// Candidates put back because their error changed
    pub requeued: usize,
    /// Full queue rebuilds caused by inconsistent candidates
    pub queue_rebuilds: usize,
    /// Full recomputations once only infinite candidates were left
    pub queue_refreshes: usize,
    pub reshape_passes: usize,
    pub splits: usize,
    pub last_error: f64,
    pub termination: TerminationReason,
    pub elapsed: Duration,
    pub events: Vec<SimplifyEvent>,
}

impl SimplifyStats {
    pub(crate) fn new(initial_faces: usize, initial_vertices: usize) -> Self {
        Self {
            initial_faces,
            initial_vertices,
            final_faces: initial_faces,
            final_vertices: initial_vertices,
            collapses: 0,
            stale_entries: 0,
            requeued: 0,
            queue_rebuilds: 0,
            queue_refreshes: 0,
            reshape_passes: 0,
            splits: 0,
            last_error: 0.0,
            termination: TerminationReason::QueueExhausted,
            elapsed: Duration::ZERO,
            events: Vec::new(),
        }
    }

    /// Errors of the applied collapses, in order
    pub fn collapse_errors(&self) -> impl Iterator<Item = f64> + '_ {
        self.events.iter().filter_map(|e| match e {
            SimplifyEvent::Collapse { error, .. } => Some(*error),
            _ => None,
        })
    }
}

impl fmt::Display for SimplifyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} faces, {} -> {} vertices, {} collapses, last error {:.6}, stopped: {:?}, took {:.3} s",
            self.initial_faces,
            self.final_faces,
            self.initial_vertices,
            self.final_vertices,
            self.collapses,
            self.last_error,
            self.termination,
            self.elapsed.as_secs_f64()
        )
    }
}
