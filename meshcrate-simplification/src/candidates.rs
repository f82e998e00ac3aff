//! Collapse candidates and the error ordered candidate queue

use meshcrate_core::{EdgeId, Point3f, VertexId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

/// Unordered vertex pair identifying an undirected mesh edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    a: VertexId,
    b: VertexId,
}

impl EdgeKey {
    pub fn new(v1: VertexId, v2: VertexId) -> Self {
        Self {
            a: v1.min(v2),
            b: v1.max(v2),
        }
    }

    /// Endpoints, smaller index first
    pub fn vertices(&self) -> (VertexId, VertexId) {
        (self.a, self.b)
    }

    pub fn contains(&self, v: VertexId) -> bool {
        self.a == v || self.b == v
    }
}

/// A queued edge collapse
#[derive(Debug, Clone, PartialEq)]
pub struct CollapseCandidate {
    pub edge: EdgeId,
    pub key: EdgeKey,
    /// Endpoints of `edge` when the candidate was computed
    pub from: VertexId,
    pub to: VertexId,
    pub position: Point3f,
    pub error: f64,
    /// Times the candidate went back into the queue with a changed error
    pub requeues: usize,
}

#[derive(Debug, Clone, Copy)]
struct ErrorKey(f64);

impl PartialEq for ErrorKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ErrorKey {}

impl PartialOrd for ErrorKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ErrorKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

/// Candidates ordered by error, with lookup by edge.
///
/// Each error value owns a bucket of edges. Among equal errors the most
/// recently inserted candidate is polled first.
#[derive(Debug, Clone, Default)]
pub struct CollapseQueue {
    by_error: BTreeMap<ErrorKey, Vec<EdgeKey>>,
    index: HashMap<EdgeKey, CollapseCandidate>,
}

impl CollapseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate, replacing any queued candidate for the same edge.
    pub fn insert(&mut self, candidate: CollapseCandidate) -> Option<CollapseCandidate> {
        let replaced = self.remove(&candidate.key);
        self.by_error
            .entry(ErrorKey(candidate.error))
            .or_default()
            .push(candidate.key);
        self.index.insert(candidate.key, candidate);
        replaced
    }

    /// Remove the candidate for `key`. Removing an absent key is a no-op.
    pub fn remove(&mut self, key: &EdgeKey) -> Option<CollapseCandidate> {
        let candidate = self.index.remove(key)?;
        let error = ErrorKey(candidate.error);
        if let Some(bucket) = self.by_error.get_mut(&error) {
            if let Some(pos) = bucket.iter().rposition(|k| k == key) {
                bucket.remove(pos);
            }
            if bucket.is_empty() {
                self.by_error.remove(&error);
            }
        }
        Some(candidate)
    }

    /// Candidate with the smallest error
    pub fn peek(&self) -> Option<&CollapseCandidate> {
        let (_, bucket) = self.by_error.first_key_value()?;
        bucket.last().and_then(|key| self.index.get(key))
    }

    /// Remove and return the candidate with the smallest error
    pub fn poll(&mut self) -> Option<CollapseCandidate> {
        let mut entry = self.by_error.first_entry()?;
        let key = entry.get_mut().pop();
        if entry.get().is_empty() {
            entry.remove();
        }
        key.and_then(|k| self.index.remove(&k))
    }

    /// Smallest queued error, `None` if the queue is empty
    pub fn min_error(&self) -> Option<f64> {
        self.by_error.first_key_value().map(|(e, _)| e.0)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn clear(&mut self) {
        self.by_error.clear();
        self.index.clear();
    }

    pub fn contains(&self, key: &EdgeKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn get(&self, key: &EdgeKey) -> Option<&CollapseCandidate> {
        self.index.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &EdgeKey> + '_ {
        self.index.keys()
    }

    /// Whether ordering and index describe exactly the same candidates
    pub fn is_consistent(&self) -> bool {
        let mut queued = 0;
        for (error, bucket) in &self.by_error {
            if bucket.is_empty() {
                return false;
            }
            for key in bucket {
                match self.index.get(key) {
                    Some(c) if ErrorKey(c.error) == *error && c.key == *key => queued += 1,
                    _ => return false,
                }
            }
        }
        queued == self.index.len()
    }
}
