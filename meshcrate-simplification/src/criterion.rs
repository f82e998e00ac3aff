//! Termination criteria for the simplification loop

use meshcrate_core::{Error, HalfEdgeMesh, Result};
use std::time::{Duration, Instant};

/// Decides when simplification stops.
///
/// `init` is called once with the mesh before the first collapse;
/// `is_finished` is consulted before every collapse with the error of the
/// most recently applied one.
pub trait TermCriterion {
    fn init(&mut self, _mesh: &HalfEdgeMesh) {}

    fn is_finished(&mut self, mesh: &HalfEdgeMesh, last_error: f64) -> bool;
}

/// Stop once the mesh has at most `target` faces
#[derive(Debug, Clone, Copy)]
pub struct FaceCountCriterion {
    pub target: usize,
}

impl FaceCountCriterion {
    pub fn new(target: usize) -> Self {
        Self { target }
    }
}

impl TermCriterion for FaceCountCriterion {
    fn is_finished(&mut self, mesh: &HalfEdgeMesh, _last_error: f64) -> bool {
        mesh.face_count() <= self.target
    }
}

/// Stop once the face count dropped to `ratio` times the initial count
#[derive(Debug, Clone, Copy)]
pub struct FaceCountRatioCriterion {
    ratio: f64,
    target: usize,
}

impl FaceCountRatioCriterion {
    pub fn new(ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::InvalidArgument(format!(
                "face count ratio must be between 0.0 and 1.0, got {ratio}"
            )));
        }
        Ok(Self { ratio, target: 0 })
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

impl TermCriterion for FaceCountRatioCriterion {
    fn init(&mut self, mesh: &HalfEdgeMesh) {
        self.target = (mesh.face_count() as f64 * self.ratio) as usize;
    }

    fn is_finished(&mut self, mesh: &HalfEdgeMesh, _last_error: f64) -> bool {
        mesh.face_count() <= self.target
    }
}

/// Stop once an applied collapse exceeded `max_error`
#[derive(Debug, Clone, Copy)]
pub struct ErrorThresholdCriterion {
    pub max_error: f64,
}

impl ErrorThresholdCriterion {
    pub fn new(max_error: f64) -> Self {
        Self { max_error }
    }
}

impl TermCriterion for ErrorThresholdCriterion {
    fn is_finished(&mut self, _mesh: &HalfEdgeMesh, last_error: f64) -> bool {
        last_error > self.max_error
    }
}

/// Stop after the criterion has been consulted `max_iterations` times
#[derive(Debug, Clone, Copy)]
pub struct MaxIterationsCriterion {
    max_iterations: usize,
    iterations: usize,
}

impl MaxIterationsCriterion {
    pub fn new(max_iterations: usize) -> Self {
        Self {
            max_iterations,
            iterations: 0,
        }
    }
}

impl TermCriterion for MaxIterationsCriterion {
    fn init(&mut self, _mesh: &HalfEdgeMesh) {
        self.iterations = 0;
    }

    fn is_finished(&mut self, _mesh: &HalfEdgeMesh, _last_error: f64) -> bool {
        if self.iterations >= self.max_iterations {
            return true;
        }
        self.iterations += 1;
        false
    }
}

/// Stop once a wall clock budget is used up. The result depends on machine
/// speed and is not reproducible.
#[derive(Debug, Clone, Copy)]
pub struct DeadlineCriterion {
    budget: Duration,
    started: Option<Instant>,
}

impl DeadlineCriterion {
    pub fn new(budget: Duration) -> Self {
        Self { budget, started: None }
    }
}

impl TermCriterion for DeadlineCriterion {
    fn init(&mut self, _mesh: &HalfEdgeMesh) {
        self.started = Some(Instant::now());
    }

    fn is_finished(&mut self, _mesh: &HalfEdgeMesh, _last_error: f64) -> bool {
        let started = *self.started.get_or_insert_with(Instant::now);
        started.elapsed() >= self.budget
    }
}

/// Stop as soon as any of the wrapped criteria is met
#[derive(Default)]
pub struct AnyOf {
    criteria: Vec<Box<dyn TermCriterion>>,
}

impl AnyOf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<C: TermCriterion + 'static>(mut self, criterion: C) -> Self {
        self.criteria.push(Box::new(criterion));
        self
    }
}

impl TermCriterion for AnyOf {
    fn init(&mut self, mesh: &HalfEdgeMesh) {
        for c in &mut self.criteria {
            c.init(mesh);
        }
    }

    fn is_finished(&mut self, mesh: &HalfEdgeMesh, last_error: f64) -> bool {
        // every criterion sees every call so stateful ones stay in sync
        self.criteria
            .iter_mut()
            .fold(false, |done, c| c.is_finished(mesh, last_error) || done)
    }
}

/// Adapts a closure into a criterion
pub struct FnCriterion<F>(pub F);

impl<F> TermCriterion for FnCriterion<F>
where
    F: FnMut(&HalfEdgeMesh, f64) -> bool,
{
    fn is_finished(&mut self, mesh: &HalfEdgeMesh, last_error: f64) -> bool {
        (self.0)(mesh, last_error)
    }
}
