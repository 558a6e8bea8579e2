//! Two-state seen automaton driven by a pure ratio predicate.

/// Whether a visible-area ratio counts as seen.
pub fn crosses_threshold(ratio: f64, threshold: f64) -> bool {
    ratio >= threshold
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    /// Nothing showing yet.
    Idle,
    /// Showing and waiting for the first crossing.
    Observing,
    /// Crossed once. Observation is over for good.
    Seen,
    /// Torn down before any crossing.
    Released,
}

#[derive(Debug, Clone)]
pub struct VisibilityTracker {
    state: Visibility,
    threshold: f64,
}

impl VisibilityTracker {
    pub fn new(threshold: f64) -> Self {
        Self {
            state: Visibility::Idle,
            threshold,
        }
    }

    pub fn state(&self) -> Visibility {
        self.state
    }

    pub fn observe(&mut self) {
        if self.state == Visibility::Idle {
            self.state = Visibility::Observing;
        }
    }

    /// Feed one visibility sample. Returns `true` exactly once, on the first
    /// sample at or above the threshold while observing.
    pub fn report(&mut self, ratio: f64) -> bool {
        if self.state == Visibility::Observing && crosses_threshold(ratio, self.threshold) {
            self.state = Visibility::Seen;
            return true;
        }
        false
    }

    /// Stop observing without a crossing.
    pub fn release(&mut self) {
        if matches!(self.state, Visibility::Idle | Visibility::Observing) {
            self.state = Visibility::Released;
        }
    }
}
