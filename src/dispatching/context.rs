//! Scheduling context for dispatching rule evaluation.

/// Runtime scheduling state passed to dispatching rules.
///
/// All times are slot indices on the call's timeline.
#[derive(Debug, Clone, Default)]
pub struct SchedulingContext {
    /// Current slot (rules measure slack from here).
    pub current_slot: usize,
    /// Average batch duration across all jobs (for ATC normalization).
    pub average_duration: Option<f64>,
}

impl SchedulingContext {
    /// Creates a context at the given slot.
    pub fn at_slot(current_slot: usize) -> Self {
        Self {
            current_slot,
            ..Default::default()
        }
    }

    /// Sets the average batch duration.
    pub fn with_average_duration(mut self, slots: f64) -> Self {
        self.average_duration = Some(slots);
        self
    }
}
