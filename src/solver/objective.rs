//! Objective evaluation of a decoded placement.
//!
//! # Terms
//!
//! | Term | Definition | Range |
//! |------|-----------|-------|
//! | Makespan | last end slot / horizon slots | 0..1 |
//! | Lateness | Σ w·max(0, completion - deadline) / (Σ w · slots) | 0..1 |
//! | Idle | unused capacity / total capacity, within `[0, makespan)` | 0..1 |
//! | Priority | Σ u·start / (Σ u · slots), u = 1 / (priority rank) | 0..1 |
//!
//! Candidates compare lexicographically: fewer unplaced batches, then fewer
//! relaxed deadlines, then a lower weighted objective.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 1.2: Performance Measures

use std::collections::BTreeMap;

use super::decoder::Decoded;
use super::SolverModel;

/// Objective values closer than this are considered equal.
pub const OBJECTIVE_EPSILON: f64 = 1e-9;

/// Quality of one decoded placement.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Evaluation {
    /// Batches left out.
    pub unplaced: usize,
    /// Products whose deadline was dropped (before or during decoding).
    pub relaxed: usize,
    /// Weighted sum of the normalized terms.
    pub objective: f64,
    /// Last end slot (0 when nothing is placed).
    pub makespan_slots: usize,
    /// Sum over products of `max(0, completion - deadline)`, in slots.
    pub lateness_slots: usize,
    pub makespan_term: f64,
    pub lateness_term: f64,
    pub idle_term: f64,
    pub priority_term: f64,
}

impl Evaluation {
    /// Computes the evaluation of `decoded` under the model's weights.
    pub fn of(model: &SolverModel, decoded: &Decoded) -> Self {
        let slots = model.timeline.slots.max(1) as f64;
        let makespan = decoded.placements.iter().map(|p| p.end).max().unwrap_or(0);

        // Lateness per product.
        let mut completion: BTreeMap<usize, usize> = BTreeMap::new();
        for p in &decoded.placements {
            let c = completion.entry(model.jobs[p.job].product).or_insert(0);
            *c = (*c).max(p.end);
        }
        let mut lateness_slots = 0;
        let mut weighted_late = 0.0;
        let mut weight_sum = 0.0;
        for (idx, product) in model.products.iter().enumerate() {
            let Some(deadline) = product.deadline else {
                continue;
            };
            let weight = model
                .jobs
                .iter()
                .find(|j| j.product == idx)
                .map_or(1.0, |j| j.deadline_weight.max(0.0));
            weight_sum += weight;
            if let Some(&end) = completion.get(&idx) {
                let late = end.saturating_sub(deadline);
                lateness_slots += late;
                weighted_late += weight * late as f64;
            }
        }
        let lateness_term = if weight_sum > 0.0 {
            weighted_late / (weight_sum * slots)
        } else {
            0.0
        };

        // Idle capacity within the makespan.
        let mut capacity: u64 = 0;
        for lane in &model.resources {
            capacity += lane.capacity[..makespan.min(lane.capacity.len())]
                .iter()
                .map(|&c| c as u64)
                .sum::<u64>();
        }
        let busy: u64 = decoded
            .placements
            .iter()
            .filter(|p| p.resource.is_some())
            .map(|p| (p.end - p.start) as u64)
            .sum();
        let idle_term = if capacity > 0 {
            capacity.saturating_sub(busy) as f64 / capacity as f64
        } else {
            0.0
        };

        // Earlier starts for more urgent products.
        let min_priority = model.jobs.iter().map(|j| j.priority).min().unwrap_or(0);
        let mut urgency_sum = 0.0;
        let mut weighted_start = 0.0;
        for p in &decoded.placements {
            let job = &model.jobs[p.job];
            let u = 1.0 / ((job.priority - min_priority) as f64 + 1.0);
            urgency_sum += u;
            weighted_start += u * p.start as f64;
        }
        let priority_term = if urgency_sum > 0.0 {
            weighted_start / (urgency_sum * slots)
        } else {
            0.0
        };

        let makespan_term = makespan as f64 / slots;
        let w = model.weights;
        let objective = w.lateness * lateness_term
            + w.makespan * makespan_term
            + w.idle * idle_term
            + w.priority * priority_term;

        let mut relaxed = model.relaxed_products.clone();
        relaxed.extend(decoded.relaxed.iter().copied());

        Self {
            unplaced: decoded.failures.len(),
            relaxed: relaxed.len(),
            objective,
            makespan_slots: makespan,
            lateness_slots,
            makespan_term,
            lateness_term,
            idle_term,
            priority_term,
        }
    }

    /// Whether `self` is strictly better than `other`.
    pub fn better_than(&self, other: &Self) -> bool {
        match (self.unplaced, self.relaxed).cmp(&(other.unplaced, other.relaxed)) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => self.objective < other.objective - OBJECTIVE_EPSILON,
        }
    }

    /// Whether `self` is at least as good as `other`.
    pub fn not_worse_than(&self, other: &Self) -> bool {
        !other.better_than(self)
    }

    /// Whether every batch is placed.
    pub fn is_feasible(&self) -> bool {
        self.unplaced == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ConstraintSet, ObjectiveWeights};
    use crate::loader::DomainModel;
    use crate::models::{parse_instant, Employee, Product, Resource};
    use crate::solver::decoder::{Decoder, FailureReason, Placement, PlacementFailure};
    use crate::solver::Timeline;

    fn model() -> SolverModel {
        let domain = DomainModel {
            employees: vec![Employee::new("E1")],
            products: vec![
                Product::new("P1").with_batch(2.0, 1.0).with_demand(2.0).with_priority(1),
                Product::new("P2").with_batch(1.0, 1.0).with_demand(1.0).with_priority(3),
            ],
            resources: vec![Resource::new("R1", "Line")],
            ..Default::default()
        };
        let timeline = Timeline::new(parse_instant("2025-01-06").unwrap(), 60, 1);
        SolverModel::build(&domain, &ConstraintSet::default(), timeline)
    }

    #[test]
    fn test_terms() {
        let mut m = model();
        m.products[0].deadline = Some(10);
        m.jobs.iter_mut().filter(|j| j.product == 0).for_each(|j| j.deadline = Some(10));
        let d = Decoder::new(&m).decode(&[2, 0, 1]);
        // P2 08-09, P1 09-11, P1 11-13.
        let e = Evaluation::of(&m, &d);
        assert_eq!(e.makespan_slots, 13);
        assert_eq!(e.lateness_slots, 3);
        assert!((e.makespan_term - 13.0 / 24.0).abs() < 1e-12);
        assert!((e.lateness_term - 3.0 / 24.0).abs() < 1e-12);
        // Capacity 13, busy 5.
        assert!((e.idle_term - 8.0 / 13.0).abs() < 1e-12);
        assert_eq!(e.unplaced, 0);
    }

    #[test]
    fn test_weights_apply() {
        let mut m = model();
        m.weights = ObjectiveWeights::normalized(Some(0.0), Some(1.0), Some(0.0), 0.0);
        let d = Decoder::new(&m).decode(&[0, 1, 2]);
        let e = Evaluation::of(&m, &d);
        assert!((e.objective - e.makespan_term).abs() < 1e-12);
    }

    #[test]
    fn test_priority_term_rewards_urgent_first() {
        let mut m = model();
        m.weights = ObjectiveWeights::normalized(Some(0.0), Some(0.0), Some(0.0), 1.0);
        let urgent_first = Evaluation::of(&m, &Decoder::new(&m).decode(&[0, 1, 2]));
        let urgent_last = Evaluation::of(&m, &Decoder::new(&m).decode(&[2, 0, 1]));
        assert!(urgent_first.better_than(&urgent_last));
    }

    #[test]
    fn test_lexicographic_comparison() {
        let m = model();
        let full = Decoded {
            placements: vec![Placement {
                job: 0,
                start: 20,
                end: 22,
                employee: 0,
                resource: Some(0),
            }],
            ..Default::default()
        };
        let partial = Decoded {
            failures: vec![PlacementFailure {
                job: 0,
                reason: FailureReason::NoSlot,
            }],
            ..Default::default()
        };
        let a = Evaluation::of(&m, &full);
        let b = Evaluation::of(&m, &partial);
        assert!(b.objective < a.objective);
        assert!(a.better_than(&b));
        assert!(!b.better_than(&a));
        assert!(a.not_worse_than(&a));
    }
}
