//! Parallel improvement search over batch orders.
//!
//! Each worker runs a seeded hill climb: mutate the current order, decode,
//! keep the move if it is not worse. Workers share only the read-only model
//! and a cancel flag; the best result across workers wins, ties going to
//! the lowest worker index. Every decode, the first one included, stops
//! between batches once the flag is set or the deadline passes.
//!
//! With a fixed seed and an iteration budget that finishes before the time
//! limit, the outcome is reproducible.
//!
//! # Reference
//! Hoos & Stützle (2004), "Stochastic Local Search", Ch. 2

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use super::decoder::{Decoded, Decoder, Interrupt};
use super::objective::Evaluation;
use super::{SolverModel, ANY_RESOURCE_TYPE};

/// Mutation applied to a batch order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationType {
    /// Swap two random positions.
    Swap,
    /// Remove and reinsert at a random position.
    Insert,
    /// Reverse a random segment.
    Invert,
}

impl MutationType {
    const ALL: [MutationType; 3] = [MutationType::Swap, MutationType::Insert, MutationType::Invert];

    /// Applies the mutation in place.
    pub fn apply<R: Rng>(self, order: &mut [usize], rng: &mut R) {
        let len = order.len();
        if len < 2 {
            return;
        }
        let i = rng.random_range(0..len);
        let j = rng.random_range(0..len);
        match self {
            MutationType::Swap => order.swap(i, j),
            MutationType::Insert => {
                if i < j {
                    order[i..=j].rotate_left(1);
                } else {
                    order[j..=i].rotate_right(1);
                }
            }
            MutationType::Invert => {
                let (lo, hi) = if i <= j { (i, j) } else { (j, i) };
                order[lo..=hi].reverse();
            }
        }
    }
}

/// Search limits.
#[derive(Debug, Clone, Copy)]
pub struct SearchParams {
    pub workers: usize,
    /// Mutations per worker.
    pub max_iterations: u64,
    pub seed: u64,
    /// Wall-clock stop.
    pub deadline: Instant,
}

/// Best order found and how the search ended.
#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub order: Vec<usize>,
    pub decoded: Decoded,
    pub evaluation: Evaluation,
    /// Mutations evaluated across all workers.
    pub iterations: u64,
    /// Whether any worker stopped on the deadline.
    pub timed_out: bool,
    /// Whether the cancel flag stopped the search.
    pub cancelled: bool,
}

struct WorkerResult {
    order: Vec<usize>,
    decoded: Decoded,
    evaluation: Evaluation,
    iterations: u64,
    timed_out: bool,
    cancelled: bool,
}

/// Improves `initial` with `params.workers` parallel hill climbers.
pub fn improve(
    model: &SolverModel,
    initial: Vec<usize>,
    params: &SearchParams,
    cancel: &AtomicBool,
) -> SearchOutcome {
    let interrupt = Interrupt::new(cancel, params.deadline);
    let decoder = Decoder::new(model).with_interrupt(interrupt);
    let initial = repair_priority(model, initial);
    let decoded = decoder.decode(&initial);
    let evaluation = Evaluation::of(model, &decoded);

    let trivial = initial.len() < 2 || params.max_iterations == 0 || params.workers == 0;
    if decoded.interrupted || trivial {
        let cancelled = interrupt.is_cancelled();
        if decoded.interrupted {
            debug!(cancelled, "first decode interrupted");
        }
        return SearchOutcome {
            order: initial,
            timed_out: decoded.interrupted && !cancelled,
            decoded,
            evaluation,
            iterations: 0,
            cancelled,
        };
    }

    let results: Vec<WorkerResult> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..params.workers)
            .map(|w| {
                let start = (initial.clone(), decoded.clone(), evaluation);
                scope.spawn(move || climb(model, w, start, params, cancel))
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|panic| std::panic::resume_unwind(panic)))
            .collect()
    });

    let iterations = results.iter().map(|r| r.iterations).sum();
    let timed_out = results.iter().any(|r| r.timed_out);
    let cancelled = results.iter().any(|r| r.cancelled);

    let mut best: Option<WorkerResult> = None;
    for r in results {
        if best.as_ref().map_or(true, |b| r.evaluation.better_than(&b.evaluation)) {
            best = Some(r);
        }
    }
    let best = best.unwrap_or(WorkerResult {
        order: initial,
        decoded,
        evaluation,
        iterations: 0,
        timed_out,
        cancelled,
    });

    debug!(
        iterations,
        timed_out,
        objective = best.evaluation.objective,
        unplaced = best.evaluation.unplaced,
        "search finished"
    );

    SearchOutcome {
        order: best.order,
        decoded: best.decoded,
        evaluation: best.evaluation,
        iterations,
        timed_out,
        cancelled,
    }
}

fn climb(
    model: &SolverModel,
    worker: usize,
    (mut order, mut decoded, mut evaluation): (Vec<usize>, Decoded, Evaluation),
    params: &SearchParams,
    cancel: &AtomicBool,
) -> WorkerResult {
    let decoder = Decoder::new(model).with_interrupt(Interrupt::new(cancel, params.deadline));
    let seed = params.seed ^ (worker as u64 + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut iterations = 0;
    let mut timed_out = false;
    let mut cancelled = false;

    while iterations < params.max_iterations {
        if cancel.load(Ordering::Relaxed) {
            cancelled = true;
            break;
        }
        if Instant::now() >= params.deadline {
            timed_out = true;
            break;
        }
        iterations += 1;

        let mut candidate = order.clone();
        let mutation = MutationType::ALL[rng.random_range(0..MutationType::ALL.len())];
        mutation.apply(&mut candidate, &mut rng);
        let candidate = repair_priority(model, candidate);

        let cand_decoded = decoder.decode(&candidate);
        if cand_decoded.interrupted {
            cancelled = cancel.load(Ordering::Relaxed);
            timed_out = !cancelled;
            break;
        }
        let cand_eval = Evaluation::of(model, &cand_decoded);
        if cand_eval.not_worse_than(&evaluation) {
            order = candidate;
            decoded = cand_decoded;
            evaluation = cand_eval;
        }
    }

    WorkerResult {
        order,
        decoded,
        evaluation,
        iterations,
        timed_out,
        cancelled,
    }
}

/// Under strict priority ordering, reorders the batches of each resource
/// type so that more urgent batches come first, keeping their positions.
///
/// Untyped batches compete with every type, so their presence merges all
/// batches into one class.
pub fn repair_priority(model: &SolverModel, mut order: Vec<usize>) -> Vec<usize> {
    if !model.strict_priority {
        return order;
    }
    let merged = model.jobs.iter().any(|j| j.type_key == ANY_RESOURCE_TYPE);
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::new();
    for (pos, &j) in order.iter().enumerate() {
        let class = if merged {
            ANY_RESOURCE_TYPE
        } else {
            model.jobs[j].type_key.as_str()
        };
        positions.entry(class).or_default().push(pos);
    }
    for slots in positions.values() {
        let mut jobs: Vec<usize> = slots.iter().map(|&p| order[p]).collect();
        jobs.sort_by_key(|&j| model.jobs[j].priority);
        for (&p, j) in slots.iter().zip(jobs) {
            order[p] = j;
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ConstraintSet;
    use crate::loader::DomainModel;
    use crate::models::{parse_instant, Employee, Product, Resource};
    use crate::solver::Timeline;
    use std::time::Duration;

    fn model() -> SolverModel {
        let domain = DomainModel {
            employees: vec![Employee::new("E1"), Employee::new("E2")],
            products: vec![
                Product::new("P1").with_batch(3.0, 1.0).with_demand(3.0).with_priority(2),
                Product::new("P2").with_batch(1.0, 1.0).with_demand(4.0).with_priority(1),
                Product::new("P3").with_batch(2.0, 1.0).with_demand(2.0).with_resource_type("Oven"),
            ],
            resources: vec![Resource::new("R1", "Line"), Resource::new("O1", "Oven")],
            ..Default::default()
        };
        let timeline = Timeline::new(parse_instant("2025-01-06").unwrap(), 60, 3);
        SolverModel::build(&domain, &ConstraintSet::default(), timeline)
    }

    fn params(seed: u64) -> SearchParams {
        SearchParams {
            workers: 2,
            max_iterations: 50,
            seed,
            deadline: Instant::now() + Duration::from_secs(30),
        }
    }

    #[test]
    fn test_mutations_keep_permutation() {
        let mut rng = StdRng::seed_from_u64(42);
        for mutation in MutationType::ALL {
            let mut order: Vec<usize> = (0..10).collect();
            for _ in 0..20 {
                mutation.apply(&mut order, &mut rng);
            }
            let mut sorted = order.clone();
            sorted.sort_unstable();
            assert_eq!(sorted, (0..10).collect::<Vec<_>>());
        }
    }

    #[test]
    fn test_insert_moves_one_element() {
        let mut order = vec![0, 1, 2, 3];
        order[1..=3].rotate_left(1);
        assert_eq!(order, vec![0, 2, 3, 1]);
    }

    #[test]
    fn test_improve_never_worse_than_initial() {
        let m = model();
        let initial: Vec<usize> = (0..m.jobs.len()).collect();
        let start = Evaluation::of(&m, &Decoder::new(&m).decode(&initial));
        let out = improve(&m, initial, &params(42), &AtomicBool::new(false));
        assert!(out.evaluation.not_worse_than(&start));
        assert_eq!(out.iterations, 100);
        assert!(!out.timed_out);
        assert_eq!(out.decoded.placements.len(), m.jobs.len());
    }

    #[test]
    fn test_improve_is_reproducible() {
        let m = model();
        let initial: Vec<usize> = (0..m.jobs.len()).collect();
        let a = improve(&m, initial.clone(), &params(7), &AtomicBool::new(false));
        let b = improve(&m, initial, &params(7), &AtomicBool::new(false));
        assert_eq!(a.order, b.order);
        assert_eq!(a.decoded, b.decoded);
    }

    #[test]
    fn test_cancel_stops_first_decode() {
        let m = model();
        let initial: Vec<usize> = (0..m.jobs.len()).collect();
        let out = improve(&m, initial, &params(1), &AtomicBool::new(true));
        assert!(out.cancelled);
        assert!(!out.timed_out);
        assert_eq!(out.iterations, 0);
        assert!(out.decoded.interrupted);
        assert!(out.decoded.placements.is_empty());
        assert_eq!(out.decoded.failures.len(), m.jobs.len());
    }

    #[test]
    fn test_expired_deadline_reports_timeout() {
        let m = model();
        let initial: Vec<usize> = (0..m.jobs.len()).collect();
        let mut p = params(1);
        p.deadline = Instant::now();
        let out = improve(&m, initial, &p, &AtomicBool::new(false));
        assert!(out.timed_out);
        assert!(!out.cancelled);
        assert!(out.decoded.interrupted);
        assert!(!out.evaluation.is_feasible());
    }

    #[test]
    fn test_repair_priority_per_type() {
        let mut m = model();
        m.strict_priority = true;
        // Jobs 0..3 = P1 (prio 2), 3..7 = P2 (prio 1), 7..9 = P3 (Oven).
        for job in &mut m.jobs[..7] {
            job.type_key = "line".to_string();
        }
        let order = vec![7, 0, 3, 8, 1, 4];
        let repaired = repair_priority(&m, order);
        assert_eq!(repaired, vec![7, 3, 4, 8, 0, 1]);
    }

    #[test]
    fn test_repair_priority_untyped_merges_classes() {
        let mut m = model();
        m.strict_priority = true;
        // P1 and P2 are untyped, so the Oven batches (prio 3) go last.
        let order = vec![7, 0, 3, 8, 1, 4];
        let repaired = repair_priority(&m, order);
        assert_eq!(repaired, vec![3, 4, 0, 1, 7, 8]);
    }
}
