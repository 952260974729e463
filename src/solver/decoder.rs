//! Greedy list-scheduling decoder.
//!
//! Turns a batch order into a placement, taking batches one at a time and
//! putting each at the earliest feasible start.
//!
//! # Algorithm
//!
//! 1. Reserve the batch's material draw; fail the batch if stock runs out.
//! 2. Scan starts from the priority floor (strict ordering) upward.
//! 3. At each start, take the lowest-id employee free for the whole batch,
//!    then the lowest-id eligible resource with spare capacity throughout.
//! 4. If a hard deadline leaves no start, rescan without it and mark the
//!    product's deadline relaxed.
//!
//! The same order always yields the same placement. An [`Interrupt`] is
//! polled before each batch; once raised, the rest of the order is left
//! out as [`FailureReason::Interrupted`].
//!
//! # Complexity
//! O(n * T * (E + R) * d) where n=batches, T=slots, E=employees,
//! R=eligible resources, d=batch duration.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use super::{BatchJob, SolverModel};

/// Tolerance for stock comparisons.
const STOCK_EPSILON: f64 = 1e-9;

static NEVER: AtomicBool = AtomicBool::new(false);

/// Cancel flag plus optional wall-clock deadline.
#[derive(Debug, Clone, Copy)]
pub struct Interrupt<'a> {
    cancel: &'a AtomicBool,
    deadline: Option<Instant>,
}

impl<'a> Interrupt<'a> {
    pub fn new(cancel: &'a AtomicBool, deadline: Instant) -> Self {
        Self {
            cancel,
            deadline: Some(deadline),
        }
    }

    /// An interrupt that is never raised.
    pub fn never() -> Interrupt<'static> {
        Interrupt {
            cancel: &NEVER,
            deadline: None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    /// Cancelled, or past the deadline.
    pub fn is_raised(&self) -> bool {
        self.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// One placed batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    /// Index into [`SolverModel::jobs`].
    pub job: usize,
    /// First slot.
    pub start: usize,
    /// Slot after the last one.
    pub end: usize,
    /// Employee lane.
    pub employee: usize,
    /// Resource lane, if the batch needs one.
    pub resource: Option<usize>,
}

/// Why a batch could not be placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Not enough stock left of a material.
    MaterialStock { material: usize },
    /// No start where an employee and a resource are both free.
    NoSlot,
    /// Decoding stopped before this batch.
    Interrupted,
}

/// A batch the decoder had to leave out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementFailure {
    pub job: usize,
    pub reason: FailureReason,
}

/// Result of decoding one order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Decoded {
    pub placements: Vec<Placement>,
    pub failures: Vec<PlacementFailure>,
    /// Products whose hard deadline had to be dropped during this decode.
    pub relaxed: BTreeSet<usize>,
    /// Whether the interrupt cut this decode short.
    pub interrupted: bool,
}

impl Decoded {
    /// Whether every batch was placed.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Decodes batch orders against one model.
#[derive(Debug, Clone, Copy)]
pub struct Decoder<'a> {
    model: &'a SolverModel,
    interrupt: Interrupt<'a>,
}

struct State {
    employee_busy: Vec<Vec<bool>>,
    resource_load: Vec<Vec<u32>>,
    stock_used: Vec<f64>,
    /// Latest start per (type key, priority), for strict ordering.
    priority_starts: HashMap<String, BTreeMap<i32, usize>>,
}

impl<'a> Decoder<'a> {
    /// Creates a decoder for a model.
    pub fn new(model: &'a SolverModel) -> Self {
        Self {
            model,
            interrupt: Interrupt::never(),
        }
    }

    /// Stops decoding once `interrupt` is raised.
    pub fn with_interrupt(mut self, interrupt: Interrupt<'a>) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Places the batches of `order` (indices into `model.jobs`).
    pub fn decode(&self, order: &[usize]) -> Decoded {
        let m = self.model;
        let slots = m.timeline.slots;
        let mut state = State {
            employee_busy: vec![vec![false; slots]; m.employees.len()],
            resource_load: vec![vec![0; slots]; m.resources.len()],
            stock_used: vec![0.0; m.materials.len()],
            priority_starts: HashMap::new(),
        };
        let mut out = Decoded::default();

        for (pos, &j) in order.iter().enumerate() {
            if self.interrupt.is_raised() {
                out.failures.extend(order[pos..].iter().map(|&job| PlacementFailure {
                    job,
                    reason: FailureReason::Interrupted,
                }));
                out.interrupted = true;
                break;
            }
            let job = &m.jobs[j];

            let short = job.draws.iter().find(|d| {
                let available = m.materials[d.material].quantity_kg + STOCK_EPSILON;
                state.stock_used[d.material] + d.kg > available
            });
            if let Some(d) = short {
                out.failures.push(PlacementFailure {
                    job: j,
                    reason: FailureReason::MaterialStock { material: d.material },
                });
                continue;
            }

            let floor = if m.strict_priority {
                priority_floor(&state, job)
            } else {
                0
            };
            let base_limit = job.latest_end.min(slots);
            let hard_limit = match job.deadline {
                Some(d) if job.hard_deadline => base_limit.min(d),
                _ => base_limit,
            };

            let mut found = self.find_start(&state, job, floor, hard_limit);
            if found.is_none() && hard_limit < base_limit {
                found = self.find_start(&state, job, floor, base_limit);
                if found.is_some() {
                    out.relaxed.insert(job.product);
                }
            }

            match found {
                Some((start, employee, resource)) => {
                    let end = start + job.duration;
                    state.employee_busy[employee][start..end].iter_mut().for_each(|b| *b = true);
                    if let Some(r) = resource {
                        state.resource_load[r][start..end].iter_mut().for_each(|l| *l += 1);
                    }
                    for d in &job.draws {
                        state.stock_used[d.material] += d.kg;
                    }
                    if m.strict_priority {
                        let latest = state
                            .priority_starts
                            .entry(job.type_key.clone())
                            .or_default()
                            .entry(job.priority)
                            .or_insert(start);
                        *latest = (*latest).max(start);
                    }
                    out.placements.push(Placement {
                        job: j,
                        start,
                        end,
                        employee,
                        resource,
                    });
                }
                None => out.failures.push(PlacementFailure {
                    job: j,
                    reason: FailureReason::NoSlot,
                }),
            }
        }

        out
    }

    /// Earliest `(start, employee, resource)` with `start >= floor` and
    /// `start + duration <= limit`.
    fn find_start(
        &self,
        state: &State,
        job: &BatchJob,
        floor: usize,
        limit: usize,
    ) -> Option<(usize, usize, Option<usize>)> {
        let m = self.model;
        if job.duration > limit {
            return None;
        }
        for start in floor..=(limit - job.duration) {
            let range = start..start + job.duration;

            let Some(employee) = m.employees.iter().enumerate().position(|(e, lane)| {
                lane.available_for(range.clone())
                    && !state.employee_busy[e][range.clone()].iter().any(|&b| b)
            }) else {
                continue;
            };

            if !job.needs_resource {
                return Some((start, employee, None));
            }
            let resource = job.resources.iter().copied().find(|&r| {
                let cap = &m.resources[r].capacity[range.clone()];
                let load = &state.resource_load[r][range.clone()];
                cap.iter().zip(load).all(|(&c, &l)| l < c)
            });
            if let Some(r) = resource {
                return Some((start, employee, Some(r)));
            }
        }
        None
    }
}

/// No batch may start before the latest start of a more urgent batch it
/// competes with for resources.
fn priority_floor(state: &State, job: &BatchJob) -> usize {
    state
        .priority_starts
        .iter()
        .filter(|(key, _)| job.competes_with(key))
        .filter_map(|(_, starts)| starts.range(..job.priority).map(|(_, &s)| s).max())
        .max()
        .unwrap_or(0)
}
