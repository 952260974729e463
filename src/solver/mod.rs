//! Batch scheduling solver.
//!
//! Places every product batch on a discretized timeline, respecting
//! employee availability, resource capacity, material stock and expiry,
//! deadlines and (optionally) strict priority ordering.
//!
//! # Algorithm
//!
//! 1. **Pre-check**: cheap tests that name the infeasible constraint group
//!    before any search ([`precheck`]).
//! 2. **Dispatch**: order batches with the rule engine (default
//!    priority → EDD → SPT, id tie-break) and decode greedily.
//! 3. **Improve**: parallel seeded hill climbing over the batch order
//!    ([`search`]), bounded by the wall-clock limit and a cancel flag.
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::atomic::AtomicBool;
//! use std::time::Instant;
//! use prodsched::compiler::ConstraintSet;
//! use prodsched::loader::DomainModel;
//! use prodsched::solver::{solve, SolverConfig, SolverModel, Timeline};
//!
//! let domain = DomainModel::default();
//! let timeline = Timeline::new(chrono::Utc::now(), 60, 7);
//! let mut model = SolverModel::build(&domain, &ConstraintSet::default(), timeline);
//! let cancel = AtomicBool::new(false);
//! let solution = solve(&mut model, &SolverConfig::default(), Instant::now(), &cancel);
//! println!("{:?}", solution.status);
//! ```
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4, 14

pub mod decoder;
mod model;
pub mod objective;
pub mod precheck;
pub mod search;
mod timeline;

pub use decoder::{Decoded, Decoder, FailureReason, Interrupt, Placement, PlacementFailure};
pub use model::{
    BatchJob, EmployeeLane, MaterialDraw, MaterialStock, ProductInfo, ResourceLane, SolverModel,
    ANY_RESOURCE_TYPE,
};
pub use objective::Evaluation;
pub use precheck::Infeasibility;
pub use timeline::Timeline;

use std::collections::BTreeSet;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dispatching::{rules, RuleEngine, SchedulingContext, TieBreaker};
use search::SearchParams;

/// Rules used when the configuration names none.
pub const DEFAULT_DISPATCH_RULES: [&str; 3] = ["priority", "edd", "spt"];

/// Solver limits and tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverConfig {
    /// Wall-clock limit measured from call start.
    pub time_limit: Duration,
    /// Parallel search workers.
    pub workers: usize,
    /// Mutations per worker.
    pub max_iterations: u64,
    pub seed: u64,
    /// Dispatching rule names, most significant first.
    pub dispatch_rules: Vec<String>,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            time_limit: Duration::from_secs(30),
            workers: 4,
            max_iterations: 400,
            seed: 42,
            dispatch_rules: DEFAULT_DISPATCH_RULES.iter().map(|r| r.to_string()).collect(),
        }
    }
}

impl SolverConfig {
    /// Builds the dispatching engine for these rule names.
    ///
    /// Unknown names are skipped with a warning; an empty result falls
    /// back to the default rules.
    pub fn rule_engine(&self) -> RuleEngine {
        let mut engine = RuleEngine::new().with_final_tie_breaker(TieBreaker::ById);
        for name in &self.dispatch_rules {
            match rules::by_name(name) {
                Some(rule) => engine = engine.with_shared_rule(rule),
                None => warn!(rule = %name, "unknown dispatching rule ignored"),
            }
        }
        if engine.rule_count() == 0 {
            for name in DEFAULT_DISPATCH_RULES {
                if let Some(rule) = rules::by_name(name) {
                    engine = engine.with_shared_rule(rule);
                }
            }
        }
        engine
    }
}

/// Outcome class of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverStatus {
    /// Search budget exhausted within the time limit.
    Optimal,
    /// Time limit hit; best schedule found so far.
    FeasibleTimeout,
    /// No schedule places every batch.
    Infeasible,
}

impl SolverStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "optimal",
            Self::FeasibleTimeout => "feasible_timeout",
            Self::Infeasible => "infeasible",
        }
    }

    /// Whether a schedule was produced.
    pub fn is_feasible(&self) -> bool {
        !matches!(self, Self::Infeasible)
    }
}

/// Result of [`solve`].
#[derive(Debug, Clone)]
pub struct Solution {
    pub status: SolverStatus,
    /// Empty when infeasible.
    pub placements: Vec<Placement>,
    pub evaluation: Evaluation,
    /// Products whose deadline was dropped.
    pub relaxed: BTreeSet<usize>,
    pub infeasibility: Option<Infeasibility>,
    /// The time limit or the cancel flag stopped the solve before any
    /// complete schedule existed.
    pub interrupted: bool,
    pub warnings: Vec<String>,
    pub iterations: u64,
    pub solve_time: Duration,
}

impl Solution {
    fn infeasible(cause: Infeasibility, warnings: Vec<String>, started: Instant) -> Self {
        Self {
            status: SolverStatus::Infeasible,
            placements: Vec::new(),
            evaluation: Evaluation::default(),
            relaxed: BTreeSet::new(),
            infeasibility: Some(cause),
            interrupted: false,
            warnings,
            iterations: 0,
            solve_time: started.elapsed(),
        }
    }

    fn stopped(warnings: Vec<String>, iterations: u64, started: Instant) -> Self {
        Self {
            status: SolverStatus::Infeasible,
            placements: Vec::new(),
            evaluation: Evaluation::default(),
            relaxed: BTreeSet::new(),
            infeasibility: None,
            interrupted: true,
            warnings,
            iterations,
            solve_time: started.elapsed(),
        }
    }
}

/// Solves `model` within `config.time_limit` of `started`.
///
/// Never fails: an unsolvable model yields [`SolverStatus::Infeasible`]
/// with the blocking constraint group. A solve stopped by the limit or by
/// `cancel` before any complete schedule is also infeasible, with
/// `interrupted` set and no cause.
pub fn solve(
    model: &mut SolverModel,
    config: &SolverConfig,
    started: Instant,
    cancel: &AtomicBool,
) -> Solution {
    let interrupt = Interrupt::new(cancel, started + config.time_limit);
    let warnings = match precheck::precheck(model, &interrupt) {
        Ok(w) => w,
        Err(cause) => {
            debug!(group = %cause.constraint_group, "pre-check failed");
            return Solution::infeasible(cause, Vec::new(), started);
        }
    };
    if interrupt.is_raised() {
        debug!("interrupted during pre-check");
        return Solution::stopped(warnings, 0, started);
    }

    let average = if model.jobs.is_empty() {
        None
    } else {
        Some(model.jobs.iter().map(|j| j.duration as f64).sum::<f64>() / model.jobs.len() as f64)
    };
    let mut context = SchedulingContext::at_slot(0);
    if let Some(avg) = average {
        context = context.with_average_duration(avg);
    }
    let initial = config.rule_engine().sort_indices(&model.jobs, &context);
    debug!(batches = initial.len(), "dispatch order built");

    let params = SearchParams {
        workers: config.workers.max(1),
        max_iterations: config.max_iterations,
        seed: config.seed,
        deadline: started + config.time_limit,
    };
    let outcome = search::improve(model, initial, &params, cancel);
    if outcome.decoded.interrupted {
        return Solution::stopped(warnings, outcome.iterations, started);
    }

    if !outcome.evaluation.is_feasible() {
        let cause = precheck::diagnose(model, &outcome.decoded).unwrap_or_else(|| {
            Infeasibility::new(
                crate::models::groups::EMPLOYEE_AVAILABILITY,
                "not every batch could be placed",
            )
        });
        let mut solution = Solution::infeasible(cause, warnings, started);
        solution.iterations = outcome.iterations;
        return solution;
    }

    let mut relaxed = model.relaxed_products.clone();
    relaxed.extend(outcome.decoded.relaxed.iter().copied());
    let status = if outcome.timed_out || outcome.cancelled {
        SolverStatus::FeasibleTimeout
    } else {
        SolverStatus::Optimal
    };

    Solution {
        status,
        placements: outcome.decoded.placements,
        evaluation: outcome.evaluation,
        relaxed,
        infeasibility: None,
        interrupted: false,
        warnings,
        iterations: outcome.iterations,
        solve_time: started.elapsed(),
    }
}
