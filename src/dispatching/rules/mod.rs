//! Built-in dispatching rules.
//!
//! # Categories
//!
//! - **Time-based**: SPT, LPT, WSPT
//! - **Due-date**: EDD, MST, CR, ATC
//! - **Priority**: PRIORITY
//!
//! # Score Convention
//! All rules return lower scores for higher priority batches.
//!
//! # References
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::sync::Arc;

use super::{DispatchingRule, RuleScore, SchedulingContext};
use crate::solver::BatchJob;

/// Looks a rule up by its configuration name (case-insensitive).
///
/// Accepts the rule name (`"SPT"`) or its long form (`"shortest_processing_time"`).
pub fn by_name(name: &str) -> Option<Arc<dyn DispatchingRule>> {
    let rule: Arc<dyn DispatchingRule> = match name.trim().to_ascii_lowercase().as_str() {
        "spt" | "shortest_processing_time" => Arc::new(Spt),
        "lpt" | "longest_processing_time" => Arc::new(Lpt),
        "wspt" | "weighted_shortest_processing_time" => Arc::new(Wspt),
        "edd" | "earliest_due_date" => Arc::new(Edd),
        "mst" | "minimum_slack_time" => Arc::new(Mst),
        "cr" | "critical_ratio" => Arc::new(Cr),
        "atc" | "apparent_tardiness_cost" => Arc::new(Atc::default()),
        "priority" => Arc::new(Priority),
        _ => return None,
    };
    Some(rule)
}

/// Importance weight of a priority number: priority 1 weighs most.
fn urgency_weight(job: &BatchJob) -> f64 {
    100.0 / (job.priority.max(0) as f64 + 1.0)
}

// ======================== Time-based rules ========================

/// Shortest Processing Time.
///
/// Prioritizes batches with shorter duration.
///
/// # Reference
/// Smith (1956), optimal for minimizing mean flow time on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Spt;

impl DispatchingRule for Spt {
    fn name(&self) -> &'static str {
        "SPT"
    }

    fn evaluate(&self, job: &BatchJob, _context: &SchedulingContext) -> RuleScore {
        job.duration as f64
    }

    fn description(&self) -> &'static str {
        "Shortest Processing Time"
    }
}

/// Longest Processing Time.
///
/// Prioritizes long batches first; balances load across parallel machines.
#[derive(Debug, Clone, Copy)]
pub struct Lpt;

impl DispatchingRule for Lpt {
    fn name(&self) -> &'static str {
        "LPT"
    }

    fn evaluate(&self, job: &BatchJob, _context: &SchedulingContext) -> RuleScore {
        -(job.duration as f64)
    }

    fn description(&self) -> &'static str {
        "Longest Processing Time"
    }
}

/// Weighted Shortest Processing Time.
///
/// Ratio of importance to duration, importance derived from the priority
/// number (lower number = more important).
///
/// # Reference
/// Smith (1956), optimal for minimizing weighted mean flow time.
#[derive(Debug, Clone, Copy)]
pub struct Wspt;

impl DispatchingRule for Wspt {
    fn name(&self) -> &'static str {
        "WSPT"
    }

    fn evaluate(&self, job: &BatchJob, _context: &SchedulingContext) -> RuleScore {
        -(urgency_weight(job) / job.duration.max(1) as f64)
    }

    fn description(&self) -> &'static str {
        "Weighted Shortest Processing Time"
    }
}

// ======================== Due-date rules ========================

/// Earliest Due Date.
///
/// Batches without a deadline go last.
///
/// # Reference
/// Jackson (1955), optimal for minimizing maximum lateness on single machine.
#[derive(Debug, Clone, Copy)]
pub struct Edd;

impl DispatchingRule for Edd {
    fn name(&self) -> &'static str {
        "EDD"
    }

    fn evaluate(&self, job: &BatchJob, _context: &SchedulingContext) -> RuleScore {
        job.deadline.map(|d| d as f64).unwrap_or(f64::MAX)
    }

    fn description(&self) -> &'static str {
        "Earliest Due Date"
    }
}

/// Minimum Slack Time.
///
/// Slack = (deadline - current slot) - remaining work of the product.
#[derive(Debug, Clone, Copy)]
pub struct Mst;

impl DispatchingRule for Mst {
    fn name(&self) -> &'static str {
        "MST"
    }

    fn evaluate(&self, job: &BatchJob, context: &SchedulingContext) -> RuleScore {
        let Some(deadline) = job.deadline else {
            return f64::MAX;
        };
        deadline as f64 - context.current_slot as f64 - job.remaining_slots() as f64
    }

    fn description(&self) -> &'static str {
        "Minimum Slack Time"
    }
}

/// Critical Ratio.
///
/// CR = (deadline - current slot) / remaining work. Below 1.0 the product
/// is already behind.
#[derive(Debug, Clone, Copy)]
pub struct Cr;

impl DispatchingRule for Cr {
    fn name(&self) -> &'static str {
        "CR"
    }

    fn evaluate(&self, job: &BatchJob, context: &SchedulingContext) -> RuleScore {
        let Some(deadline) = job.deadline else {
            return f64::MAX;
        };
        let remaining = job.remaining_slots();
        if remaining == 0 {
            return f64::MAX;
        }
        (deadline as f64 - context.current_slot as f64) / remaining as f64
    }

    fn description(&self) -> &'static str {
        "Critical Ratio"
    }
}

/// Apparent Tardiness Cost.
///
/// WSPT scaled by an exponential deadline urgency. `k` trades the two off:
/// large `k` behaves like WSPT, small `k` like EDD.
///
/// # Reference
/// Vepsalainen & Morton (1987), "Priority Rules for Job Shops with
/// Weighted Tardiness Costs"
#[derive(Debug, Clone, Copy)]
pub struct Atc {
    /// Lookahead parameter (default: 2.0).
    pub k: f64,
}

impl Default for Atc {
    fn default() -> Self {
        Self { k: 2.0 }
    }
}

impl Atc {
    /// Creates an ATC rule with custom k parameter.
    pub fn with_k(k: f64) -> Self {
        Self { k }
    }
}

impl DispatchingRule for Atc {
    fn name(&self) -> &'static str {
        "ATC"
    }

    fn evaluate(&self, job: &BatchJob, context: &SchedulingContext) -> RuleScore {
        let processing = job.duration.max(1) as f64;
        let wspt = urgency_weight(job) / processing;
        let Some(deadline) = job.deadline else {
            return -wspt;
        };
        let slack = deadline as f64 - processing - context.current_slot as f64;
        let p_avg = context.average_duration.unwrap_or(processing).max(1.0);
        let urgency = if slack <= 0.0 {
            1.0
        } else {
            (-slack / (self.k * p_avg)).exp()
        };
        -(wspt * urgency)
    }

    fn description(&self) -> &'static str {
        "Apparent Tardiness Cost"
    }
}

// ======================== Priority-based rule ========================

/// Product priority.
///
/// Lower priority numbers are more urgent and go first.
#[derive(Debug, Clone, Copy)]
pub struct Priority;

impl DispatchingRule for Priority {
    fn name(&self) -> &'static str {
        "PRIORITY"
    }

    fn evaluate(&self, job: &BatchJob, _context: &SchedulingContext) -> RuleScore {
        job.priority as f64
    }

    fn description(&self) -> &'static str {
        "Product Priority"
    }
}
