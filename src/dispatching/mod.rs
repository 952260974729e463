//! Dispatching rules and rule engine for batch ordering.
//!
//! The solver places batches greedily in list order; this module decides
//! that initial order. Rules are composable so the order can be tuned
//! from configuration (e.g. `["priority", "edd", "spt"]`).
//!
//! # Usage
//!
//! ```
//! use prodsched::dispatching::{rules, RuleEngine, SchedulingContext, TieBreaker};
//!
//! let engine = RuleEngine::new()
//!     .with_rule(rules::Priority)
//!     .with_rule(rules::Edd)
//!     .with_final_tie_breaker(TieBreaker::ById);
//! let order = engine.sort_indices(&[], &SchedulingContext::at_slot(0));
//! assert!(order.is_empty());
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 4
//! - Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

mod context;
mod engine;
pub mod rules;

pub use context::SchedulingContext;
pub use engine::{RuleEngine, TieBreaker};

use crate::solver::BatchJob;
use std::fmt::Debug;

/// Score returned by a dispatching rule.
///
/// Lower scores = higher priority (placed first).
pub type RuleScore = f64;

/// A dispatching rule that evaluates batch priority.
///
/// # Score Convention
/// **Lower score = higher priority.** Rules should return smaller values
/// for batches that should be placed first.
///
/// # Reference
/// Pinedo (2016), "Scheduling", Ch. 4: Priority Dispatching
pub trait DispatchingRule: Send + Sync + Debug {
    /// Rule name (e.g., "SPT", "EDD").
    fn name(&self) -> &'static str;

    /// Evaluates the priority of a batch given the current context.
    ///
    /// Returns a score where lower = higher priority.
    fn evaluate(&self, job: &BatchJob, context: &SchedulingContext) -> RuleScore;

    /// Rule description.
    fn description(&self) -> &'static str {
        self.name()
    }
}
