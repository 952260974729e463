//! Rule chain that builds the initial batch order.
//!
//! Rules are applied lexicographically: the second rule only separates
//! batches the first rule scores equal (within `epsilon`), and so on.
//!
//! # Reference
//! Haupt (1989), "A Survey of Priority Rule-Based Scheduling"

use std::cmp::Ordering;
use std::sync::Arc;

use super::{DispatchingRule, RuleScore, SchedulingContext};
use crate::solver::BatchJob;

/// Order of batches that every rule scores equal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TieBreaker {
    /// Keep input order (the sort is stable).
    #[default]
    InputOrder,
    /// Deterministic by (product code, batch number).
    ById,
}

/// An ordered chain of dispatching rules.
///
/// # Example
/// ```
/// use prodsched::dispatching::{rules, RuleEngine, TieBreaker};
///
/// let engine = RuleEngine::new()
///     .with_rule(rules::Priority)
///     .with_rule(rules::Edd)
///     .with_final_tie_breaker(TieBreaker::ById);
/// assert_eq!(engine.rule_names(), vec!["PRIORITY", "EDD"]);
/// ```
#[derive(Clone)]
pub struct RuleEngine {
    rules: Vec<Arc<dyn DispatchingRule>>,
    tie_breaker: TieBreaker,
    epsilon: f64,
}

impl RuleEngine {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            tie_breaker: TieBreaker::InputOrder,
            epsilon: 1e-9,
        }
    }

    /// Appends a rule to the chain.
    pub fn with_rule<R: DispatchingRule + 'static>(self, rule: R) -> Self {
        self.with_shared_rule(Arc::new(rule))
    }

    /// Appends a rule looked up by name.
    pub fn with_shared_rule(mut self, rule: Arc<dyn DispatchingRule>) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_final_tie_breaker(mut self, tie_breaker: TieBreaker) -> Self {
        self.tie_breaker = tie_breaker;
        self
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Scores of one batch, one per rule in chain order.
    pub fn scores(&self, job: &BatchJob, context: &SchedulingContext) -> Vec<RuleScore> {
        self.rules.iter().map(|r| r.evaluate(job, context)).collect()
    }

    /// Indices of `jobs` in dispatch order (most urgent first).
    pub fn sort_indices(&self, jobs: &[BatchJob], context: &SchedulingContext) -> Vec<usize> {
        let scores: Vec<Vec<RuleScore>> = jobs.iter().map(|j| self.scores(j, context)).collect();
        let mut order: Vec<usize> = (0..jobs.len()).collect();
        order.sort_by(|&a, &b| {
            self.compare_scores(&scores[a], &scores[b])
                .then_with(|| self.tie_break(&jobs[a], &jobs[b]))
        });
        order
    }

    fn compare_scores(&self, a: &[RuleScore], b: &[RuleScore]) -> Ordering {
        a.iter()
            .zip(b)
            .find(|(x, y)| (*x - *y).abs() > self.epsilon)
            .map_or(Ordering::Equal, |(x, y)| x.partial_cmp(y).unwrap_or(Ordering::Equal))
    }

    fn tie_break(&self, a: &BatchJob, b: &BatchJob) -> Ordering {
        match self.tie_breaker {
            TieBreaker::InputOrder => Ordering::Equal,
            TieBreaker::ById => a.key().cmp(&b.key()),
        }
    }
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RuleEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuleEngine")
            .field("rules", &self.rule_names())
            .field("tie_breaker", &self.tie_breaker)
            .finish()
    }
}
