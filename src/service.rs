//! Optimization service facade.
//!
//! Runs the whole pipeline for one request:
//!
//! ```text
//! request → load/validate → compile → pre-check → search → materialize
//! ```
//!
//! Each call runs on its own blocking worker under a hard time ceiling.
//! When the caller's future is dropped (client gone, ceiling hit), the
//! search workers see the cancel flag and stop. No state survives a call.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::compiler::compile;
use crate::config::ServiceConfig;
use crate::error::OptimizationError;
use crate::loader::{
    load, DomainModel, RawConstraint, RawEmployee, RawMaterial, RawProduct, RawResource,
};
use crate::materializer::{materialize, ScheduleStats};
use crate::models::{parse_instant, Employee, Product, Schedule};
use crate::sandbox::{SandboxError, ScriptRequest, ScriptRunner};
use crate::solver::precheck::demand_bound;
use crate::solver::{solve, SolverConfig, SolverModel, SolverStatus, Timeline};
use crate::validation::ValidationError;

/// Extra time past the search limit for materialization before the call
/// is abandoned.
const CEILING_GRACE: Duration = Duration::from_millis(500);

/// Budget of the health check.
const HEALTH_BUDGET: Duration = Duration::from_secs(1);

/// Body of an optimization request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizeRequest {
    pub employees: Vec<RawEmployee>,
    pub products: Vec<RawProduct>,
    pub materials: Vec<RawMaterial>,
    pub resources: Vec<RawResource>,
    pub constraints: Vec<RawConstraint>,
    /// RFC 3339 or `YYYY-MM-DD`; defaults to today 00:00 UTC.
    pub horizon_start: Option<String>,
    pub horizon_days: Option<u32>,
    pub granularity_minutes: Option<u32>,
    pub time_limit_seconds: Option<f64>,
    pub seed: Option<u64>,
}

/// A successful optimization.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleResult {
    pub status: SolverStatus,
    pub schedule: Schedule,
    pub stats: ScheduleStats,
    /// Loader, compiler and solver warnings, in that order.
    pub warnings: Vec<String>,
}

/// Outcome of a custom script run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

/// Sets the cancel flag when the owning call goes away.
struct CancelOnDrop(Arc<AtomicBool>);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Relaxed);
    }
}

/// The optimization service.
#[derive(Debug, Clone)]
pub struct OptimizerService {
    config: Arc<ServiceConfig>,
    runner: ScriptRunner,
}

impl OptimizerService {
    pub fn new(config: ServiceConfig) -> Self {
        let runner = ScriptRunner::new(config.sandbox.clone());
        Self {
            config: Arc::new(config),
            runner,
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Optimizes one request under the configured time ceiling.
    pub async fn optimize(
        &self,
        request: OptimizeRequest,
    ) -> Result<ScheduleResult, OptimizationError> {
        let started = Instant::now();
        let fingerprint = fingerprint(&request);
        let limit = self.config.solver.time_limit(request.time_limit_seconds);
        info!(
            %fingerprint,
            employees = request.employees.len(),
            products = request.products.len(),
            time_limit_seconds = limit.as_secs_f64(),
            "optimization requested"
        );

        let cancel = Arc::new(AtomicBool::new(false));
        let _guard = CancelOnDrop(Arc::clone(&cancel));
        let service = self.clone();
        let task = tokio::task::spawn_blocking(move || {
            service.optimize_blocking(&request, started, &cancel)
        });

        let result = match tokio::time::timeout(limit + CEILING_GRACE, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => {
                let message = if join.is_panic() {
                    "solver worker panicked".to_string()
                } else {
                    join.to_string()
                };
                error!(%fingerprint, %message, "internal solver failure");
                Err(OptimizationError::InternalSolver { message, fingerprint: fingerprint.clone() })
            }
            Err(_) => {
                warn!(%fingerprint, "time ceiling reached");
                Err(OptimizationError::TimeoutExceeded { limit })
            }
        };

        match &result {
            Ok(r) => info!(
                %fingerprint,
                status = r.status.as_str(),
                assignments = r.stats.total_assignments,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "optimization finished"
            ),
            Err(e) => info!(%fingerprint, kind = e.kind(), error = %e, "optimization failed"),
        }
        result
    }

    /// Runs the pipeline on the current thread.
    ///
    /// `started` anchors the time limit; `cancel` stops the search early.
    pub fn optimize_blocking(
        &self,
        request: &OptimizeRequest,
        started: Instant,
        cancel: &AtomicBool,
    ) -> Result<ScheduleResult, OptimizationError> {
        let settings = &self.config.solver;
        let domain = load(
            &request.employees,
            &request.products,
            &request.materials,
            &request.resources,
            &request.constraints,
        )?;
        let timeline = self.timeline(request)?;
        let batches = demand_bound(&domain, &timeline)?;
        self.check_size(&domain, &timeline, batches)?;

        let constraints = compile(&domain, &domain.constraints);
        let mut warnings = domain.warnings.clone();
        warnings.extend(constraints.warnings.iter().map(ToString::to_string));

        let limit = settings.time_limit(request.time_limit_seconds);
        let config = settings.solver_config(limit, request.seed);
        let mut model = SolverModel::build(&domain, &constraints, timeline);
        let solution = solve(&mut model, &config, started, cancel);
        warnings.extend(solution.warnings.iter().cloned());

        if solution.interrupted {
            return Err(OptimizationError::TimeoutExceeded { limit: config.time_limit });
        }
        if let Some(cause) = solution.infeasibility.clone() {
            return Err(cause.into());
        }

        let (schedule, stats) = materialize(&solution, &model);
        Ok(ScheduleResult {
            status: solution.status,
            schedule,
            stats,
            warnings,
        })
    }

    fn timeline(&self, request: &OptimizeRequest) -> Result<Timeline, Vec<ValidationError>> {
        let settings = &self.config.solver;
        let mut errors = Vec::new();

        let start = match request.horizon_start.as_deref().map(str::trim) {
            None | Some("") => today(),
            Some(raw) => parse_instant(raw).unwrap_or_else(|| {
                errors.push(ValidationError::invalid(
                    "request",
                    "horizon_start",
                    format!("'{raw}' is not a date"),
                ));
                today()
            }),
        };
        let days = request.horizon_days.unwrap_or(settings.horizon_days);
        if days == 0 {
            errors.push(ValidationError::invalid("request", "horizon_days", "must be at least 1"));
        }
        let granularity = request.granularity_minutes.unwrap_or(settings.granularity_minutes);
        if granularity == 0 || granularity > 24 * 60 {
            errors.push(ValidationError::invalid(
                "request",
                "granularity_minutes",
                "must be between 1 and 1440",
            ));
        }

        if errors.is_empty() {
            let slots = u64::from(days) * 24 * 60 / u64::from(granularity);
            if slots > settings.max_slots as u64 {
                errors.push(ValidationError::invalid(
                    "request",
                    "horizon_days",
                    format!(
                        "{days} days at {granularity} min is {slots} slots; the limit is {}",
                        settings.max_slots
                    ),
                ));
            } else if chrono::Duration::try_days(i64::from(days))
                .and_then(|d| start.checked_add_signed(d))
                .is_none()
            {
                errors.push(ValidationError::invalid(
                    "request",
                    "horizon_days",
                    "horizon ends past the last representable date",
                ));
            }
        }

        if errors.is_empty() {
            Ok(Timeline::new(start, granularity, days))
        } else {
            Err(errors)
        }
    }

    /// Rejects requests whose lanes or batches exceed the configured caps.
    fn check_size(
        &self,
        domain: &DomainModel,
        timeline: &Timeline,
        batches: usize,
    ) -> Result<(), Vec<ValidationError>> {
        let settings = &self.config.solver;
        let mut errors = Vec::new();

        let lanes = domain.employees.len().saturating_add(domain.resources.len());
        let lane_slots = lanes.saturating_mul(timeline.slots);
        if lane_slots > settings.max_lane_slots {
            errors.push(ValidationError::invalid(
                "request",
                "employees",
                format!(
                    "{lanes} employees and resources over {} slots exceed {} lane slots",
                    timeline.slots, settings.max_lane_slots
                ),
            ));
        }
        if batches > settings.max_batches {
            errors.push(ValidationError::invalid(
                "request",
                "products",
                format!(
                    "demand expands to {batches} batches; the limit is {}",
                    settings.max_batches
                ),
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Whether a trivial one-batch model solves within one second.
    pub async fn health(&self) -> bool {
        let check = tokio::task::spawn_blocking(|| {
            let domain = DomainModel {
                employees: vec![Employee::new("HEALTH")],
                products: vec![Product::new("HEALTH").with_batch(1.0, 1.0).with_demand(1.0)],
                ..Default::default()
            };
            let constraints = compile(&domain, &[]);
            let timeline = Timeline::new(today(), 60, 1);
            let mut model = SolverModel::build(&domain, &constraints, timeline);
            let config = SolverConfig {
                time_limit: HEALTH_BUDGET,
                workers: 1,
                max_iterations: 0,
                ..Default::default()
            };
            let solution = solve(&mut model, &config, Instant::now(), &AtomicBool::new(false));
            solution.status.is_feasible() && solution.placements.len() == 1
        });
        matches!(tokio::time::timeout(HEALTH_BUDGET, check).await, Ok(Ok(true)))
    }

    /// Runs a caller-supplied script in the sandbox.
    ///
    /// Failures are reported in the result, never as an error.
    pub async fn execute_custom_script(&self, request: ScriptRequest) -> ExecutionResult {
        info!(script_bytes = request.script.len(), "custom script requested");
        match self.runner.run(&request).await {
            Ok(out) => ExecutionResult {
                success: true,
                result: out.result,
                output: Some(out.stdout),
                error: None,
                traceback: (!out.stderr.is_empty()).then_some(out.stderr),
            },
            Err(e) => {
                warn!(error = %e, "custom script failed");
                script_failure(e)
            }
        }
    }
}

fn script_failure(e: SandboxError) -> ExecutionResult {
    ExecutionResult {
        success: false,
        result: None,
        output: e.stdout().map(str::to_string),
        traceback: e.stderr().map(str::to_string),
        error: Some(e.to_string()),
    }
}

/// Midnight UTC today.
fn today() -> DateTime<Utc> {
    Utc::now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

/// Short SHA-256 fingerprint of a request, for correlating log lines.
pub fn fingerprint(request: &OptimizeRequest) -> String {
    let mut hasher = Sha256::new();
    match serde_json::to_vec(request) {
        Ok(bytes) => hasher.update(&bytes),
        Err(_) => hasher.update(format!("{request:?}").as_bytes()),
    }
    hex::encode(&hasher.finalize()[..8])
}
