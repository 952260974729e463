//! Infeasibility diagnosis.
//!
//! Cheap checks that run before search and name the constraint group that
//! makes the model unsolvable, plus a post-search diagnosis for batches the
//! decoder could not place.

use std::collections::BTreeSet;

use tracing::warn;

use super::decoder::{Decoded, FailureReason, Interrupt};
use super::{BatchJob, SolverModel, Timeline, ANY_RESOURCE_TYPE};
use crate::loader::DomainModel;
use crate::models::groups;

/// Stock comparisons tolerate this much rounding.
const STOCK_EPSILON: f64 = 1e-9;

/// Why a model has no feasible schedule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Infeasibility {
    /// Constraint group, see [`crate::models::groups`].
    pub constraint_group: String,
    pub message: String,
}

impl Infeasibility {
    pub fn new(group: &str, message: impl Into<String>) -> Self {
        Self {
            constraint_group: group.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for Infeasibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.constraint_group, self.message)
    }
}

/// Compares the batch work of `domain` with the employee slots of
/// `timeline` before any lane or batch is allocated.
///
/// Every batch holds one employee for its whole duration, so the work can
/// never exceed employees times slots. Returns the batch count.
pub fn demand_bound(domain: &DomainModel, timeline: &Timeline) -> Result<usize, Infeasibility> {
    let slots = timeline.slots;
    let mut batches = 0usize;
    let mut work = 0usize;
    for product in &domain.products {
        let count = product.batch_count();
        if count == 0 {
            continue;
        }
        let duration = product.batch_slots(timeline.granularity_minutes);
        if duration > slots {
            return Err(Infeasibility::new(
                groups::HORIZON,
                format!(
                    "a batch of {} needs {} slots but the horizon has {}",
                    product.code, duration, slots
                ),
            ));
        }
        batches = batches.saturating_add(count);
        work = work.saturating_add(count.saturating_mul(duration));
    }

    let capacity = domain.employees.len().saturating_mul(slots);
    if work > capacity {
        return Err(Infeasibility::new(
            groups::EMPLOYEE_AVAILABILITY,
            format!(
                "{batches} batches need {work} employee slots; \
                 {} employees offer at most {capacity}",
                domain.employees.len()
            ),
        ));
    }
    Ok(batches)
}

/// Runs the pre-search checks.
///
/// Unreachable deadlines are relaxed on the model and reported as
/// warnings; everything else that fails is returned as the cause. Once
/// `interrupt` is raised the remaining per-product checks are skipped, so
/// callers must test it before trusting an `Ok`.
pub fn precheck(
    model: &mut SolverModel,
    interrupt: &Interrupt,
) -> Result<Vec<String>, Infeasibility> {
    if model.jobs.is_empty() {
        return Ok(Vec::new());
    }
    let slots = model.timeline.slots;

    if let Some(job) = model.jobs.iter().find(|j| j.duration > slots) {
        return Err(Infeasibility::new(
            groups::HORIZON,
            format!(
                "a batch of {} needs {} slots but the horizon has {}",
                job.product_code, job.duration, slots
            ),
        ));
    }

    if model.employees.iter().all(|e| e.available_slots() == 0) {
        return Err(Infeasibility::new(
            groups::EMPLOYEE_AVAILABILITY,
            "no employee has any working slot in the horizon",
        ));
    }

    for product in first_batches(model) {
        if interrupt.is_raised() {
            return Ok(Vec::new());
        }
        let job = &model.jobs[product];
        let no_capacity = job.resources.iter().all(|&r| model.resources[r].total_capacity() == 0);
        if job.needs_resource && no_capacity {
            return Err(Infeasibility::new(
                groups::MACHINE_CAPACITY,
                format!(
                    "no {} resource with capacity for {}",
                    type_label(job),
                    job.product_code
                ),
            ));
        }

        let limit = job.latest_end.min(slots);
        if earliest_window(model, job, limit).is_none() {
            return Err(window_cause(model, job, limit));
        }
    }

    for (m, stock) in model.materials.iter().enumerate() {
        let needed: f64 = model
            .jobs
            .iter()
            .flat_map(|j| j.draws.iter())
            .filter(|d| d.material == m)
            .map(|d| d.kg)
            .sum();
        if needed > stock.quantity_kg + STOCK_EPSILON {
            return Err(Infeasibility::new(
                groups::MATERIAL_AVAILABILITY,
                format!(
                    "{} needs {:.2} kg but {:.2} kg are in stock",
                    stock.label(),
                    needed,
                    stock.quantity_kg
                ),
            ));
        }
    }

    let mut warnings = Vec::new();
    let unreachable: Vec<usize> = first_batches(model)
        .into_iter()
        .take_while(|_| !interrupt.is_raised())
        .filter(|&j| deadline_unreachable(model, &model.jobs[j]))
        .map(|j| model.jobs[j].product)
        .collect();
    for product in unreachable {
        let message = deadline_warning(model, product);
        warn!(product = %model.products[product].code, "{message}");
        warnings.push(message);
        model.relax_deadline(product);
    }

    Ok(warnings)
}

/// Explains why `decoded` left batches out.
pub fn diagnose(model: &SolverModel, decoded: &Decoded) -> Option<Infeasibility> {
    let failure = decoded.failures.first()?;
    let job = &model.jobs[failure.job];
    let cause = match failure.reason {
        FailureReason::MaterialStock { material } => Infeasibility::new(
            groups::MATERIAL_AVAILABILITY,
            format!(
                "not enough {} for every batch of {}",
                model.materials[material].label(),
                job.product_code
            ),
        ),
        FailureReason::NoSlot if job.latest_end < model.timeline.slots => Infeasibility::new(
            groups::MATERIAL_AVAILABILITY,
            format!(
                "materials of {} expire before all {} batches can be produced",
                job.product_code, job.count
            ),
        ),
        FailureReason::Interrupted => return None,
        FailureReason::NoSlot => {
            let demand: usize = model.jobs.iter().map(|j| j.duration).sum();
            let employee_supply: usize = model.employees.iter().map(|e| e.available_slots()).sum();
            let eligible: BTreeSet<usize> =
                model.jobs.iter().flat_map(|j| j.resources.iter().copied()).collect();
            let resource_supply: u64 =
                eligible.iter().map(|&r| model.resources[r].total_capacity()).sum();
            let resources_limit = model.jobs.iter().any(|j| j.needs_resource)
                && resource_supply < employee_supply as u64;
            if resources_limit {
                Infeasibility::new(
                    groups::MACHINE_CAPACITY,
                    format!(
                        "resource capacity ({resource_supply} slot-units) cannot fit \
                         {demand} batch slots alongside employee shifts"
                    ),
                )
            } else {
                Infeasibility::new(
                    groups::EMPLOYEE_AVAILABILITY,
                    format!(
                        "{employee_supply} available employee slots cannot cover \
                         {demand} batch slots"
                    ),
                )
            }
        }
    };
    Some(cause)
}

/// Index of the first batch of every product.
fn first_batches(model: &SolverModel) -> Vec<usize> {
    let mut seen = BTreeSet::new();
    model
        .jobs
        .iter()
        .enumerate()
        .filter(|(_, j)| seen.insert(j.product))
        .map(|(i, _)| i)
        .collect()
}

fn type_label(job: &BatchJob) -> &str {
    if job.type_key == ANY_RESOURCE_TYPE {
        "eligible"
    } else {
        &job.type_key
    }
}

fn employee_free(model: &SolverModel, range: std::ops::Range<usize>) -> bool {
    model.employees.iter().any(|e| e.available_for(range.clone()))
}

fn resource_free(model: &SolverModel, job: &BatchJob, range: std::ops::Range<usize>) -> bool {
    !job.needs_resource || job.resources.iter().any(|&r| model.resources[r].open_for(range.clone()))
}

/// Earliest start where an employee and a resource coexist for the whole
/// batch, ending at or before `limit`.
fn earliest_window(model: &SolverModel, job: &BatchJob, limit: usize) -> Option<usize> {
    if job.duration > limit {
        return None;
    }
    (0..=limit - job.duration).find(|&s| {
        let range = s..s + job.duration;
        employee_free(model, range.clone()) && resource_free(model, job, range)
    })
}

/// Picks the group that blocks every window for `job`.
fn window_cause(model: &SolverModel, job: &BatchJob, limit: usize) -> Infeasibility {
    let slots = model.timeline.slots;
    if limit < slots && earliest_window(model, job, slots).is_some() {
        return Infeasibility::new(
            groups::MATERIAL_AVAILABILITY,
            format!("materials of {} expire before any batch can finish", job.product_code),
        );
    }

    let d = job.duration;
    let employee_runs = (0..=slots - d).any(|s| employee_free(model, s..s + d));
    let resource_runs = (0..=slots - d).any(|s| resource_free(model, job, s..s + d));
    let employee_group = || {
        Infeasibility::new(
            groups::EMPLOYEE_AVAILABILITY,
            format!(
                "no employee is available for a whole {d}-slot batch of {}",
                job.product_code
            ),
        )
    };
    let resource_group = || {
        Infeasibility::new(
            groups::MACHINE_CAPACITY,
            format!(
                "no {} resource is open for a whole batch of {}",
                type_label(job),
                job.product_code
            ),
        )
    };

    match (employee_runs, resource_runs) {
        (false, _) => employee_group(),
        (true, false) => resource_group(),
        (true, true) => {
            // Both exist but never together: blame the scarcer side.
            let employee_slots: usize =
                model.employees.iter().map(|e| e.available_slots()).max().unwrap_or(0);
            let resource_slots = job
                .resources
                .iter()
                .map(|&r| model.resources[r].capacity.iter().filter(|&&c| c > 0).count())
                .max()
                .unwrap_or(0);
            if resource_slots < employee_slots {
                resource_group()
            } else {
                employee_group()
            }
        }
    }
}

/// Whether a product cannot finish by its deadline even without contention.
fn deadline_unreachable(model: &SolverModel, job: &BatchJob) -> bool {
    let Some(deadline) = job.deadline else {
        return false;
    };
    let limit = deadline.min(job.latest_end).min(model.timeline.slots);
    if earliest_window(model, job, limit).is_none() {
        return true;
    }
    let work = job.count * job.duration;
    let supply: usize = model
        .employees
        .iter()
        .map(|e| e.available[..limit].iter().filter(|&&a| a).count())
        .sum();
    supply < work
}

fn deadline_warning(model: &SolverModel, product: usize) -> String {
    let info = &model.products[product];
    let due = info
        .deadline
        .map(|d| model.timeline.instant(d).to_rfc3339())
        .unwrap_or_default();
    format!(
        "{} for {} cannot be met (due {}); minimizing lateness instead",
        info.deadline_label.as_deref().unwrap_or("deadline"),
        info.code,
        due
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{ConstraintSet, DeadlineAt, DeadlineRule};
    use crate::loader::DomainModel;
    use crate::models::{
        parse_instant, Employee, Material, MaterialUsage, Product, Resource, ResourceStatus,
        WeekAvailability,
    };
    use crate::solver::decoder::Decoder;
    use crate::solver::Timeline;
    use chrono::{Duration, Weekday};

    fn timeline() -> Timeline {
        Timeline::new(parse_instant("2025-01-06").unwrap(), 60, 7)
    }

    fn domain() -> DomainModel {
        DomainModel {
            employees: vec![Employee::new("E1")],
            products: vec![Product::new("P1")
                .with_batch(2.0, 10.0)
                .with_demand(30.0)
                .with_resource_type("Line")],
            resources: vec![Resource::new("R1", "Line")],
            ..Default::default()
        }
    }

    fn check(
        domain: &DomainModel,
        constraints: &ConstraintSet,
    ) -> Result<Vec<String>, Infeasibility> {
        let mut m = SolverModel::build(domain, constraints, timeline());
        precheck(&mut m, &Interrupt::never())
    }

    #[test]
    fn test_feasible_model_passes() {
        assert_eq!(check(&domain(), &ConstraintSet::default()), Ok(vec![]));
    }

    #[test]
    fn test_demand_bound() {
        assert_eq!(demand_bound(&domain(), &timeline()), Ok(3));

        let mut huge = domain();
        huge.products[0] = Product::new("P1").with_batch(1.0, 1.0).with_demand(1e15);
        let err = demand_bound(&huge, &timeline()).unwrap_err();
        assert_eq!(err.constraint_group, groups::EMPLOYEE_AVAILABILITY);
        assert!(err.message.contains("at most 168"));

        let mut long = domain();
        long.products[0] = Product::new("P1").with_batch(1e300, 1.0).with_demand(1.0);
        let err = demand_bound(&long, &timeline()).unwrap_err();
        assert_eq!(err.constraint_group, groups::HORIZON);

        let mut idle = domain();
        idle.employees.clear();
        idle.products[0] = Product::new("P1").with_batch(1.0, 1.0).with_demand(0.0);
        assert_eq!(demand_bound(&idle, &timeline()), Ok(0));
    }

    #[test]
    fn test_horizon() {
        let mut d = domain();
        d.products[0] = Product::new("P1").with_batch(200.0, 10.0).with_demand(10.0);
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::HORIZON);
    }

    #[test]
    fn test_no_working_employee() {
        let mut d = domain();
        d.employees = vec![Employee::new("E1").with_availability(WeekAvailability::none())];
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::EMPLOYEE_AVAILABILITY);
    }

    #[test]
    fn test_no_resource_of_type() {
        let mut d = domain();
        d.resources = vec![Resource::new("R1", "Assembly")];
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::MACHINE_CAPACITY);

        d.resources = vec![Resource::new("R1", "Line").with_status(ResourceStatus::Offline)];
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::MACHINE_CAPACITY);
    }

    #[test]
    fn test_batch_longer_than_shift() {
        let mut d = domain();
        d.products[0] = Product::new("P1").with_batch(12.0, 10.0).with_demand(10.0);
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::EMPLOYEE_AVAILABILITY);
    }

    #[test]
    fn test_material_shortage() {
        let mut d = domain();
        d.products[0] = d.products[0].clone().with_material(MaterialUsage::metered("M1", 5.0));
        d.materials = vec![Material::new("M1").with_quantity(12.0)];
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::MATERIAL_AVAILABILITY);
        assert!(err.message.contains("15.00"));
    }

    #[test]
    fn test_material_expired() {
        let mut d = domain();
        d.products[0] = d.products[0].clone().with_material(MaterialUsage::metered("M1", 1.0));
        d.materials = vec![Material::new("M1")
            .with_quantity(100.0)
            .with_expiry(parse_instant("2025-01-06T05:00:00Z").unwrap())];
        let err = check(&d, &ConstraintSet::default()).unwrap_err();
        assert_eq!(err.constraint_group, groups::MATERIAL_AVAILABILITY);
    }

    #[test]
    fn test_unreachable_deadline_is_relaxed() {
        let constraints = ConstraintSet {
            deadlines: vec![DeadlineRule {
                product_code: Some("P1".into()),
                due: DeadlineAt::Offset(Duration::hours(11)),
                weight: 1.0,
                label: "deadline".into(),
            }],
            ..Default::default()
        };
        let mut m = SolverModel::build(&domain(), &constraints, timeline());
        let warnings = precheck(&mut m, &Interrupt::never()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("P1"));
        assert!(m.relaxed_products.contains(&0));
        assert!(m.jobs.iter().all(|j| !j.hard_deadline));
    }

    #[test]
    fn test_reachable_deadline_is_kept() {
        let constraints = ConstraintSet {
            deadlines: vec![DeadlineRule {
                product_code: None,
                due: DeadlineAt::Offset(Duration::days(1)),
                weight: 1.0,
                label: "deadline".into(),
            }],
            ..Default::default()
        };
        let mut m = SolverModel::build(&domain(), &constraints, timeline());
        assert!(precheck(&mut m, &Interrupt::never()).unwrap().is_empty());
        assert!(m.jobs.iter().all(|j| j.hard_deadline));
    }

    #[test]
    fn test_diagnose_contention() {
        let mut d = domain();
        // Monday only: 10 working hours, 30 batch-hours of demand.
        let monday = WeekAvailability::only(&[Weekday::Mon]);
        d.employees = vec![Employee::new("E1").with_availability(monday)];
        d.products[0] = Product::new("P1").with_batch(2.0, 1.0).with_demand(15.0);
        let mut m = SolverModel::build(&d, &ConstraintSet::default(), timeline());
        assert!(precheck(&mut m, &Interrupt::never()).is_ok());
        let decoded = Decoder::new(&m).decode(&(0..m.jobs.len()).collect::<Vec<_>>());
        let cause = diagnose(&m, &decoded).unwrap();
        assert_eq!(cause.constraint_group, groups::EMPLOYEE_AVAILABILITY);
    }
}
