//! Schedule materialization.
//!
//! Converts a slot-level [`Solution`] back into calendar time: one
//! [`Assignment`] per placed batch, the violations the run accepted, and
//! aggregate statistics for the dashboard.
//!
//! Output order is start time, then employee id, then product code, then
//! resource id, so identical solutions serialize identically.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{Assignment, Schedule, Violation};
use crate::solver::{Solution, SolverModel, SolverStatus};

/// Aggregate statistics of one optimization run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleStats {
    pub total_assignments: usize,
    /// Distinct employees with at least one assignment.
    pub employees_utilized: usize,
    /// Distinct products with at least one assignment.
    pub products_scheduled: usize,
    /// Distinct calendar days touched by assignments.
    pub days_covered: usize,
    pub solver_status: SolverStatus,
    pub solve_time_seconds: f64,
    /// From horizon start to the last end.
    pub makespan_hours: f64,
    /// Sum of per-product lateness past deadlines.
    pub total_lateness_hours: f64,
    pub objective: f64,
    /// Busy slot-units / available slot-units within the makespan, per resource id.
    pub resource_utilization: BTreeMap<String, f64>,
    /// Metered consumption per material id.
    pub material_consumption_kg: BTreeMap<String, f64>,
    pub search_iterations: u64,
}

/// Builds the calendar schedule and its statistics.
pub fn materialize(solution: &Solution, model: &SolverModel) -> (Schedule, ScheduleStats) {
    let timeline = &model.timeline;
    let mut schedule = Schedule::new();

    let mut rows: Vec<(Assignment, usize, Option<&str>)> = solution
        .placements
        .iter()
        .map(|p| {
            let job = &model.jobs[p.job];
            let mut assignment = Assignment::new(
                model.employees[p.employee].id.clone(),
                job.product_code.clone(),
                timeline.instant(p.start),
                timeline.instant(p.end),
            );
            let resource_name = p.resource.map(|r| {
                let lane = &model.resources[r];
                assignment.resource_id = Some(lane.id.clone());
                if lane.name.is_empty() {
                    lane.id.as_str()
                } else {
                    lane.name.as_str()
                }
            });
            (assignment, job.product, resource_name)
        })
        .collect();
    rows.sort_by(|(a, ..), (b, ..)| {
        (a.start_time, &a.employee_id, &a.product_code, &a.resource_id).cmp(&(
            b.start_time,
            &b.employee_id,
            &b.product_code,
            &b.resource_id,
        ))
    });

    // Batches of one product are interchangeable; number them in calendar order.
    let mut numbered: BTreeMap<usize, usize> = BTreeMap::new();
    for (assignment, product, resource_name) in rows {
        let info = &model.products[product];
        let n = numbered.entry(product).or_insert(0);
        *n += 1;
        let name = if info.name.is_empty() { &info.code } else { &info.name };
        let mut notes = format!("Batch {}/{} of {}", n, info.batch_count, name);
        if let Some(resource) = resource_name {
            notes.push_str(" on ");
            notes.push_str(resource);
        }
        schedule.add_assignment(assignment.with_notes(notes));
    }

    for &product in &solution.relaxed {
        let info = &model.products[product];
        let due = info.deadline.map(|d| timeline.instant(d).to_rfc3339()).unwrap_or_default();
        let finished = schedule
            .product_completion_time(&info.code)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();
        schedule.add_violation(Violation::deadline_miss(
            info.code.clone(),
            format!(
                "{} for {} (due {}) relaxed to lateness minimization; completes {}",
                info.deadline_label.as_deref().unwrap_or("deadline"),
                info.code,
                due,
                finished
            ),
        ));
    }
    for lane in model.employees.iter().filter(|e| e.available_slots() == 0) {
        schedule.add_violation(Violation::unschedulable(
            lane.id.clone(),
            format!("{} has no working slot in the horizon", lane.id),
        ));
    }

    let stats = statistics(solution, model, &schedule);
    (schedule, stats)
}

fn statistics(solution: &Solution, model: &SolverModel, schedule: &Schedule) -> ScheduleStats {
    let slot_hours = model.timeline.slot_hours();
    let makespan = solution.evaluation.makespan_slots;

    let mut busy: BTreeMap<usize, u64> = BTreeMap::new();
    for p in &solution.placements {
        if let Some(r) = p.resource {
            *busy.entry(r).or_default() += (p.end - p.start) as u64;
        }
    }
    let resource_utilization = model
        .resources
        .iter()
        .enumerate()
        .map(|(r, lane)| {
            let available: u64 = lane.capacity[..makespan.min(lane.capacity.len())]
                .iter()
                .map(|&c| c as u64)
                .sum();
            let used = busy.get(&r).copied().unwrap_or(0);
            let ratio = if available > 0 {
                used as f64 / available as f64
            } else {
                0.0
            };
            (lane.id.clone(), ratio)
        })
        .collect();

    let mut material_consumption_kg: BTreeMap<String, f64> = BTreeMap::new();
    for p in &solution.placements {
        for d in &model.jobs[p.job].draws {
            *material_consumption_kg
                .entry(model.materials[d.material].id.clone())
                .or_default() += d.kg;
        }
    }

    ScheduleStats {
        total_assignments: schedule.assignment_count(),
        employees_utilized: schedule.employees_utilized().len(),
        products_scheduled: schedule.products_scheduled().len(),
        days_covered: schedule.days_covered().len(),
        solver_status: solution.status,
        solve_time_seconds: solution.solve_time.as_secs_f64(),
        makespan_hours: makespan as f64 * slot_hours,
        total_lateness_hours: solution.evaluation.lateness_slots as f64 * slot_hours,
        objective: solution.evaluation.objective,
        resource_utilization,
        material_consumption_kg,
        search_iterations: solution.iterations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::ConstraintSet;
    use crate::loader::DomainModel;
    use crate::models::{
        parse_instant, Employee, Material, MaterialUsage, Product, Resource, ViolationType,
        WeekAvailability,
    };
    use crate::solver::{solve, SolverConfig, Timeline};
    use std::sync::atomic::AtomicBool;
    use std::time::Instant;

    fn run(domain: DomainModel) -> (Schedule, ScheduleStats) {
        let timeline = Timeline::new(parse_instant("2025-01-06").unwrap(), 60, 7);
        let mut model = SolverModel::build(&domain, &ConstraintSet::default(), timeline);
        let config = SolverConfig {
            workers: 1,
            max_iterations: 20,
            ..Default::default()
        };
        let solution = solve(&mut model, &config, Instant::now(), &AtomicBool::new(false));
        materialize(&solution, &model)
    }

    fn domain() -> DomainModel {
        DomainModel {
            employees: vec![
                Employee::new("EMP002"),
                Employee::new("EMP001"),
                Employee::new("EMP009").with_availability(WeekAvailability::none()),
            ],
            products: vec![Product::new("PROD001")
                .with_name("Widget")
                .with_batch(2.0, 50.0)
                .with_demand(100.0)
                .with_resource_type("Manufacturing")
                .with_material(MaterialUsage::metered("MAT001", 2.5))],
            materials: vec![Material::new("MAT001").with_quantity(50.0)],
            resources: vec![Resource::new("RES001", "Manufacturing")
                .with_name("Line A")
                .with_capacity(2)],
            ..Default::default()
        }
    }

    #[test]
    fn test_assignments() {
        let (schedule, _) = run(domain());
        assert_eq!(schedule.assignment_count(), 2);
        let a = &schedule.assignments[0];
        assert_eq!(a.employee_id, "EMP001");
        assert_eq!(a.start_time, parse_instant("2025-01-06T08:00:00Z").unwrap());
        assert_eq!(a.end_time, parse_instant("2025-01-06T10:00:00Z").unwrap());
        assert_eq!(a.resource_id.as_deref(), Some("RES001"));
        assert_eq!(a.notes, "Batch 1/2 of Widget on Line A");
        assert_eq!(schedule.assignments[1].employee_id, "EMP002");
        assert_eq!(schedule.assignments[1].notes, "Batch 2/2 of Widget on Line A");
    }

    #[test]
    fn test_stats() {
        let (_, stats) = run(domain());
        assert_eq!(stats.total_assignments, 2);
        assert_eq!(stats.employees_utilized, 2);
        assert_eq!(stats.products_scheduled, 1);
        assert_eq!(stats.days_covered, 1);
        assert_eq!(stats.solver_status, SolverStatus::Optimal);
        assert_eq!(stats.makespan_hours, 10.0);
        assert_eq!(stats.material_consumption_kg.get("MAT001"), Some(&5.0));
        // 4 busy slot-units of 20 available.
        assert!((stats.resource_utilization["RES001"] - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_unschedulable_employee_violation() {
        let (schedule, _) = run(domain());
        assert!(schedule
            .violations
            .iter()
            .any(|v| v.violation_type == ViolationType::Unschedulable && v.entity_id == "EMP009"));
    }

    #[test]
    fn test_stats_serialize() {
        let (_, stats) = run(domain());
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["solver_status"], "optimal");
        assert_eq!(json["total_assignments"], 2);
    }
}
