//! Schedule invariants over generated plants.

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use chrono::{Datelike, Weekday};
use proptest::prelude::*;

use prodsched::compiler::compile;
use prodsched::loader::DomainModel;
use prodsched::materializer::materialize;
use prodsched::models::{
    parse_instant, Employee, Product, Resource, Schedule, WeekAvailability, WEEKDAYS,
};
use prodsched::solver::{solve, SolverConfig, SolverModel, Timeline};

const HORIZON_DAYS: u32 = 3;

fn availability(mask: u8) -> WeekAvailability {
    let days: Vec<Weekday> = WEEKDAYS
        .iter()
        .enumerate()
        .filter(|(i, _)| mask & (1 << i) != 0)
        .map(|(_, d)| *d)
        .collect();
    WeekAvailability::only(&days)
}

prop_compose! {
    fn plant()(
        masks in prop::collection::vec(0u8..128, 1..4),
        products in prop::collection::vec((1u32..4, 0u32..5, 1i32..6, any::<bool>()), 1..4),
        capacities in prop::collection::vec(1u32..3, 0..3),
    ) -> DomainModel {
        let employees = masks
            .iter()
            .enumerate()
            .map(|(i, &m)| Employee::new(format!("E{i}")).with_availability(availability(m)))
            .collect();
        let products = products
            .iter()
            .enumerate()
            .map(|(i, &(hours, batches, priority, on_line))| {
                let p = Product::new(format!("P{i}"))
                    .with_batch(hours as f64, 10.0)
                    .with_demand(batches as f64 * 10.0)
                    .with_priority(priority);
                if on_line { p.with_resource_type("Line") } else { p }
            })
            .collect();
        let resources = capacities
            .iter()
            .enumerate()
            .map(|(i, &c)| Resource::new(format!("R{i}"), "Line").with_capacity(c))
            .collect();
        DomainModel { employees, products, resources, ..Default::default() }
    }
}

fn run(domain: &DomainModel) -> Option<Schedule> {
    let start = parse_instant("2025-01-06").unwrap();
    let constraints = compile(domain, &[]);
    let timeline = Timeline::new(start, 60, HORIZON_DAYS);
    let mut model = SolverModel::build(domain, &constraints, timeline);
    let config = SolverConfig {
        time_limit: Duration::from_secs(2),
        workers: 1,
        max_iterations: 10,
        ..Default::default()
    };
    let solution = solve(&mut model, &config, Instant::now(), &AtomicBool::new(false));
    if !solution.status.is_feasible() {
        return None;
    }
    Some(materialize(&solution, &model).0)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn test_resource_capacity_never_exceeded(domain in plant()) {
        let Some(schedule) = run(&domain) else { return Ok(()) };
        let start = parse_instant("2025-01-06").unwrap();
        for resource in &domain.resources {
            for hour in 0..(HORIZON_DAYS as i64 * 24) {
                let t = start + chrono::Duration::hours(hour);
                let busy = schedule
                    .assignments
                    .iter()
                    .filter(|a| a.resource_id.as_deref() == Some(resource.id.as_str()))
                    .filter(|a| a.start_time <= t && t < a.end_time)
                    .count();
                prop_assert!(
                    busy <= resource.capacity as usize,
                    "{} runs {busy} batches at {t}",
                    resource.id
                );
            }
        }
    }

    #[test]
    fn test_employees_work_available_days_only(domain in plant()) {
        let Some(schedule) = run(&domain) else { return Ok(()) };
        for a in &schedule.assignments {
            let employee = domain.employees.iter().find(|e| e.id == a.employee_id).unwrap();
            prop_assert!(employee.availability.is_available(a.start_time.weekday()));
            for b in &schedule.assignments {
                if !std::ptr::eq(a, b) && a.employee_id == b.employee_id {
                    prop_assert!(a.end_time <= b.start_time || b.end_time <= a.start_time);
                }
            }
        }
    }

    #[test]
    fn test_unavailable_employee_gets_nothing(mut domain in plant()) {
        domain.employees.push(Employee::new("IDLE").with_availability(WeekAvailability::none()));
        let Some(schedule) = run(&domain) else { return Ok(()) };
        prop_assert!(schedule.assignments.iter().all(|a| a.employee_id != "IDLE"));
    }

    #[test]
    fn test_every_batch_scheduled_once(domain in plant()) {
        let Some(schedule) = run(&domain) else { return Ok(()) };
        for product in &domain.products {
            let placed = schedule
                .assignments
                .iter()
                .filter(|a| a.product_code == product.code)
                .count();
            prop_assert_eq!(placed, product.batch_count());
        }
    }
}
