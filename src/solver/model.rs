//! Slot-level solver model.
//!
//! Everything the search needs, precomputed once per call: per-slot
//! employee availability, per-slot resource capacity, material stock, and
//! the batch jobs to place. Lanes are sorted by id so that "lowest id
//! first" tie-breaks fall out of plain index order.

use std::collections::BTreeSet;

use chrono::{Datelike, Duration};

use super::Timeline;
use crate::compiler::{ConstraintSet, ObjectiveWeights};
use crate::loader::DomainModel;
use crate::models::{Employee, Resource};

/// Ordering class of products without a resource type.
pub const ANY_RESOURCE_TYPE: &str = "*";

/// One employee's availability on the timeline.
#[derive(Debug, Clone)]
pub struct EmployeeLane {
    pub id: String,
    pub name: String,
    /// `available[slot]`: on shift, on an available weekday, not blocked.
    pub available: Vec<bool>,
}

impl EmployeeLane {
    /// Whether the employee is available for every slot of `range`.
    #[inline]
    pub fn available_for(&self, range: std::ops::Range<usize>) -> bool {
        self.available.get(range).is_some_and(|s| s.iter().all(|&a| a))
    }

    /// Number of available slots.
    pub fn available_slots(&self) -> usize {
        self.available.iter().filter(|&&a| a).count()
    }
}

/// One resource's capacity on the timeline.
#[derive(Debug, Clone)]
pub struct ResourceLane {
    pub id: String,
    pub name: String,
    pub resource_type: String,
    /// `capacity[slot]`: concurrent jobs allowed.
    pub capacity: Vec<u32>,
}

impl ResourceLane {
    /// Whether the resource has capacity in every slot of `range`.
    #[inline]
    pub fn open_for(&self, range: std::ops::Range<usize>) -> bool {
        self.capacity.get(range).is_some_and(|s| s.iter().all(|&c| c > 0))
    }

    /// Sum of capacity over all slots.
    pub fn total_capacity(&self) -> u64 {
        self.capacity.iter().map(|&c| c as u64).sum()
    }
}

/// Material stock.
#[derive(Debug, Clone)]
pub struct MaterialStock {
    pub id: String,
    pub name: String,
    pub quantity_kg: f64,
    /// Batches drawing on this material must end at or before this slot.
    pub usable_until: usize,
}

impl MaterialStock {
    /// Display name, falling back to the id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Per-batch consumption of one material.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialDraw {
    /// Index into [`SolverModel::materials`].
    pub material: usize,
    pub kg: f64,
}

/// Product-level facts the materializer and diagnostics need.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub code: String,
    pub name: String,
    pub priority: i32,
    pub batch_count: usize,
    pub demand_units: f64,
    pub batch_size: f64,
    /// Deadline as a slot bound.
    pub deadline: Option<usize>,
    /// Label of the deadline record.
    pub deadline_label: Option<String>,
}

/// One batch to place.
#[derive(Debug, Clone)]
pub struct BatchJob {
    /// Index into [`SolverModel::products`].
    pub product: usize,
    pub product_code: String,
    /// 0-based batch number within the product.
    pub index: usize,
    /// Batches of this product.
    pub count: usize,
    /// Length in slots (>= 1).
    pub duration: usize,
    pub priority: i32,
    /// Batch must end at or before this slot.
    pub deadline: Option<usize>,
    /// Whether the deadline is still enforced.
    pub hard_deadline: bool,
    /// Lateness weight.
    pub deadline_weight: f64,
    /// Material expiry bound on the end slot.
    pub latest_end: usize,
    /// Eligible resource lanes (ascending id).
    pub resources: Vec<usize>,
    /// Whether a resource is required at all.
    pub needs_resource: bool,
    /// Resource type class for strict priority ordering.
    pub type_key: String,
    pub draws: Vec<MaterialDraw>,
}

impl BatchJob {
    /// A single batch with no deadline, resource or material needs.
    pub fn new(product_code: impl Into<String>, duration: usize) -> Self {
        Self {
            product: 0,
            product_code: product_code.into(),
            index: 0,
            count: 1,
            duration: duration.max(1),
            priority: crate::models::DEFAULT_PRIORITY,
            deadline: None,
            hard_deadline: false,
            deadline_weight: 1.0,
            latest_end: usize::MAX,
            resources: Vec::new(),
            needs_resource: false,
            type_key: ANY_RESOURCE_TYPE.to_string(),
            draws: Vec::new(),
        }
    }

    /// Whether strict priority orders this batch against batches of
    /// `type_key`. Untyped batches may take any resource, so they compete
    /// with every type.
    pub fn competes_with(&self, type_key: &str) -> bool {
        self.type_key == type_key
            || self.type_key == ANY_RESOURCE_TYPE
            || type_key == ANY_RESOURCE_TYPE
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets a hard deadline.
    pub fn with_deadline(mut self, slot: usize) -> Self {
        self.deadline = Some(slot);
        self.hard_deadline = true;
        self
    }

    /// Sets the batch number and batch count.
    pub fn with_index(mut self, index: usize, count: usize) -> Self {
        self.index = index;
        self.count = count;
        self
    }

    /// Stable identity used for final tie-breaks.
    pub fn key(&self) -> (&str, usize) {
        (&self.product_code, self.index)
    }

    /// Slots of work left for the product from this batch on.
    pub fn remaining_slots(&self) -> usize {
        (self.count - self.index.min(self.count)) * self.duration
    }
}

/// The complete slot-level model of one call.
#[derive(Debug, Clone)]
pub struct SolverModel {
    pub timeline: Timeline,
    pub employees: Vec<EmployeeLane>,
    pub resources: Vec<ResourceLane>,
    pub materials: Vec<MaterialStock>,
    pub products: Vec<ProductInfo>,
    pub jobs: Vec<BatchJob>,
    pub strict_priority: bool,
    pub weights: ObjectiveWeights,
    /// Products whose deadline was found unreachable before search.
    pub relaxed_products: BTreeSet<usize>,
}

impl SolverModel {
    /// Builds the model for a validated domain and its compiled constraints.
    pub fn build(domain: &DomainModel, constraints: &ConstraintSet, timeline: Timeline) -> Self {
        let mut employees: Vec<EmployeeLane> = domain
            .employees
            .iter()
            .map(|e| employee_lane(e, constraints, &timeline))
            .collect();
        employees.sort_by(|a, b| a.id.cmp(&b.id));

        let mut resources: Vec<ResourceLane> = domain
            .resources
            .iter()
            .map(|r| resource_lane(r, constraints, &timeline))
            .collect();
        resources.sort_by(|a, b| a.id.cmp(&b.id));

        let materials: Vec<MaterialStock> = domain
            .materials
            .iter()
            .map(|m| MaterialStock {
                id: m.id.clone(),
                name: m.name.clone(),
                quantity_kg: m.quantity_kg,
                usable_until: m.expiry.map_or(timeline.slots, |t| timeline.slots_until(t)),
            })
            .collect();

        let mut products = Vec::with_capacity(domain.products.len());
        let mut jobs = Vec::new();
        for (p_idx, product) in domain.products.iter().enumerate() {
            let rule = constraints
                .deadlines
                .iter()
                .filter(|d| d.product_code.as_deref().map_or(true, |c| c == product.code))
                .min_by_key(|d| d.due.resolve(timeline.start));
            let deadline = rule.map(|d| timeline.slots_until(d.due.resolve(timeline.start)));
            let deadline_weight = rule.map_or(1.0, |d| d.weight);

            let (eligible, needs_resource) = match &product.resource_type {
                Some(t) => (
                    resources
                        .iter()
                        .enumerate()
                        .filter(|(_, r)| r.resource_type.eq_ignore_ascii_case(t.trim()))
                        .map(|(i, _)| i)
                        .collect::<Vec<_>>(),
                    true,
                ),
                None => ((0..resources.len()).collect(), !resources.is_empty()),
            };
            let type_key = product
                .resource_type
                .as_deref()
                .map_or_else(|| ANY_RESOURCE_TYPE.to_string(), |t| t.trim().to_ascii_lowercase());

            let draws: Vec<MaterialDraw> = product
                .materials
                .iter()
                .filter_map(|usage| {
                    let kg = usage.kg_per_batch?;
                    let material = materials
                        .iter()
                        .position(|m| m.id.eq_ignore_ascii_case(usage.material.trim()))
                        .or_else(|| {
                            domain.materials.iter().position(|m| m.matches(&usage.material))
                        })?;
                    Some(MaterialDraw { material, kg })
                })
                .collect();
            let latest_end = draws
                .iter()
                .map(|d| materials[d.material].usable_until)
                .min()
                .unwrap_or(timeline.slots);

            let count = product.batch_count();
            let duration = product.batch_slots(timeline.granularity_minutes);
            for index in 0..count {
                jobs.push(BatchJob {
                    product: p_idx,
                    product_code: product.code.clone(),
                    index,
                    count,
                    duration,
                    priority: product.priority,
                    deadline,
                    hard_deadline: deadline.is_some(),
                    deadline_weight,
                    latest_end,
                    resources: eligible.clone(),
                    needs_resource,
                    type_key: type_key.clone(),
                    draws: draws.clone(),
                });
            }

            products.push(ProductInfo {
                code: product.code.clone(),
                name: product.name.clone(),
                priority: product.priority,
                batch_count: count,
                demand_units: product.demand_units,
                batch_size: product.batch_size,
                deadline,
                deadline_label: rule.map(|d| d.label.clone()),
            });
        }

        Self {
            timeline,
            employees,
            resources,
            materials,
            products,
            jobs,
            strict_priority: constraints.strict_priority(),
            weights: constraints.weights,
            relaxed_products: BTreeSet::new(),
        }
    }

    /// Drops the hard deadline of every batch of a product.
    pub fn relax_deadline(&mut self, product: usize) {
        self.relaxed_products.insert(product);
        for job in self.jobs.iter_mut().filter(|j| j.product == product) {
            job.hard_deadline = false;
        }
    }
}

fn employee_lane(
    employee: &Employee,
    constraints: &ConstraintSet,
    timeline: &Timeline,
) -> EmployeeLane {
    let fits_shift = timeline.granularity_minutes <= employee.shift.length_minutes();
    let mut available: Vec<bool> = (0..timeline.slots)
        .map(|slot| {
            let start = timeline.instant(slot);
            let last = timeline.instant(slot + 1) - Duration::minutes(1);
            fits_shift && employee.works_at(start) && employee.works_at(last)
        })
        .collect();

    for block in constraints
        .employee_blocks
        .iter()
        .filter(|b| b.employee_id.as_deref().map_or(true, |id| id == employee.id))
    {
        for (slot, flag) in available.iter_mut().enumerate() {
            let start = timeline.instant(slot);
            let last = timeline.instant(slot + 1) - Duration::minutes(1);
            if block.days.contains(&start.weekday()) || block.days.contains(&last.weekday()) {
                *flag = false;
            }
        }
        for window in &block.windows {
            for slot in timeline.slots_overlapping(window.start, window.end) {
                available[slot] = false;
            }
        }
    }

    EmployeeLane {
        id: employee.id.clone(),
        name: employee.name.clone(),
        available,
    }
}

fn resource_lane(
    resource: &Resource,
    constraints: &ConstraintSet,
    timeline: &Timeline,
) -> ResourceLane {
    let mut capacity: Vec<u32> = (0..timeline.slots)
        .map(|slot| resource.capacity_during(timeline.instant(slot), timeline.instant(slot + 1)))
        .collect();

    for o in constraints
        .capacity_overrides
        .iter()
        .filter(|o| o.resource_id.as_deref().map_or(true, |id| id == resource.id))
    {
        if let Some(cap) = o.max_concurrent {
            capacity.iter_mut().for_each(|c| *c = (*c).min(cap));
        }
        for window in &o.windows {
            for slot in timeline.slots_overlapping(window.start, window.end) {
                capacity[slot] = 0;
            }
        }
    }

    ResourceLane {
        id: resource.id.clone(),
        name: resource.name.clone(),
        resource_type: resource.resource_type.clone(),
        capacity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CapacityOverride, DeadlineAt, DeadlineRule, EmployeeBlock};
    use crate::models::{
        parse_instant, Material, MaterialUsage, Product, ResourceStatus, Shift, TimeWindow,
        WeekAvailability,
    };
    use chrono::Weekday;

    // 2025-01-06 is a Monday.
    fn timeline() -> Timeline {
        Timeline::new(parse_instant("2025-01-06").unwrap(), 60, 7)
    }

    fn domain() -> DomainModel {
        DomainModel {
            employees: vec![
                Employee::new("EMP002").with_availability(WeekAvailability::only(&[Weekday::Tue])),
                Employee::new("EMP001"),
            ],
            products: vec![Product::new("PROD001")
                .with_batch(2.5, 50.0)
                .with_demand(120.0)
                .with_resource_type("Manufacturing")
                .with_material(MaterialUsage::metered("Steel Sheets", 3.0))],
            materials: vec![Material::new("MAT001")
                .with_name("Steel Sheets")
                .with_quantity(100.0)
                .with_expiry(parse_instant("2025-01-09").unwrap())],
            resources: vec![
                Resource::new("RES002", "Assembly"),
                Resource::new("RES001", "Manufacturing").with_capacity(2),
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_lanes_sorted_and_shifted() {
        let m = SolverModel::build(&domain(), &ConstraintSet::default(), timeline());
        assert_eq!(m.employees[0].id, "EMP001");
        assert_eq!(m.resources[0].id, "RES001");

        let e1 = &m.employees[0];
        assert!(!e1.available[7]);
        assert!(e1.available[8]);
        assert!(e1.available[17]);
        assert!(!e1.available[18]);
        assert_eq!(e1.available_slots(), 70);

        // EMP002 works Tuesdays only.
        let e2 = &m.employees[1];
        assert!(!e2.available[8]);
        assert!(e2.available[24 + 8]);
        assert_eq!(e2.available_slots(), 10);
    }

    #[test]
    fn test_competes_with() {
        let mut oven = BatchJob::new("P1", 1);
        oven.type_key = "oven".to_string();
        let any = BatchJob::new("P2", 1);
        assert!(oven.competes_with("oven"));
        assert!(!oven.competes_with("line"));
        assert!(oven.competes_with(ANY_RESOURCE_TYPE));
        assert!(any.competes_with("line"));
    }

    #[test]
    fn test_jobs() {
        let m = SolverModel::build(&domain(), &ConstraintSet::default(), timeline());
        assert_eq!(m.jobs.len(), 3);
        let j = &m.jobs[2];
        assert_eq!(j.index, 2);
        assert_eq!(j.duration, 3);
        assert_eq!(j.resources, vec![0]);
        assert!(j.needs_resource);
        assert_eq!(j.type_key, "manufacturing");
        assert_eq!(j.draws, vec![MaterialDraw { material: 0, kg: 3.0 }]);
        // Expires 2025-01-09 00:00 = slot 72.
        assert_eq!(j.latest_end, 72);
        assert_eq!(j.remaining_slots(), 3);
    }

    #[test]
    fn test_blocks_and_overrides() {
        let start = parse_instant("2025-01-06T10:00:00Z").unwrap();
        let constraints = ConstraintSet {
            employee_blocks: vec![EmployeeBlock {
                employee_id: Some("EMP001".into()),
                days: vec![Weekday::Wed],
                windows: vec![TimeWindow::new(start, start + Duration::hours(2))],
            }],
            capacity_overrides: vec![CapacityOverride {
                resource_id: None,
                max_concurrent: Some(1),
                windows: vec![],
            }],
            ..Default::default()
        };
        let m = SolverModel::build(&domain(), &constraints, timeline());
        let e1 = &m.employees[0];
        assert!(!e1.available[10] && !e1.available[11] && e1.available[12]);
        assert!(!e1.available[48 + 9]);
        assert_eq!(m.resources[0].capacity[0], 1);
    }

    #[test]
    fn test_out_of_service_resource() {
        let mut d = domain();
        d.resources[1] =
            Resource::new("RES001", "Manufacturing").with_status(ResourceStatus::Maintenance);
        let m = SolverModel::build(&d, &ConstraintSet::default(), timeline());
        assert_eq!(m.resources[0].total_capacity(), 0);
    }

    #[test]
    fn test_night_shift_uses_each_days_flag() {
        let mut d = domain();
        d.employees = vec![Employee::new("E")
            .with_shift(Shift::Night)
            .with_availability(WeekAvailability::only(&[Weekday::Mon]))];
        let m = SolverModel::build(&d, &ConstraintSet::default(), timeline());
        let lane = &m.employees[0];
        assert!(lane.available[0]); // Monday 00:00
        assert!(lane.available[23]); // Monday 23:00
        assert!(!lane.available[24]); // Tuesday 00:00
    }

    #[test]
    fn test_deadline_bound() {
        let constraints = ConstraintSet {
            deadlines: vec![DeadlineRule {
                product_code: Some("PROD001".into()),
                due: DeadlineAt::Offset(Duration::days(2)),
                weight: 1.0,
                label: "deadline".into(),
            }],
            ..Default::default()
        };
        let mut m = SolverModel::build(&domain(), &constraints, timeline());
        assert_eq!(m.jobs[0].deadline, Some(48));
        assert!(m.jobs[0].hard_deadline);
        m.relax_deadline(0);
        assert!(m.jobs.iter().all(|j| !j.hard_deadline));
        assert!(m.relaxed_products.contains(&0));
    }
}
