//! Schedule (solution) model.
//!
//! A schedule is the complete list of batch assignments proposed by one
//! optimization run, plus any soft-constraint violations the run had to
//! accept (for example a deadline relaxed to lateness minimization).
//! It is always produced whole; callers replace their stored `scheduled`
//! assignments with it in one step.
//!
//! # Reference
//! Pinedo (2016), "Scheduling", Ch. 3

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A complete schedule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schedule {
    /// Batch assignments.
    pub assignments: Vec<Assignment>,
    /// Accepted soft-constraint violations.
    pub violations: Vec<Violation>,
}

/// One batch assigned to an employee (and resource) for a time interval.
///
/// Field names match the dashboard's `assignments` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Assigned employee.
    pub employee_id: String,
    /// Product being produced.
    pub product_code: String,
    /// Resource the batch runs on, if the product needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    /// Start (ISO-8601).
    pub start_time: DateTime<Utc>,
    /// End (ISO-8601, exclusive).
    pub end_time: DateTime<Utc>,
    /// Lifecycle status.
    pub status: AssignmentStatus,
    /// Free text shown on the calendar.
    pub notes: String,
}

/// Assignment lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    /// Proposed by the optimizer; every new assignment starts here.
    Scheduled,
    /// Being produced.
    InProgress,
    /// Finished.
    Completed,
    /// Running late.
    Delayed,
}

/// A soft-constraint violation accepted by the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Violation {
    /// Type of violation.
    pub violation_type: ViolationType,
    /// Related entity (product, employee or resource id).
    pub entity_id: String,
    /// Human-readable description.
    pub message: String,
    /// Severity (0-100, higher = worse).
    pub severity: i32,
}

/// Classification of violations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// A product finished after its deadline.
    DeadlineMiss,
    /// An employee cannot be scheduled at all.
    Unschedulable,
    /// Domain-specific violation.
    Custom(String),
}

impl Assignment {
    /// Creates a `scheduled` assignment.
    pub fn new(
        employee_id: impl Into<String>,
        product_code: impl Into<String>,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            product_code: product_code.into(),
            resource_id: None,
            start_time,
            end_time,
            status: AssignmentStatus::Scheduled,
            notes: String::new(),
        }
    }

    /// Sets the resource.
    pub fn with_resource(mut self, resource_id: impl Into<String>) -> Self {
        self.resource_id = Some(resource_id.into());
        self
    }

    /// Sets the notes.
    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = notes.into();
        self
    }

    /// Calendar days the assignment touches.
    pub fn days(&self) -> Vec<NaiveDate> {
        let first = self.start_time.date_naive();
        let last = (self.end_time - Duration::nanoseconds(1)).date_naive();
        first.iter_days().take_while(|d| *d <= last).collect()
    }
}

impl Violation {
    /// A deadline that could not be met; the product was scheduled late.
    pub fn deadline_miss(product_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation_type: ViolationType::DeadlineMiss,
            entity_id: product_code.into(),
            message: message.into(),
            severity: 80,
        }
    }

    /// An employee with no working day.
    pub fn unschedulable(employee_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            violation_type: ViolationType::Unschedulable,
            entity_id: employee_id.into(),
            message: message.into(),
            severity: 30,
        }
    }
}

impl Schedule {
    /// Creates an empty schedule.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an assignment.
    pub fn add_assignment(&mut self, assignment: Assignment) {
        self.assignments.push(assignment);
    }

    /// Adds a violation.
    pub fn add_violation(&mut self, violation: Violation) {
        self.violations.push(violation);
    }

    /// Number of assignments.
    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Assignments for one product.
    pub fn assignments_for_product(&self, product_code: &str) -> Vec<&Assignment> {
        self.assignments
            .iter()
            .filter(|a| a.product_code == product_code)
            .collect()
    }

    /// Completion time of a product (latest end of its batches).
    pub fn product_completion_time(&self, product_code: &str) -> Option<DateTime<Utc>> {
        self.assignments_for_product(product_code)
            .iter()
            .map(|a| a.end_time)
            .max()
    }

    /// Distinct employees with at least one assignment.
    pub fn employees_utilized(&self) -> BTreeSet<&str> {
        self.assignments.iter().map(|a| a.employee_id.as_str()).collect()
    }

    /// Distinct products with at least one assignment.
    pub fn products_scheduled(&self) -> BTreeSet<&str> {
        self.assignments.iter().map(|a| a.product_code.as_str()).collect()
    }

    /// Distinct calendar days touched by any assignment.
    pub fn days_covered(&self) -> BTreeSet<NaiveDate> {
        self.assignments.iter().flat_map(|a| a.days()).collect()
    }
}
