//! Constraint records.
//!
//! Constraints arrive as structured records: a type tag, a JSON parameter
//! object interpreted per type, an active flag and an optional priority
//! weight. The compiler turns active records into solver constraints and
//! objective terms; this module only classifies them.
//!
//! # Reference
//! Brucker (2007), "Scheduling Algorithms", Ch. 2

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Recognized constraint types.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintKind {
    /// Blocks employees on given days or windows.
    EmployeeAvailability,
    /// Caps concurrent jobs on resources and adds maintenance windows.
    MachineCapacity,
    /// Urgent products first, soft or strict.
    PriorityOrdering,
    /// All batches of a product finish by an instant.
    Deadline,
    /// Weight of the makespan objective term.
    MinimizeMakespan,
    /// Weight of the idle-resource objective term.
    MinimizeIdleTime,
    /// Anything else; ignored with a warning.
    Unknown(String),
}

impl ConstraintKind {
    /// Classifies a `constraint_type` string.
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "employee_availability" => Self::EmployeeAvailability,
            "machine_capacity" | "resource_capacity" => Self::MachineCapacity,
            "priority_ordering" | "priority" => Self::PriorityOrdering,
            "deadline" => Self::Deadline,
            "minimize_makespan" | "makespan" => Self::MinimizeMakespan,
            "minimize_idle_time" | "idle_time" => Self::MinimizeIdleTime,
            _ => Self::Unknown(raw.to_string()),
        }
    }

    /// Canonical name; also used to label the constraint group that
    /// blocks a schedule.
    pub fn as_str(&self) -> &str {
        match self {
            Self::EmployeeAvailability => "employee_availability",
            Self::MachineCapacity => "machine_capacity",
            Self::PriorityOrdering => "priority_ordering",
            Self::Deadline => "deadline",
            Self::MinimizeMakespan => "minimize_makespan",
            Self::MinimizeIdleTime => "minimize_idle_time",
            Self::Unknown(raw) => raw,
        }
    }
}

/// A validated constraint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstraintRecord {
    /// Store id, if the caller sent one.
    pub id: Option<i64>,
    /// Constraint type.
    pub kind: ConstraintKind,
    /// Type-specific parameters (a JSON object, `Null` if absent).
    pub parameters: Value,
    /// Inactive records are ignored by the compiler.
    pub active: bool,
    /// Objective weight.
    pub priority: Option<f64>,
    /// Free-text description.
    pub description: String,
}

impl ConstraintRecord {
    /// Creates an active record with no parameters.
    pub fn new(kind: ConstraintKind) -> Self {
        Self {
            id: None,
            kind,
            parameters: Value::Null,
            active: true,
            priority: None,
            description: String::new(),
        }
    }

    /// Sets the parameters.
    pub fn with_parameters(mut self, parameters: Value) -> Self {
        self.parameters = parameters;
        self
    }

    /// Sets the priority weight.
    pub fn with_priority(mut self, priority: f64) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Marks the record inactive.
    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }

    /// Label used in warnings: description, else id, else type.
    pub fn label(&self) -> String {
        if !self.description.is_empty() {
            return format!("{} ({})", self.kind.as_str(), self.description);
        }
        match self.id {
            Some(id) => format!("{} #{id}", self.kind.as_str()),
            None => self.kind.as_str().to_string(),
        }
    }
}

/// Constraint group names reported as infeasibility causes.
pub mod groups {
    pub const EMPLOYEE_AVAILABILITY: &str = "employee_availability";
    pub const MACHINE_CAPACITY: &str = "machine_capacity";
    pub const PRIORITY_ORDERING: &str = "priority_ordering";
    pub const DEADLINE: &str = "deadline";
    pub const MATERIAL_AVAILABILITY: &str = "material_availability";
    pub const HORIZON: &str = "horizon";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_parse() {
        assert_eq!(
            ConstraintKind::parse("employee_availability"),
            ConstraintKind::EmployeeAvailability
        );
        assert_eq!(ConstraintKind::parse("Machine Capacity"), ConstraintKind::MachineCapacity);
        assert_eq!(ConstraintKind::parse("priority-ordering"), ConstraintKind::PriorityOrdering);
        assert_eq!(ConstraintKind::parse("deadline"), ConstraintKind::Deadline);
        assert_eq!(
            ConstraintKind::parse("weather_window"),
            ConstraintKind::Unknown("weather_window".into())
        );
    }

    #[test]
    fn test_record_builder() {
        let c = ConstraintRecord::new(ConstraintKind::PriorityOrdering)
            .with_parameters(json!({"priority_weight": 0.8}))
            .with_priority(2.0);
        assert!(c.active);
        assert_eq!(c.priority, Some(2.0));
        assert_eq!(c.parameters["priority_weight"], 0.8);
        assert_eq!(c.label(), "priority_ordering");
        assert!(!c.inactive().active);
    }
}
