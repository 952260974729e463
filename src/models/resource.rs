//! Machine resource model.
//!
//! Resources are the machines and stations batches run on: CNC machines,
//! assembly lines, scanners, packaging stations. A resource has a type,
//! a number of concurrent job slots, an operating status and optional
//! maintenance windows during which it runs nothing.
//!
//! # Reference
//! Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems", Ch. 1.2

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::TimeWindow;

/// A resource batches can be assigned to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Unique resource identifier.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    /// Resource classification (e.g. "Manufacturing", "Packaging").
    pub resource_type: String,
    /// Concurrent job slots (>= 1).
    pub capacity: u32,
    /// Operating status.
    pub status: ResourceStatus,
    /// Periods with zero capacity.
    pub maintenance_windows: Vec<TimeWindow>,
}

/// Operating status of a resource.
///
/// Anything other than `Available` takes the resource out of service for
/// the whole horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// In service.
    Available,
    /// Under maintenance.
    Maintenance,
    /// Switched off or broken.
    Offline,
}

impl ResourceStatus {
    /// Parses a status string (case-insensitive).
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "available" | "active" | "online" => Some(Self::Available),
            "maintenance" => Some(Self::Maintenance),
            "offline" | "inactive" | "down" => Some(Self::Offline),
            _ => None,
        }
    }

    /// Status label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Maintenance => "maintenance",
            Self::Offline => "offline",
        }
    }
}

impl Resource {
    /// Creates an available, single-slot resource.
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            resource_type: resource_type.into(),
            capacity: 1,
            status: ResourceStatus::Available,
            maintenance_windows: Vec::new(),
        }
    }

    /// Sets the resource name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the capacity.
    pub fn with_capacity(mut self, capacity: u32) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the status.
    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.status = status;
        self
    }

    /// Adds a maintenance window.
    pub fn with_maintenance(mut self, window: TimeWindow) -> Self {
        self.maintenance_windows.push(window);
        self
    }

    /// Whether the resource is in service at all.
    pub fn is_in_service(&self) -> bool {
        self.status == ResourceStatus::Available
    }

    /// Whether the resource type matches (case-insensitive).
    pub fn matches_type(&self, resource_type: &str) -> bool {
        self.resource_type.eq_ignore_ascii_case(resource_type.trim())
    }

    /// Job slots usable throughout `[start, end)`.
    ///
    /// Returns 0 when out of service or when any maintenance window
    /// overlaps the range.
    pub fn capacity_during(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> u32 {
        if !self.is_in_service() {
            return 0;
        }
        if self
            .maintenance_windows
            .iter()
            .any(|w| w.overlaps_range(start, end))
        {
            return 0;
        }
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::parse_instant;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_instant(raw).unwrap()
    }

    #[test]
    fn test_resource_builder() {
        let r = Resource::new("RES001", "Manufacturing")
            .with_name("CNC Machine Alpha")
            .with_capacity(2);

        assert_eq!(r.id, "RES001");
        assert_eq!(r.name, "CNC Machine Alpha");
        assert_eq!(r.capacity, 2);
        assert!(r.is_in_service());
        assert!(r.matches_type("manufacturing"));
        assert!(!r.matches_type("Assembly"));
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ResourceStatus::parse("Available"), Some(ResourceStatus::Available));
        assert_eq!(ResourceStatus::parse("maintenance"), Some(ResourceStatus::Maintenance));
        assert_eq!(ResourceStatus::parse("offline"), Some(ResourceStatus::Offline));
        assert_eq!(ResourceStatus::parse("exploded"), None);
    }

    #[test]
    fn test_capacity_during_maintenance_window() {
        let r = Resource::new("RES001", "Manufacturing")
            .with_capacity(2)
            .with_maintenance(TimeWindow::new(
                at("2025-01-06T10:00:00Z"),
                at("2025-01-06T12:00:00Z"),
            ));

        assert_eq!(r.capacity_during(at("2025-01-06T08:00:00Z"), at("2025-01-06T09:00:00Z")), 2);
        assert_eq!(r.capacity_during(at("2025-01-06T11:00:00Z"), at("2025-01-06T12:00:00Z")), 0);
        assert_eq!(r.capacity_during(at("2025-01-06T12:00:00Z"), at("2025-01-06T13:00:00Z")), 2);
    }

    #[test]
    fn test_out_of_service_has_no_capacity() {
        let r = Resource::new("RES004", "Packaging")
            .with_capacity(3)
            .with_status(ResourceStatus::Maintenance);
        assert_eq!(r.capacity_during(at("2025-01-06T08:00:00Z"), at("2025-01-06T09:00:00Z")), 0);
    }
}
