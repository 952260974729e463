//! Product model.
//!
//! A product's demand is produced in batches. Each batch yields
//! `batch_size` units, takes `batch_time` hours, occupies one employee and
//! (usually) one unit of a machine resource.

use serde::{Deserialize, Serialize};

/// A material a product draws on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialUsage {
    /// Material id or name as written on the product record.
    pub material: String,
    /// Consumption per batch (kg). `None` = referenced but not metered.
    pub kg_per_batch: Option<f64>,
}

impl MaterialUsage {
    /// A reference without metered consumption.
    pub fn reference(material: impl Into<String>) -> Self {
        Self {
            material: material.into(),
            kg_per_batch: None,
        }
    }

    /// A reference consuming `kg` per batch.
    pub fn metered(material: impl Into<String>, kg: f64) -> Self {
        Self {
            material: material.into(),
            kg_per_batch: Some(kg),
        }
    }
}

/// A product to be manufactured.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Unique product code.
    pub code: String,
    /// Display name.
    pub name: String,
    /// Hours per batch (> 0).
    pub batch_time_hours: f64,
    /// Units per batch (> 0).
    pub batch_size: f64,
    /// Units to produce within the horizon (>= 0).
    pub demand_units: f64,
    /// Urgency: lower = more urgent.
    pub priority: i32,
    /// Materials consumed.
    pub materials: Vec<MaterialUsage>,
    /// Resource type every batch requires. `None` = any resource.
    pub resource_type: Option<String>,
}

/// Priority given to products that do not state one.
pub const DEFAULT_PRIORITY: i32 = 3;

impl Product {
    /// Creates a product with one-hour, one-unit batches and no demand.
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: String::new(),
            batch_time_hours: 1.0,
            batch_size: 1.0,
            demand_units: 0.0,
            priority: DEFAULT_PRIORITY,
            materials: Vec::new(),
            resource_type: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets batch duration and size.
    pub fn with_batch(mut self, hours: f64, size: f64) -> Self {
        self.batch_time_hours = hours;
        self.batch_size = size;
        self
    }

    /// Sets the demand.
    pub fn with_demand(mut self, units: f64) -> Self {
        self.demand_units = units;
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Adds a material usage.
    pub fn with_material(mut self, usage: MaterialUsage) -> Self {
        self.materials.push(usage);
        self
    }

    /// Restricts batches to one resource type.
    pub fn with_resource_type(mut self, resource_type: impl Into<String>) -> Self {
        self.resource_type = Some(resource_type.into());
        self
    }

    /// Number of batches needed to cover demand.
    pub fn batch_count(&self) -> usize {
        if self.demand_units <= 0.0 || self.batch_size <= 0.0 {
            return 0;
        }
        // Tolerate float noise such as 0.3 / 0.1 = 2.9999999999999996.
        (self.demand_units / self.batch_size - 1e-9).ceil().max(1.0) as usize
    }

    /// Slots per batch on a timeline of `granularity_minutes`.
    pub fn batch_slots(&self, granularity_minutes: u32) -> usize {
        let minutes = self.batch_time_hours * 60.0;
        ((minutes / granularity_minutes as f64) - 1e-9).ceil().max(1.0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_product_builder() {
        let p = Product::new("PROD001")
            .with_name("Premium Widget A")
            .with_batch(4.0, 50.0)
            .with_demand(200.0)
            .with_priority(1)
            .with_material(MaterialUsage::metered("MAT001", 12.5))
            .with_resource_type("Manufacturing");

        assert_eq!(p.code, "PROD001");
        assert_eq!(p.priority, 1);
        assert_eq!(p.materials.len(), 1);
        assert_eq!(p.resource_type.as_deref(), Some("Manufacturing"));
    }

    #[test]
    fn test_batch_count() {
        assert_eq!(Product::new("A").with_batch(1.0, 50.0).with_demand(200.0).batch_count(), 4);
        assert_eq!(Product::new("B").with_batch(1.0, 75.0).with_demand(150.0).batch_count(), 2);
        assert_eq!(Product::new("C").with_batch(1.0, 100.0).with_demand(250.0).batch_count(), 3);
        assert_eq!(Product::new("D").with_batch(1.0, 0.1).with_demand(0.3).batch_count(), 3);
        assert_eq!(Product::new("E").with_demand(0.0).batch_count(), 0);
    }

    #[test]
    fn test_batch_slots() {
        let p = Product::new("A").with_batch(4.0, 1.0);
        assert_eq!(p.batch_slots(60), 4);
        assert_eq!(p.batch_slots(30), 8);
        let short = Product::new("B").with_batch(0.25, 1.0);
        assert_eq!(short.batch_slots(60), 1);
        let odd = Product::new("C").with_batch(2.5, 1.0);
        assert_eq!(odd.batch_slots(60), 3);
    }
}
