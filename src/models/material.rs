//! Raw material stock.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stocked material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Material {
    /// Unique material identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Stock on hand (kg, >= 0).
    pub quantity_kg: f64,
    /// Unit cost, informational.
    pub cost_per_kg: Option<f64>,
    /// Instant after which the material may not be used.
    pub expiry: Option<DateTime<Utc>>,
}

impl Material {
    /// Creates a material with no stock.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            quantity_kg: 0.0,
            cost_per_kg: None,
            expiry: None,
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the stock.
    pub fn with_quantity(mut self, kg: f64) -> Self {
        self.quantity_kg = kg;
        self
    }

    /// Sets the expiry instant.
    pub fn with_expiry(mut self, expiry: DateTime<Utc>) -> Self {
        self.expiry = Some(expiry);
        self
    }

    /// Whether a product reference (id or name, case-insensitive) means this material.
    pub fn matches(&self, reference: &str) -> bool {
        let reference = reference.trim();
        self.id.eq_ignore_ascii_case(reference)
            || (!self.name.is_empty() && self.name.eq_ignore_ascii_case(reference))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_id_or_name() {
        let m = Material::new("MAT001").with_name("Steel Sheets").with_quantity(500.0);
        assert!(m.matches("MAT001"));
        assert!(m.matches("mat001"));
        assert!(m.matches(" steel sheets "));
        assert!(!m.matches("Steel"));
    }
}
