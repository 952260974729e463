//! Production scheduling domain models.
//!
//! Typed entities produced by the loader and consumed by the compiler and
//! solver. Nothing past the loader sees raw JSON records.
//!
//! # Domain Mappings
//!
//! | prodsched | Dashboard table | Scheduling theory |
//! |-----------|-----------------|-------------------|
//! | Employee | employees | Operator (renewable, unary) |
//! | Product | products | Job family (demand split into batches) |
//! | Material | materials | Consumable resource |
//! | Resource | resources | Machine (renewable, capacity k) |
//! | ConstraintRecord | constraints | Side constraint / objective term |
//! | Assignment | assignments | Scheduled operation |

mod calendar;
mod constraint;
mod employee;
mod material;
mod product;
mod resource;
mod schedule;

pub use calendar::{parse_expiry, parse_instant, TimeWindow};
pub use constraint::{groups, ConstraintKind, ConstraintRecord};
pub use employee::{Employee, Shift, WeekAvailability, WEEKDAYS};
pub use material::Material;
pub use product::{MaterialUsage, Product, DEFAULT_PRIORITY};
pub use resource::{Resource, ResourceStatus};
pub use schedule::{Assignment, AssignmentStatus, Schedule, Violation, ViolationType};
