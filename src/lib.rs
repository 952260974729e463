//! Production scheduling optimizer.
//!
//! Turns employees, products, materials, machines and constraint records
//! into a calendar-ready batch schedule, served over HTTP to a scheduling
//! dashboard.
//!
//! # Modules
//!
//! - **`models`**: Domain types: `Employee`, `Product`, `Material`,
//!   `Resource`, `ConstraintRecord`, `Schedule`, `Assignment`
//! - **`loader`** / **`validation`**: Raw JSON records to validated entities
//! - **`compiler`**: Constraint records to hard constraints and objective weights
//! - **`dispatching`**: Priority rules that seed the batch order
//! - **`solver`**: Timeline model, pre-check, greedy decoder, parallel search
//! - **`materializer`**: Solver output to assignments and statistics
//! - **`service`** / **`sandbox`** / **`http`**: The service facade and its routes
//! - **`config`** / **`error`**: Settings and error types
//!
//! # Pipeline
//!
//! ```text
//! request → loader → compiler → solver (pre-check → dispatch → search) → materializer
//! ```
//!
//! # References
//!
//! - Pinedo (2016), "Scheduling: Theory, Algorithms, and Systems"
//! - Brucker (2007), "Scheduling Algorithms"
//! - Blazewicz et al. (2019), "Handbook on Scheduling"

pub mod compiler;
pub mod config;
pub mod dispatching;
pub mod error;
pub mod http;
pub mod loader;
pub mod materializer;
pub mod models;
pub mod sandbox;
pub mod service;
pub mod solver;
pub mod validation;

pub use config::ServiceConfig;
pub use error::OptimizationError;
pub use http::build_router;
pub use service::{ExecutionResult, OptimizeRequest, OptimizerService, ScheduleResult};
