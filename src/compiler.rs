//! Constraint compiler.
//!
//! Turns active constraint records into hard constraints the solver model
//! enforces and weights for the soft objective terms. Records are typed per
//! `constraint_type`; anything unknown or malformed becomes a
//! [`CompileWarning`] and is skipped, so one bad record never aborts a run.
//!
//! # Objective weights
//! The objective mixes three normalized terms (lateness, makespan, idle
//! resource time). A term with no weight record gets `1/3`; terms with a
//! record share the remaining mass in proportion to their weights.
//!
//! # Reference
//! Brucker (2007), "Scheduling Algorithms", Ch. 2 (classification of side constraints)

use chrono::{DateTime, Duration, Utc, Weekday};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::loader::DomainModel;
use crate::models::{parse_expiry, ConstraintKind, ConstraintRecord, TimeWindow};

/// Default weight of the soft priority term.
pub const DEFAULT_PRIORITY_WEIGHT: f64 = 0.5;

/// Longest accepted `days`/`hours` deadline offset.
pub const MAX_DEADLINE_OFFSET_DAYS: i64 = 36_500;

/// A record the compiler could not use.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileWarning {
    #[error("constraint '{label}': unknown constraint type, ignored")]
    UnknownType { label: String },
    #[error("constraint '{label}': malformed parameters ({reason}), ignored")]
    MalformedParameters { label: String, reason: String },
    #[error("constraint '{label}': unknown {entity} '{id}', ignored")]
    UnknownReference {
        label: String,
        entity: &'static str,
        id: String,
    },
}

/// Periods an employee (or everyone) may not work.
#[derive(Debug, Clone, PartialEq)]
pub struct EmployeeBlock {
    /// `None` = every employee.
    pub employee_id: Option<String>,
    pub days: Vec<Weekday>,
    pub windows: Vec<TimeWindow>,
}

/// Further restriction of a resource's (or every resource's) capacity.
#[derive(Debug, Clone, PartialEq)]
pub struct CapacityOverride {
    /// `None` = every resource.
    pub resource_id: Option<String>,
    /// Caps concurrent jobs below the resource's own capacity.
    pub max_concurrent: Option<u32>,
    /// Extra zero-capacity windows.
    pub windows: Vec<TimeWindow>,
}

/// Priority ordering settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityOrdering {
    /// Weight of the soft term.
    pub weight: f64,
    /// Hard precedence within a resource type.
    pub strict: bool,
}

/// When a deadline falls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DeadlineAt {
    /// Absolute instant.
    At(DateTime<Utc>),
    /// Offset from the horizon start.
    Offset(Duration),
}

impl DeadlineAt {
    /// Absolute instant for a given horizon start.
    ///
    /// Saturates at the latest representable instant.
    pub fn resolve(&self, horizon_start: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Self::At(t) => t,
            Self::Offset(d) => horizon_start
                .checked_add_signed(d)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }
}

/// A completion deadline.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineRule {
    /// `None` = every product.
    pub product_code: Option<String>,
    pub due: DeadlineAt,
    /// Lateness weight for this product once relaxed.
    pub weight: f64,
    /// Record label, for violation messages.
    pub label: String,
}

/// Normalized objective weights.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObjectiveWeights {
    pub lateness: f64,
    pub makespan: f64,
    pub idle: f64,
    /// Soft priority term (0 when no priority ordering is active).
    pub priority: f64,
}

impl ObjectiveWeights {
    /// Splits the unit mass between the three main terms.
    ///
    /// Each `None` term gets `1/3`. Supplied terms share what is left in
    /// proportion to their values; if every supplied value is zero those
    /// terms are switched off.
    pub fn normalized(
        lateness: Option<f64>,
        makespan: Option<f64>,
        idle: Option<f64>,
        priority: f64,
    ) -> Self {
        let terms = [lateness, makespan, idle];
        let missing = terms.iter().filter(|t| t.is_none()).count();
        let supplied_sum: f64 = terms.iter().flatten().map(|w| w.max(0.0)).sum();
        let remaining = 1.0 - missing as f64 / 3.0;

        let resolve = |term: Option<f64>| match term {
            None => 1.0 / 3.0,
            Some(_) if supplied_sum <= 0.0 => 0.0,
            Some(w) => remaining * w.max(0.0) / supplied_sum,
        };

        Self {
            lateness: resolve(lateness),
            makespan: resolve(makespan),
            idle: resolve(idle),
            priority: priority.max(0.0),
        }
    }
}

impl Default for ObjectiveWeights {
    fn default() -> Self {
        Self::normalized(None, None, None, 0.0)
    }
}

/// Compiled constraints of one call.
#[derive(Debug, Clone, Default)]
pub struct ConstraintSet {
    pub employee_blocks: Vec<EmployeeBlock>,
    pub capacity_overrides: Vec<CapacityOverride>,
    pub priority: Option<PriorityOrdering>,
    pub deadlines: Vec<DeadlineRule>,
    pub weights: ObjectiveWeights,
    pub warnings: Vec<CompileWarning>,
}

impl ConstraintSet {
    /// Whether batches must respect strict priority precedence.
    pub fn strict_priority(&self) -> bool {
        self.priority.is_some_and(|p| p.strict)
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct AvailabilityParams {
    #[serde(deserialize_with = "lenient_id")]
    employee_id: Option<String>,
    #[serde(alias = "days")]
    unavailable_days: Vec<String>,
    #[serde(alias = "unavailable_windows")]
    windows: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct CapacityParams {
    #[serde(deserialize_with = "lenient_id")]
    resource_id: Option<String>,
    #[serde(alias = "capacity")]
    max_concurrent: Option<u32>,
    #[serde(alias = "windows")]
    maintenance_windows: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PriorityParams {
    priority_weight: Option<f64>,
    strict_ordering: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct DeadlineParams {
    #[serde(deserialize_with = "lenient_id")]
    product_code: Option<String>,
    deadline: Option<String>,
    days: Option<f64>,
    hours: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WeightParams {
    weight: Option<f64>,
}

fn lenient_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn params<T: Default + serde::de::DeserializeOwned>(
    record: &ConstraintRecord,
) -> Result<T, CompileWarning> {
    if record.parameters.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(record.parameters.clone()).map_err(|e| {
        CompileWarning::MalformedParameters {
            label: record.label(),
            reason: e.to_string(),
        }
    })
}

fn malformed(record: &ConstraintRecord, reason: impl Into<String>) -> CompileWarning {
    CompileWarning::MalformedParameters {
        label: record.label(),
        reason: reason.into(),
    }
}

fn windows(record: &ConstraintRecord, raw: &[Value]) -> Result<Vec<TimeWindow>, CompileWarning> {
    raw.iter()
        .map(|w| {
            TimeWindow::from_json(w).ok_or_else(|| malformed(record, format!("invalid window {w}")))
        })
        .collect()
}

/// Compiles the active records among `constraints`.
pub fn compile(model: &DomainModel, constraints: &[ConstraintRecord]) -> ConstraintSet {
    let mut set = ConstraintSet::default();
    let mut lateness_weight: Option<f64> = None;
    let mut makespan_weight: Option<f64> = None;
    let mut idle_weight: Option<f64> = None;
    let mut priority_weight = 0.0;

    for record in constraints.iter().filter(|c| c.active) {
        let outcome = match &record.kind {
            ConstraintKind::EmployeeAvailability => compile_availability(model, record)
                .map(|block| set.employee_blocks.push(block)),
            ConstraintKind::MachineCapacity => {
                compile_capacity(model, record).map(|o| set.capacity_overrides.push(o))
            }
            ConstraintKind::PriorityOrdering => params::<PriorityParams>(record).map(|p| {
                let weight = p.priority_weight.unwrap_or(DEFAULT_PRIORITY_WEIGHT).max(0.0);
                priority_weight = f64::max(priority_weight, weight);
                let strict = p.strict_ordering || set.strict_priority();
                set.priority = Some(PriorityOrdering {
                    weight: priority_weight,
                    strict,
                });
            }),
            ConstraintKind::Deadline => compile_deadline(model, record).map(|rule| {
                if let Some(p) = record.priority {
                    *lateness_weight.get_or_insert(0.0) += p.max(0.0);
                }
                set.deadlines.push(rule);
            }),
            ConstraintKind::MinimizeMakespan => objective_weight(record).map(|w| {
                *makespan_weight.get_or_insert(0.0) += w;
            }),
            ConstraintKind::MinimizeIdleTime => objective_weight(record).map(|w| {
                *idle_weight.get_or_insert(0.0) += w;
            }),
            ConstraintKind::Unknown(_) => Err(CompileWarning::UnknownType {
                label: record.label(),
            }),
        };
        if let Err(warning) = outcome {
            warn!(%warning, "constraint skipped");
            set.warnings.push(warning);
        }
    }

    set.weights = ObjectiveWeights::normalized(
        lateness_weight,
        makespan_weight,
        idle_weight,
        priority_weight,
    );
    set
}

fn compile_availability(
    model: &DomainModel,
    record: &ConstraintRecord,
) -> Result<EmployeeBlock, CompileWarning> {
    let p: AvailabilityParams = params(record)?;
    if let Some(id) = &p.employee_id {
        if !model.employees.iter().any(|e| &e.id == id) {
            return Err(CompileWarning::UnknownReference {
                label: record.label(),
                entity: "employee",
                id: id.clone(),
            });
        }
    }
    let days = p
        .unavailable_days
        .iter()
        .map(|d| {
            d.trim()
                .parse::<Weekday>()
                .map_err(|_| malformed(record, format!("unknown weekday '{d}'")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let windows = windows(record, &p.windows)?;
    if days.is_empty() && windows.is_empty() {
        return Err(malformed(record, "no unavailable_days or windows"));
    }
    Ok(EmployeeBlock {
        employee_id: p.employee_id,
        days,
        windows,
    })
}

fn compile_capacity(
    model: &DomainModel,
    record: &ConstraintRecord,
) -> Result<CapacityOverride, CompileWarning> {
    let p: CapacityParams = params(record)?;
    if let Some(id) = &p.resource_id {
        if !model.resources.iter().any(|r| &r.id == id) {
            return Err(CompileWarning::UnknownReference {
                label: record.label(),
                entity: "resource",
                id: id.clone(),
            });
        }
    }
    let windows = windows(record, &p.maintenance_windows)?;
    if p.max_concurrent.is_none() && windows.is_empty() {
        return Err(malformed(record, "no max_concurrent or maintenance_windows"));
    }
    Ok(CapacityOverride {
        resource_id: p.resource_id,
        max_concurrent: p.max_concurrent,
        windows,
    })
}

fn compile_deadline(
    model: &DomainModel,
    record: &ConstraintRecord,
) -> Result<DeadlineRule, CompileWarning> {
    let p: DeadlineParams = params(record)?;
    if let Some(code) = &p.product_code {
        if !model.products.iter().any(|pr| &pr.code == code) {
            return Err(CompileWarning::UnknownReference {
                label: record.label(),
                entity: "product",
                id: code.clone(),
            });
        }
    }
    let due = match (&p.deadline, p.days, p.hours) {
        (Some(raw), _, _) => DeadlineAt::At(
            parse_expiry(raw)
                .ok_or_else(|| malformed(record, format!("unparseable deadline '{raw}'")))?,
        ),
        (None, None, None) => return Err(malformed(record, "no deadline, days or hours")),
        (None, days, hours) => {
            let minutes = days.unwrap_or(0.0) * 24.0 * 60.0 + hours.unwrap_or(0.0) * 60.0;
            if minutes < 0.0 {
                return Err(malformed(record, "negative deadline offset"));
            }
            let offset = Some(minutes)
                .filter(|m| m.is_finite())
                .and_then(|m| Duration::try_minutes(m.round() as i64))
                .filter(|d| *d <= Duration::days(MAX_DEADLINE_OFFSET_DAYS))
                .ok_or_else(|| malformed(record, "deadline offset out of range"))?;
            DeadlineAt::Offset(offset)
        }
    };
    Ok(DeadlineRule {
        product_code: p.product_code,
        due,
        weight: record.priority.unwrap_or(1.0).max(0.0),
        label: record.label(),
    })
}

fn objective_weight(record: &ConstraintRecord) -> Result<f64, CompileWarning> {
    let p: WeightParams = params(record)?;
    Ok(record.priority.or(p.weight).unwrap_or(1.0).max(0.0))
}
