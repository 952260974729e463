//! Domain model loader.
//!
//! Converts the raw records a dashboard sends (untyped JSON rows, exactly as
//! stored in its tables) into the typed entities of [`crate::models`].
//! Every problem is collected; one bad record never hides another.
//!
//! Raw fields are kept as [`serde_json::Value`] so that a string where a
//! number was expected becomes a [`ValidationError`] naming the record,
//! not a request-level parse failure.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::models::{
    parse_expiry, ConstraintKind, ConstraintRecord, Employee, Material, MaterialUsage, Product,
    Resource, ResourceStatus, Shift, TimeWindow, WeekAvailability, DEFAULT_PRIORITY,
};
use crate::validation::{
    check_duplicates, record_label, require_non_negative, require_positive, ValidationError,
    ValidationErrorKind,
};

/// Raw `employees` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawEmployee {
    pub employee_id: Option<Value>,
    pub name: Option<Value>,
    pub department: Option<Value>,
    pub shift: Option<Value>,
    pub available_monday: Option<Value>,
    pub available_tuesday: Option<Value>,
    pub available_wednesday: Option<Value>,
    pub available_thursday: Option<Value>,
    pub available_friday: Option<Value>,
    pub available_saturday: Option<Value>,
    pub available_sunday: Option<Value>,
}

/// Raw `products` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawProduct {
    pub product_code: Option<Value>,
    pub name: Option<Value>,
    pub batch_time: Option<Value>,
    pub batch_size: Option<Value>,
    pub demand_units: Option<Value>,
    pub priority: Option<Value>,
    pub materials_needed: Option<Value>,
    pub resource_type: Option<Value>,
}

/// Raw `materials` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawMaterial {
    pub material_id: Option<Value>,
    pub name: Option<Value>,
    pub quantity_kg: Option<Value>,
    pub cost_per_kg: Option<Value>,
    pub expiry_date: Option<Value>,
}

/// Raw `resources` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawResource {
    pub resource_id: Option<Value>,
    pub name: Option<Value>,
    #[serde(rename = "type")]
    pub resource_type: Option<Value>,
    pub capacity: Option<Value>,
    pub status: Option<Value>,
    pub maintenance_schedule: Option<Value>,
}

/// Raw `constraints` row.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawConstraint {
    pub id: Option<Value>,
    pub constraint_type: Option<Value>,
    pub description: Option<Value>,
    pub parameters: Option<Value>,
    pub priority: Option<Value>,
    pub active: Option<Value>,
}

/// Validated input of one optimization call.
#[derive(Debug, Clone, Default)]
pub struct DomainModel {
    pub employees: Vec<Employee>,
    pub products: Vec<Product>,
    pub materials: Vec<Material>,
    pub resources: Vec<Resource>,
    pub constraints: Vec<ConstraintRecord>,
    /// Non-fatal findings (unschedulable employees, unknown materials).
    pub warnings: Vec<String>,
}

impl DomainModel {
    /// Finds a material by id or name.
    pub fn find_material(&self, reference: &str) -> Option<&Material> {
        self.materials
            .iter()
            .find(|m| m.id.eq_ignore_ascii_case(reference.trim()))
            .or_else(|| self.materials.iter().find(|m| m.matches(reference)))
    }
}

/// Loads and validates raw records.
///
/// # Returns
/// The typed model, or every validation error found across all records.
pub fn load(
    employees: &[RawEmployee],
    products: &[RawProduct],
    materials: &[RawMaterial],
    resources: &[RawResource],
    constraints: &[RawConstraint],
) -> Result<DomainModel, Vec<ValidationError>> {
    let mut errors = Vec::new();
    let mut model = DomainModel::default();
    // (record label, id) of every converted entity, per kind.
    let mut ids: [Vec<(String, String)>; 4] = Default::default();

    for (i, raw) in employees.iter().enumerate() {
        let record = record_label("employees", i);
        if let Some(e) = convert_employee(&record, raw, &mut errors) {
            ids[0].push((record, e.id.clone()));
            model.employees.push(e);
        }
    }
    for (i, raw) in products.iter().enumerate() {
        let record = record_label("products", i);
        if let Some(p) = convert_product(&record, raw, &mut errors) {
            ids[1].push((record, p.code.clone()));
            model.products.push(p);
        }
    }
    for (i, raw) in materials.iter().enumerate() {
        let record = record_label("materials", i);
        if let Some(m) = convert_material(&record, raw, &mut errors) {
            ids[2].push((record, m.id.clone()));
            model.materials.push(m);
        }
    }
    for (i, raw) in resources.iter().enumerate() {
        let record = record_label("resources", i);
        if let Some(r) = convert_resource(&record, raw, &mut errors) {
            ids[3].push((record, r.id.clone()));
            model.resources.push(r);
        }
    }
    for (i, raw) in constraints.iter().enumerate() {
        if let Some(c) = convert_constraint(&record_label("constraints", i), raw, &mut errors) {
            model.constraints.push(c);
        }
    }

    for kind in &ids {
        check_duplicates(kind.iter().map(|(r, id)| (r.as_str(), id.as_str())), &mut errors);
    }
    if !errors.is_empty() {
        debug!(count = errors.len(), "input rejected");
        return Err(errors);
    }

    for e in &model.employees {
        if !e.is_schedulable() {
            model.warnings.push(format!(
                "employee '{}' is not available on any day and cannot be scheduled",
                e.id
            ));
        }
    }
    for p in &model.products {
        for usage in &p.materials {
            if usage.kg_per_batch.is_some() && model.find_material(&usage.material).is_none() {
                model.warnings.push(format!(
                    "product '{}' consumes unknown material '{}'; consumption is not tracked",
                    p.code, usage.material
                ));
            }
        }
    }

    Ok(model)
}

fn convert_employee(
    record: &str,
    raw: &RawEmployee,
    errors: &mut Vec<ValidationError>,
) -> Option<Employee> {
    let mut ok = true;
    let id = required_text(record, "employee_id", &raw.employee_id, errors);
    let name = optional_text(record, "name", &raw.name, errors, &mut ok);
    let department = optional_text(record, "department", &raw.department, errors, &mut ok);

    let shift = match optional_text(record, "shift", &raw.shift, errors, &mut ok) {
        None => Shift::default(),
        Some(text) => match Shift::parse(&text) {
            Some(shift) => shift,
            None => {
                errors.push(ValidationError::invalid(
                    record,
                    "shift",
                    format!("unknown shift '{text}'"),
                ));
                ok = false;
                Shift::default()
            }
        },
    };

    let raw_flags = [
        ("available_monday", &raw.available_monday),
        ("available_tuesday", &raw.available_tuesday),
        ("available_wednesday", &raw.available_wednesday),
        ("available_thursday", &raw.available_thursday),
        ("available_friday", &raw.available_friday),
        ("available_saturday", &raw.available_saturday),
        ("available_sunday", &raw.available_sunday),
    ];
    let mut flags = [None; 7];
    for (slot, (field, value)) in flags.iter_mut().zip(raw_flags) {
        match flag(value) {
            Ok(v) => *slot = v,
            Err(detail) => {
                errors.push(ValidationError::invalid(record, field, detail));
                ok = false;
            }
        }
    }

    let id = id?;
    if !ok {
        return None;
    }
    let mut employee = Employee::new(&id)
        .with_name(name.unwrap_or_else(|| id.clone()))
        .with_shift(shift)
        .with_availability(WeekAvailability::from_flags(flags));
    employee.department = department;
    Some(employee)
}

fn convert_product(
    record: &str,
    raw: &RawProduct,
    errors: &mut Vec<ValidationError>,
) -> Option<Product> {
    let mut ok = true;
    let code = required_text(record, "product_code", &raw.product_code, errors);
    let name = optional_text(record, "name", &raw.name, errors, &mut ok);
    let batch_time = required_number(record, "batch_time", &raw.batch_time, errors);
    let batch_size = required_number(record, "batch_size", &raw.batch_size, errors);
    let demand = optional_number(record, "demand_units", &raw.demand_units, errors, &mut ok);
    let resource_type = optional_text(record, "resource_type", &raw.resource_type, errors, &mut ok);

    let priority = match number(&raw.priority) {
        Ok(None) => DEFAULT_PRIORITY,
        Ok(Some(p)) if p.fract() == 0.0 && p.abs() < i32::MAX as f64 => p as i32,
        Ok(Some(p)) => {
            errors.push(ValidationError::invalid(
                record,
                "priority",
                format!("expected an integer, got {p}"),
            ));
            ok = false;
            DEFAULT_PRIORITY
        }
        Err(detail) => {
            errors.push(ValidationError::invalid(record, "priority", detail));
            ok = false;
            DEFAULT_PRIORITY
        }
    };

    let materials = match material_usages(&raw.materials_needed) {
        Ok(list) => list,
        Err(detail) => {
            errors.push(ValidationError::invalid(record, "materials_needed", detail));
            ok = false;
            Vec::new()
        }
    };

    if let Some(hours) = batch_time {
        ok &= require_positive(record, "batch_time", hours, errors);
    }
    if let Some(size) = batch_size {
        ok &= require_positive(record, "batch_size", size, errors);
    }
    if let Some(units) = demand {
        ok &= require_non_negative(record, "demand_units", units, errors);
    }
    for usage in &materials {
        if let Some(kg) = usage.kg_per_batch {
            let field = format!("quantity_kg of '{}'", usage.material);
            ok &= require_non_negative(record, &field, kg, errors);
        }
    }

    let (code, batch_time, batch_size) = (code?, batch_time?, batch_size?);
    if !ok {
        return None;
    }
    let mut product = Product::new(&code)
        .with_name(name.unwrap_or_else(|| code.clone()))
        .with_batch(batch_time, batch_size)
        .with_demand(demand.unwrap_or(0.0))
        .with_priority(priority);
    product.materials = materials;
    product.resource_type = resource_type;
    Some(product)
}

fn convert_material(
    record: &str,
    raw: &RawMaterial,
    errors: &mut Vec<ValidationError>,
) -> Option<Material> {
    let mut ok = true;
    let id = required_text(record, "material_id", &raw.material_id, errors);
    let name = optional_text(record, "name", &raw.name, errors, &mut ok);
    let quantity = optional_number(record, "quantity_kg", &raw.quantity_kg, errors, &mut ok);
    let cost = optional_number(record, "cost_per_kg", &raw.cost_per_kg, errors, &mut ok);

    let expiry = match optional_text(record, "expiry_date", &raw.expiry_date, errors, &mut ok) {
        None => None,
        Some(text) => match parse_expiry(&text) {
            Some(t) => Some(t),
            None => {
                errors.push(ValidationError::invalid(
                    record,
                    "expiry_date",
                    format!("unparseable date '{text}'"),
                ));
                ok = false;
                None
            }
        },
    };

    if let Some(kg) = quantity {
        ok &= require_non_negative(record, "quantity_kg", kg, errors);
    }

    let id = id?;
    if !ok {
        return None;
    }
    let mut material = Material::new(&id)
        .with_name(name.unwrap_or_else(|| id.clone()))
        .with_quantity(quantity.unwrap_or(0.0));
    material.cost_per_kg = cost;
    material.expiry = expiry;
    Some(material)
}

fn convert_resource(
    record: &str,
    raw: &RawResource,
    errors: &mut Vec<ValidationError>,
) -> Option<Resource> {
    let mut ok = true;
    let id = required_text(record, "resource_id", &raw.resource_id, errors);
    let name = optional_text(record, "name", &raw.name, errors, &mut ok);
    let resource_type = optional_text(record, "type", &raw.resource_type, errors, &mut ok);

    let capacity = match number(&raw.capacity) {
        Ok(None) => 1,
        Ok(Some(c)) if c.fract() == 0.0 && c >= 1.0 && c <= u32::MAX as f64 => c as u32,
        Ok(Some(c)) if c <= 0.0 => {
            errors.push(ValidationError::new(
                ValidationErrorKind::NonPositive,
                record,
                format!("capacity must be >= 1 (got {c})"),
            ));
            ok = false;
            1
        }
        Ok(Some(c)) => {
            errors.push(ValidationError::invalid(
                record,
                "capacity",
                format!("expected an integer, got {c}"),
            ));
            ok = false;
            1
        }
        Err(detail) => {
            errors.push(ValidationError::invalid(record, "capacity", detail));
            ok = false;
            1
        }
    };

    let status = match optional_text(record, "status", &raw.status, errors, &mut ok) {
        None => ResourceStatus::Available,
        Some(text) => match ResourceStatus::parse(&text) {
            Some(s) => s,
            None => {
                errors.push(ValidationError::invalid(
                    record,
                    "status",
                    format!("unknown status '{text}'"),
                ));
                ok = false;
                ResourceStatus::Available
            }
        },
    };

    let windows = match maintenance_windows(&raw.maintenance_schedule) {
        Ok(w) => w,
        Err(detail) => {
            errors.push(ValidationError::invalid(record, "maintenance_schedule", detail));
            ok = false;
            Vec::new()
        }
    };

    let id = id?;
    if !ok {
        return None;
    }
    let mut resource = Resource::new(&id, resource_type.unwrap_or_default())
        .with_name(name.unwrap_or_else(|| id.clone()))
        .with_capacity(capacity)
        .with_status(status);
    resource.maintenance_windows = windows;
    Some(resource)
}

fn convert_constraint(
    record: &str,
    raw: &RawConstraint,
    errors: &mut Vec<ValidationError>,
) -> Option<ConstraintRecord> {
    let mut ok = true;
    let kind = required_text(record, "constraint_type", &raw.constraint_type, errors);
    let description = optional_text(record, "description", &raw.description, errors, &mut ok);
    let priority = optional_number(record, "priority", &raw.priority, errors, &mut ok);

    let active = match flag(&raw.active) {
        Ok(v) => v.unwrap_or(true),
        Err(detail) => {
            errors.push(ValidationError::invalid(record, "active", detail));
            ok = false;
            true
        }
    };

    // Stores sometimes hand back JSON columns as strings.
    let parameters = match &raw.parameters {
        None | Some(Value::Null) => Value::Null,
        Some(Value::String(s)) if s.trim().is_empty() => Value::Null,
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s) {
            Ok(v) => v,
            Err(e) => {
                errors.push(ValidationError::invalid(record, "parameters", e));
                ok = false;
                Value::Null
            }
        },
        Some(v) => v.clone(),
    };

    let id = match number(&raw.id) {
        Ok(n) => n.filter(|n| n.fract() == 0.0).map(|n| n as i64),
        Err(_) => None,
    };

    let kind = kind?;
    if !ok {
        return None;
    }
    let mut constraint =
        ConstraintRecord::new(ConstraintKind::parse(&kind)).with_parameters(parameters);
    constraint.id = id;
    constraint.active = active;
    constraint.priority = priority;
    constraint.description = description.unwrap_or_default();
    Some(constraint)
}

/// Parses `materials_needed` in any of its accepted shapes.
fn material_usages(value: &Option<Value>) -> Result<Vec<MaterialUsage>, String> {
    let value = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(v) => v,
    };
    match value {
        Value::String(s) => Ok(s
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(MaterialUsage::reference)
            .collect()),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Ok(MaterialUsage::reference(s.trim())),
                Value::Object(obj) => {
                    let material = obj
                        .get("material_id")
                        .or_else(|| obj.get("material"))
                        .or_else(|| obj.get("name"))
                        .and_then(|v| text(&Some(v.clone())).ok().flatten())
                        .ok_or_else(|| "material entry without 'material_id'".to_string())?;
                    let kg = match obj.get("quantity_kg").or_else(|| obj.get("kg_per_batch")) {
                        None => None,
                        Some(v) => number(&Some(v.clone()))?,
                    };
                    Ok(MaterialUsage {
                        material,
                        kg_per_batch: kg,
                    })
                }
                other => Err(format!("unsupported material entry {other}")),
            })
            .collect(),
        other => Err(format!("expected a string or a list, got {other}")),
    }
}

/// Parses `maintenance_schedule`.
///
/// Accepts `{windows: [...]}`, `{maintenance_windows: [...]}`, a bare list of
/// windows, and `{next_maintenance: "YYYY-MM-DD"}` (that whole day).
/// Unrecognized keys are ignored.
fn maintenance_windows(value: &Option<Value>) -> Result<Vec<TimeWindow>, String> {
    let value = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(Vec::new()),
        Some(Value::String(s)) => serde_json::from_str::<Value>(s).map_err(|e| e.to_string())?,
        Some(v) => v.clone(),
    };

    let mut windows = Vec::new();
    let list = match &value {
        Value::Array(items) => Some(items),
        Value::Object(obj) => obj
            .get("windows")
            .or_else(|| obj.get("maintenance_windows"))
            .and_then(Value::as_array),
        other => return Err(format!("expected an object or a list, got {other}")),
    };
    if let Some(items) = list {
        for item in items {
            let window = TimeWindow::from_json(item)
                .ok_or_else(|| format!("invalid maintenance window {item}"))?;
            windows.push(window);
        }
    }
    if let Some(next) = value.get("next_maintenance").and_then(Value::as_str) {
        let date = chrono::NaiveDate::parse_from_str(next.trim(), "%Y-%m-%d")
            .ok()
            .and_then(TimeWindow::whole_day)
            .ok_or_else(|| format!("invalid next_maintenance '{next}'"))?;
        windows.push(date);
    }
    Ok(windows)
}

fn required_text(
    record: &str,
    field: &str,
    value: &Option<Value>,
    errors: &mut Vec<ValidationError>,
) -> Option<String> {
    match text(value) {
        Ok(Some(s)) => Some(s),
        Ok(None) => {
            errors.push(ValidationError::missing(record, field));
            None
        }
        Err(detail) => {
            errors.push(ValidationError::invalid(record, field, detail));
            None
        }
    }
}

fn optional_text(
    record: &str,
    field: &str,
    value: &Option<Value>,
    errors: &mut Vec<ValidationError>,
    ok: &mut bool,
) -> Option<String> {
    text(value).unwrap_or_else(|detail| {
        errors.push(ValidationError::invalid(record, field, detail));
        *ok = false;
        None
    })
}

fn required_number(
    record: &str,
    field: &str,
    value: &Option<Value>,
    errors: &mut Vec<ValidationError>,
) -> Option<f64> {
    match number(value) {
        Ok(Some(n)) => Some(n),
        Ok(None) => {
            errors.push(ValidationError::missing(record, field));
            None
        }
        Err(detail) => {
            errors.push(ValidationError::invalid(record, field, detail));
            None
        }
    }
}

fn optional_number(
    record: &str,
    field: &str,
    value: &Option<Value>,
    errors: &mut Vec<ValidationError>,
    ok: &mut bool,
) -> Option<f64> {
    number(value).unwrap_or_else(|detail| {
        errors.push(ValidationError::invalid(record, field, detail));
        *ok = false;
        None
    })
}

/// Text field: strings are trimmed (empty = absent), numbers are stringified.
fn text(value: &Option<Value>) -> Result<Option<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(format!("expected text, got {other}")),
    }
}

/// Numeric field: numbers or numeric strings.
fn number(value: &Option<Value>) -> Result<Option<f64>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_f64()
            .map(Some)
            .ok_or_else(|| format!("number out of range: {n}")),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(Some)
            .ok_or_else(|| format!("expected a number, got '{s}'")),
        Some(other) => Err(format!("expected a number, got {other}")),
    }
}

/// Boolean field: booleans, `"true"`/`"false"`/`"yes"`/`"no"`, 0 or 1.
fn flag(value: &Option<Value>) -> Result<Option<bool>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(*b)),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(format!("expected a boolean, got {n}")),
        },
        Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "yes" | "y" | "1" => Ok(Some(true)),
            "false" | "no" | "n" | "0" => Ok(Some(false)),
            "" => Ok(None),
            _ => Err(format!("expected a boolean, got '{s}'")),
        },
        Some(other) => Err(format!("expected a boolean, got {other}")),
    }
}
