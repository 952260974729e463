//! Input validation for production scheduling problems.
//!
//! Error type and the range and uniqueness checks the loader applies to
//! every record. Detects:
//! - Duplicate IDs (per entity kind)
//! - Non-positive batch times, batch sizes and capacities
//! - Negative demand and stock
//!
//! Checks run per record while the loader converts raw rows, so one bad
//! record never hides a problem in another.

use std::collections::HashSet;

use thiserror::Error;

/// A validation error tied to one input record.
#[derive(Debug, Clone, PartialEq, Error, serde::Serialize, serde::Deserialize)]
#[error("{record}: {message}")]
pub struct ValidationError {
    /// Error category.
    pub kind: ValidationErrorKind,
    /// Offending record, e.g. `products[2]`.
    pub record: String,
    /// Human-readable description.
    pub message: String,
}

/// Categories of validation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    /// A required field is absent or empty.
    MissingField,
    /// A value that must be > 0 is not.
    NonPositive,
    /// A value that must be >= 0 is not.
    Negative,
    /// Two entities of one kind share an ID.
    DuplicateId,
    /// A value has the wrong type or cannot be parsed.
    InvalidValue,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(
        kind: ValidationErrorKind,
        record: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            record: record.into(),
            message: message.into(),
        }
    }

    /// A required field is missing.
    pub fn missing(record: impl Into<String>, field: &str) -> Self {
        Self::new(
            ValidationErrorKind::MissingField,
            record,
            format!("missing required field '{field}'"),
        )
    }

    /// A field holds an unusable value.
    pub fn invalid(record: impl Into<String>, field: &str, detail: impl std::fmt::Display) -> Self {
        Self::new(
            ValidationErrorKind::InvalidValue,
            record,
            format!("invalid '{field}': {detail}"),
        )
    }
}

/// Label for the `index`-th record of a collection.
pub fn record_label(collection: &str, index: usize) -> String {
    format!("{collection}[{index}]")
}

/// Checks that `value` is > 0; NaN fails too.
///
/// Returns whether the value passed.
pub fn require_positive(
    record: &str,
    field: &str,
    value: f64,
    errors: &mut Vec<ValidationError>,
) -> bool {
    if value > 0.0 {
        return true;
    }
    errors.push(ValidationError::new(
        ValidationErrorKind::NonPositive,
        record,
        format!("{field} must be > 0 (got {value})"),
    ));
    false
}

/// Checks that `value` is >= 0; NaN fails too.
pub fn require_non_negative(
    record: &str,
    field: &str,
    value: f64,
    errors: &mut Vec<ValidationError>,
) -> bool {
    if value >= 0.0 {
        return true;
    }
    errors.push(ValidationError::new(
        ValidationErrorKind::Negative,
        record,
        format!("{field} must be >= 0 (got {value})"),
    ));
    false
}

/// Reports every `(record, id)` whose id already appeared earlier.
///
/// Records are labelled by the caller so skipped records do not shift the
/// labels of later ones.
pub fn check_duplicates<'a>(
    ids: impl IntoIterator<Item = (&'a str, &'a str)>,
    errors: &mut Vec<ValidationError>,
) {
    let mut seen = HashSet::new();
    for (record, id) in ids {
        if !seen.insert(id) {
            errors.push(ValidationError::new(
                ValidationErrorKind::DuplicateId,
                record,
                format!("duplicate id '{id}'"),
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positive_and_non_negative() {
        let mut errors = Vec::new();
        assert!(require_positive("products[0]", "batch_time", 2.0, &mut errors));
        assert!(!require_positive("products[0]", "batch_time", 0.0, &mut errors));
        assert!(!require_positive("products[1]", "batch_size", f64::NAN, &mut errors));
        assert!(require_non_negative("materials[0]", "quantity_kg", 0.0, &mut errors));
        assert!(!require_non_negative("materials[0]", "quantity_kg", -1.0, &mut errors));

        let kinds: Vec<_> = errors.iter().map(|e| (e.record.as_str(), e.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                ("products[0]", ValidationErrorKind::NonPositive),
                ("products[1]", ValidationErrorKind::NonPositive),
                ("materials[0]", ValidationErrorKind::Negative),
            ]
        );
        assert_eq!(errors[0].message, "batch_time must be > 0 (got 0)");
    }

    #[test]
    fn test_duplicates_keep_caller_labels() {
        let mut errors = Vec::new();
        // products[1] was skipped by the caller; labels must not shift.
        let ids = [("products[0]", "P1"), ("products[2]", "P2"), ("products[3]", "P1")];
        check_duplicates(ids, &mut errors);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ValidationErrorKind::DuplicateId);
        assert_eq!(errors[0].record, "products[3]");

        check_duplicates([("employees[0]", "E1"), ("employees[1]", "E2")], &mut errors);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_display() {
        let e = ValidationError::missing("employees[3]", "employee_id");
        assert_eq!(e.to_string(), "employees[3]: missing required field 'employee_id'");
    }
}
