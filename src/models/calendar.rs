//! Calendar windows and timestamp parsing.
//!
//! Maintenance periods, blocked employee periods and deadlines are all
//! expressed as UTC instants. Windows are half-open: `[start, end)`.
//!
//! # Accepted timestamp formats
//! - RFC 3339 (`2025-02-15T08:00:00Z`, `2025-02-15T08:00:00+02:00`)
//! - Naive date-time, read as UTC (`2025-02-15T08:00:00`, `2025-02-15 08:00`)
//! - Plain date, read as midnight UTC (`2025-02-15`)

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A time interval `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Interval start (inclusive).
    pub start: DateTime<Utc>,
    /// Interval end (exclusive).
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// Creates a new time window.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// A window covering one whole calendar day.
    pub fn whole_day(date: NaiveDate) -> Option<Self> {
        let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
        Some(Self::new(start, start + Duration::days(1)))
    }

    /// Length of the window.
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// Whether an instant falls within this window.
    #[inline]
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }

    /// Whether two windows overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.overlaps_range(other.start, other.end)
    }

    /// Whether this window overlaps `[start, end)`.
    #[inline]
    pub fn overlaps_range(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.start < end && start < self.end
    }

    /// Parses `{"start": ..., "end": ...}`.
    ///
    /// Returns `None` if either bound is missing or unparseable, or if the
    /// window is empty.
    pub fn from_json(value: &Value) -> Option<Self> {
        let start = parse_instant(value.get("start")?.as_str()?)?;
        let end = parse_instant(value.get("end")?.as_str()?)?;
        (end > start).then_some(Self::new(start, end))
    }
}

/// Parses a timestamp in any of the accepted formats.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M",
    ];
    for format in FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?))
}

/// Parses a material expiry.
///
/// A plain date means the material is usable through the end of that day,
/// so the returned instant is the following midnight.
pub fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => TimeWindow::whole_day(date).map(|w| w.end),
        Err(_) => parse_instant(raw),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(raw: &str) -> DateTime<Utc> {
        parse_instant(raw).unwrap()
    }

    #[test]
    fn test_parse_formats() {
        let expected = Utc.with_ymd_and_hms(2025, 2, 15, 8, 0, 0).unwrap();
        assert_eq!(parse_instant("2025-02-15T08:00:00Z"), Some(expected));
        assert_eq!(parse_instant("2025-02-15T10:00:00+02:00"), Some(expected));
        assert_eq!(parse_instant("2025-02-15T08:00:00"), Some(expected));
        assert_eq!(parse_instant("2025-02-15 08:00"), Some(expected));
        assert_eq!(
            parse_instant("2025-02-15"),
            Some(Utc.with_ymd_and_hms(2025, 2, 15, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_instant("next tuesday"), None);
    }

    #[test]
    fn test_expiry_is_end_of_day() {
        assert_eq!(parse_expiry("2025-06-30"), Some(at("2025-07-01T00:00:00Z")));
        assert_eq!(parse_expiry("2025-06-30T12:00:00Z"), Some(at("2025-06-30T12:00:00Z")));
    }

    #[test]
    fn test_window_contains_half_open() {
        let w = TimeWindow::new(at("2025-01-01T08:00:00Z"), at("2025-01-01T10:00:00Z"));
        assert!(w.contains(at("2025-01-01T08:00:00Z")));
        assert!(w.contains(at("2025-01-01T09:59:59Z")));
        assert!(!w.contains(at("2025-01-01T10:00:00Z")));
        assert_eq!(w.duration(), Duration::hours(2));
    }

    #[test]
    fn test_window_overlap() {
        let a = TimeWindow::new(at("2025-01-01T08:00:00Z"), at("2025-01-01T10:00:00Z"));
        let b = TimeWindow::new(at("2025-01-01T09:00:00Z"), at("2025-01-01T11:00:00Z"));
        let c = TimeWindow::new(at("2025-01-01T10:00:00Z"), at("2025-01-01T11:00:00Z"));
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // touching, not overlapping
    }

    #[test]
    fn test_window_from_json() {
        let w = TimeWindow::from_json(&json!({"start": "2025-01-01", "end": "2025-01-02"}))
            .unwrap();
        assert_eq!(w.duration(), Duration::days(1));
        let reversed = json!({"start": "2025-01-02", "end": "2025-01-01"});
        assert!(TimeWindow::from_json(&reversed).is_none());
        assert!(TimeWindow::from_json(&json!({"start": "2025-01-01"})).is_none());
    }
}
