//! Employee model.
//!
//! An employee works one shift on each weekday flagged available. Each
//! batch needs exactly one employee for its whole duration.
//!
//! # Availability defaults
//! Flags arrive as seven optional booleans. If all seven are absent the
//! employee is assumed available every day. If at least one is present,
//! every missing day counts as unavailable (an explicit partial week).
//! This changes feasibility materially, so the loader applies it in one
//! place: [`WeekAvailability::from_flags`].

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Weekdays in Monday-first order, matching [`WeekAvailability`] indexing.
pub const WEEKDAYS: [Weekday; 7] = [
    Weekday::Mon,
    Weekday::Tue,
    Weekday::Wed,
    Weekday::Thu,
    Weekday::Fri,
    Weekday::Sat,
    Weekday::Sun,
];

/// Per-weekday availability flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekAvailability([bool; 7]);

impl WeekAvailability {
    /// Available every day.
    pub fn all() -> Self {
        Self([true; 7])
    }

    /// Never available.
    pub fn none() -> Self {
        Self([false; 7])
    }

    /// Builds availability from optional flags (Monday first).
    pub fn from_flags(flags: [Option<bool>; 7]) -> Self {
        if flags.iter().all(Option::is_none) {
            return Self::all();
        }
        Self(flags.map(|f| f.unwrap_or(false)))
    }

    /// Only the given days are available.
    pub fn only(days: &[Weekday]) -> Self {
        let mut week = Self::none();
        for &day in days {
            week.set(day, true);
        }
        week
    }

    /// Whether the employee works on `day`.
    #[inline]
    pub fn is_available(&self, day: Weekday) -> bool {
        self.0[day.num_days_from_monday() as usize]
    }

    /// Sets the flag for one day.
    pub fn set(&mut self, day: Weekday, available: bool) {
        self.0[day.num_days_from_monday() as usize] = available;
    }

    /// Whether at least one day is available.
    pub fn any_day(&self) -> bool {
        self.0.iter().any(|&d| d)
    }

    /// Iterates over the available days.
    pub fn days(&self) -> impl Iterator<Item = Weekday> + '_ {
        WEEKDAYS.into_iter().filter(|d| self.is_available(*d))
    }
}

impl Default for WeekAvailability {
    fn default() -> Self {
        Self::all()
    }
}

/// Daily working window.
///
/// Minutes are counted from midnight UTC. A window whose end precedes its
/// start wraps past midnight; each side of midnight then needs the flag of
/// its own calendar day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Shift {
    /// 08:00-18:00, used when no shift is given.
    Day,
    /// 06:00-14:00.
    Morning,
    /// 14:00-22:00.
    Afternoon,
    /// 22:00-06:00.
    Night,
    /// Explicit `HH:MM-HH:MM` range.
    Custom { start_minute: u32, end_minute: u32 },
}

impl Shift {
    /// Parses a shift name or an `HH:MM-HH:MM` range.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "" | "day" | "regular" => Some(Self::Day),
            "morning" | "early" | "am" => Some(Self::Morning),
            "afternoon" | "late" | "pm" => Some(Self::Afternoon),
            "evening" | "night" => Some(Self::Night),
            other => {
                let (start, end) = other.split_once('-')?;
                let start_minute = parse_clock(start)?;
                let end_minute = parse_clock(end)?;
                if start_minute == end_minute || start_minute >= 24 * 60 {
                    return None;
                }
                Some(Self::Custom {
                    start_minute,
                    end_minute,
                })
            }
        }
    }

    /// `(start_minute, end_minute)` from midnight.
    pub fn bounds(&self) -> (u32, u32) {
        match *self {
            Self::Day => (8 * 60, 18 * 60),
            Self::Morning => (6 * 60, 14 * 60),
            Self::Afternoon => (14 * 60, 22 * 60),
            Self::Night => (22 * 60, 6 * 60),
            Self::Custom {
                start_minute,
                end_minute,
            } => (start_minute, end_minute),
        }
    }

    /// Whether the shift covers a minute of the day.
    pub fn covers(&self, minute_of_day: u32) -> bool {
        let (start, end) = self.bounds();
        if start < end {
            minute_of_day >= start && minute_of_day < end
        } else {
            minute_of_day >= start || minute_of_day < end
        }
    }

    /// Working minutes per day.
    pub fn length_minutes(&self) -> u32 {
        let (start, end) = self.bounds();
        if start < end {
            end - start
        } else {
            24 * 60 - start + end
        }
    }
}

impl Default for Shift {
    fn default() -> Self {
        Self::Day
    }
}

fn parse_clock(raw: &str) -> Option<u32> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if m >= 60 || h > 24 || (h == 24 && m > 0) {
        return None;
    }
    Some(h * 60 + m)
}

/// An employee who can run production batches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    /// Unique employee identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Department, informational only.
    pub department: Option<String>,
    /// Daily working window.
    pub shift: Shift,
    /// Weekdays the employee works.
    pub availability: WeekAvailability,
}

impl Employee {
    /// Creates an employee on the default day shift, available every day.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            department: None,
            shift: Shift::Day,
            availability: WeekAvailability::all(),
        }
    }

    /// Sets the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the department.
    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    /// Sets the shift.
    pub fn with_shift(mut self, shift: Shift) -> Self {
        self.shift = shift;
        self
    }

    /// Sets weekday availability.
    pub fn with_availability(mut self, availability: WeekAvailability) -> Self {
        self.availability = availability;
        self
    }

    /// Whether the employee has at least one working day.
    pub fn is_schedulable(&self) -> bool {
        self.availability.any_day()
    }

    /// Whether the employee is on shift at instant `t`.
    pub fn works_at(&self, t: DateTime<Utc>) -> bool {
        self.availability.is_available(t.weekday()) && self.shift.covers(t.hour() * 60 + t.minute())
    }
}
