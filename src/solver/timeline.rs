//! Discretized scheduling timeline.
//!
//! The horizon is cut into equal slots of `granularity_minutes`. Slot `i`
//! covers `[start + i*g, start + (i+1)*g)`. A batch occupying slots
//! `s..s+d` ends at the start of slot `s+d`.

use chrono::{DateTime, Duration, Utc};

/// A discretized horizon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeline {
    /// Start of slot 0.
    pub start: DateTime<Utc>,
    /// Slot length in minutes (>= 1).
    pub granularity_minutes: u32,
    /// Number of slots.
    pub slots: usize,
}

impl Timeline {
    /// Creates a timeline covering `horizon_days` whole days.
    ///
    /// A trailing partial slot is dropped.
    pub fn new(start: DateTime<Utc>, granularity_minutes: u32, horizon_days: u32) -> Self {
        let granularity_minutes = granularity_minutes.max(1);
        let total_minutes = horizon_days as usize * 24 * 60;
        Self {
            start,
            granularity_minutes,
            slots: total_minutes / granularity_minutes as usize,
        }
    }

    /// Slot length.
    #[inline]
    pub fn slot_duration(&self) -> Duration {
        Duration::minutes(self.granularity_minutes as i64)
    }

    /// Slot length in hours.
    #[inline]
    pub fn slot_hours(&self) -> f64 {
        self.granularity_minutes as f64 / 60.0
    }

    /// Instant at which slot `slot` begins (also the end of slot `slot - 1`).
    #[inline]
    pub fn instant(&self, slot: usize) -> DateTime<Utc> {
        self.start + Duration::minutes(slot as i64 * self.granularity_minutes as i64)
    }

    /// End of the horizon.
    pub fn end(&self) -> DateTime<Utc> {
        self.instant(self.slots)
    }

    /// Number of whole slots that end at or before `t`, clamped to the horizon.
    ///
    /// A batch must satisfy `end_slot <= slots_until(t)` to finish by `t`.
    pub fn slots_until(&self, t: DateTime<Utc>) -> usize {
        let minutes = (t - self.start).num_minutes();
        if minutes <= 0 {
            return 0;
        }
        ((minutes as usize) / self.granularity_minutes as usize).min(self.slots)
    }

    /// Slots overlapping `[from, to)`, clamped to the horizon.
    pub fn slots_overlapping(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> std::ops::Range<usize> {
        let g = self.granularity_minutes as i64;
        let first = (from - self.start).num_minutes().max(0) / g;
        let to_minutes = (to - self.start).num_minutes();
        if to_minutes <= 0 {
            return 0..0;
        }
        let last = (to_minutes + g - 1) / g;
        let first = (first as usize).min(self.slots);
        let last = (last as usize).min(self.slots);
        first..last.max(first)
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
    fn test_slot_count() {
        let t = Timeline::new(at("2025-01-06"), 60, 7);
        assert_eq!(t.slots, 168);
        assert_eq!(Timeline::new(at("2025-01-06"), 90, 1).slots, 16);
        assert_eq!(t.end(), at("2025-01-13"));
    }

    #[test]
    fn test_instants() {
        let t = Timeline::new(at("2025-01-06"), 30, 1);
        assert_eq!(t.instant(3), at("2025-01-06T01:30:00Z"));
        assert_eq!(t.slot_hours(), 0.5);
    }

    #[test]
    fn test_slots_until() {
        let t = Timeline::new(at("2025-01-06"), 60, 2);
        assert_eq!(t.slots_until(at("2025-01-06T10:30:00Z")), 10);
        assert_eq!(t.slots_until(at("2025-01-05")), 0);
        assert_eq!(t.slots_until(at("2025-02-01")), 48);
    }

    #[test]
    fn test_slots_overlapping() {
        let t = Timeline::new(at("2025-01-06"), 60, 1);
        let overlap = |from: &str, to: &str| t.slots_overlapping(at(from), at(to));
        assert_eq!(overlap("2025-01-06T10:00:00Z", "2025-01-06T12:00:00Z"), 10..12);
        assert_eq!(overlap("2025-01-06T10:30:00Z", "2025-01-06T11:15:00Z"), 10..12);
        assert_eq!(overlap("2025-01-05T10:00:00Z", "2025-01-05T12:00:00Z"), 0..0);
        assert_eq!(overlap("2025-01-06T22:00:00Z", "2025-01-08T00:00:00Z"), 22..24);
    }
}
