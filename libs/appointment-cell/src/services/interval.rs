//! Half-open interval arithmetic used by conflict detection and slot proposal.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// `true` iff `[a_start, a_end)` and `[b_start, b_end)` share at least one instant.
/// Touching endpoints do not overlap.
pub fn overlaps<T: PartialOrd>(a_start: T, a_end: T, b_start: T, b_end: T) -> bool {
    a_start < b_end && b_start < a_end
}

/// A half-open `[start, end)` span of absolute time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeInterval {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn starting_at(start: DateTime<Utc>, minutes: i64) -> Self {
        Self::new(start, start + Duration::minutes(minutes))
    }

    pub fn overlaps(&self, other: &TimeInterval) -> bool {
        overlaps(self.start, self.end, other.start, other.end)
    }

    /// Same interval with `minutes` appended to its end.
    pub fn extended_end(&self, minutes: i64) -> TimeInterval {
        TimeInterval::new(self.start, self.end + Duration::minutes(minutes))
    }

    /// Buffered conflict test: the buffer is appended to the end of *both*
    /// intervals and never to their starts. A gap strictly shorter than
    /// `buffer_minutes` after either interval therefore counts as a conflict.
    pub fn conflicts_with_buffer(&self, other: &TimeInterval, buffer_minutes: i64) -> bool {
        self.extended_end(buffer_minutes)
            .overlaps(&other.extended_end(buffer_minutes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, hour, minute, 0).unwrap()
    }

    #[test]
    fn touching_endpoints_do_not_overlap() {
        assert!(!overlaps(0, 10, 10, 20));
        assert!(!overlaps(10, 20, 0, 10));
        assert!(overlaps(0, 11, 10, 20));
        assert!(overlaps(5, 6, 0, 20));
    }

    #[test]
    fn empty_interval_never_overlaps() {
        assert!(!overlaps(5, 5, 0, 10));
    }

    #[test]
    fn buffer_blocks_short_gap_after_existing() {
        let existing = TimeInterval::starting_at(at(10, 0), 30);

        // Effective blocked window is [10:00, 10:40).
        assert!(TimeInterval::starting_at(at(10, 35), 5).conflicts_with_buffer(&existing, 10));
        assert!(TimeInterval::starting_at(at(10, 39), 1).conflicts_with_buffer(&existing, 10));
        assert!(!TimeInterval::starting_at(at(10, 40), 30).conflicts_with_buffer(&existing, 10));
    }

    #[test]
    fn buffer_applies_to_candidate_end_too() {
        let existing = TimeInterval::starting_at(at(10, 0), 30);

        // Candidate ends at 09:55; its buffer reaches 10:05.
        assert!(TimeInterval::starting_at(at(9, 25), 30).conflicts_with_buffer(&existing, 10));
        // Ends exactly one buffer before the existing start.
        assert!(!TimeInterval::starting_at(at(9, 20), 30).conflicts_with_buffer(&existing, 10));
    }

    #[test]
    fn zero_buffer_matches_plain_overlap() {
        let a = TimeInterval::starting_at(at(9, 0), 60);
        let b = TimeInterval::starting_at(at(10, 0), 15);
        assert_eq!(a.conflicts_with_buffer(&b, 0), a.overlaps(&b));
    }
}
