// libs/appointment-cell/src/services/slots.rs
use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Appointment, Slot};
use crate::services::catalog::AppointmentTypeCatalog;
use crate::services::interval::TimeInterval;

/// Result of one slot-generation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotPlan {
    pub duration_minutes: i64,
    /// Chronological slots per practitioner. Every requested practitioner has
    /// an entry, possibly empty.
    pub slots: BTreeMap<Uuid, Vec<Slot>>,
}

/// Greedy first-fit slot proposer.
///
/// Within each operating window the cursor starts at the window's open time.
/// A candidate that does not overlap an existing (non-cancelled) appointment
/// is accepted and the cursor jumps by the full duration; otherwise it moves
/// by one step. Gaps shorter than a full duration that follow a rejected
/// candidate can be skipped.
pub struct SlotGenerator {
    catalog: Arc<AppointmentTypeCatalog>,
    step_minutes: i64,
}

impl SlotGenerator {
    pub fn new(catalog: Arc<AppointmentTypeCatalog>, step_minutes: i64) -> Self {
        Self {
            catalog,
            step_minutes: step_minutes.max(1),
        }
    }

    pub fn generate(
        &self,
        date: NaiveDate,
        appointment_type: &str,
        practitioners: &[Uuid],
        existing: &[Appointment],
    ) -> SlotPlan {
        let duration_minutes = self.catalog.duration_for(appointment_type);
        let windows = self.catalog.windows_for(appointment_type);

        let mut slots = BTreeMap::new();
        for &practitioner_id in practitioners {
            let busy: Vec<TimeInterval> = existing
                .iter()
                .filter(|a| a.practitioner_id == Some(practitioner_id) && a.occupies_time())
                .map(Appointment::interval)
                .collect();

            let mut proposed: Vec<Slot> = Vec::new();
            for window in windows {
                let bounds = window.on(date);
                let from = proposed.last().map_or(bounds.start, |s| s.end_time().max(bounds.start));
                self.walk_window(practitioner_id, from, bounds.end, duration_minutes, &busy, &mut proposed);
            }

            debug!(
                "Generated {} {} slot(s) for practitioner {} on {}",
                proposed.len(),
                appointment_type,
                practitioner_id,
                date
            );
            slots.insert(practitioner_id, proposed);
        }

        SlotPlan {
            duration_minutes,
            slots,
        }
    }

    fn walk_window(
        &self,
        practitioner_id: Uuid,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
        duration_minutes: i64,
        busy: &[TimeInterval],
        out: &mut Vec<Slot>,
    ) {
        let duration = Duration::minutes(duration_minutes);
        let step = Duration::minutes(self.step_minutes);
        let last_start = window_end - duration;

        let mut cursor = window_start;
        while cursor <= last_start {
            let candidate = TimeInterval::new(cursor, cursor + duration);

            if busy.iter().any(|interval| candidate.overlaps(interval)) {
                cursor += step;
            } else {
                out.push(Slot {
                    practitioner_id,
                    start_time: cursor,
                    duration_minutes,
                });
                cursor += duration;
            }
        }
    }
}
