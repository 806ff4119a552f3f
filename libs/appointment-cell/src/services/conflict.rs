use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::{Appointment, AppointmentError, ConflictGuard};
use crate::services::interval::TimeInterval;
use crate::services::store::AppointmentRepository;

/// First existing appointment that blocks `guard`, if any.
///
/// An existing appointment `E` blocks the candidate when it belongs to the
/// same practitioner, is not cancelled, is not the excluded appointment, and
/// `candidate.start < E.end + buffer && E.start < candidate.end + buffer`.
pub fn find_conflict<'a, I>(existing: I, guard: &ConflictGuard) -> Option<&'a Appointment>
where
    I: IntoIterator<Item = &'a Appointment>,
{
    let candidate = TimeInterval::starting_at(guard.start_time, guard.duration_minutes);

    existing.into_iter().find(|appointment| {
        appointment.practitioner_id == Some(guard.practitioner_id)
            && appointment.occupies_time()
            && Some(appointment.id) != guard.exclude_appointment_id
            && candidate.conflicts_with_buffer(&appointment.interval(), guard.buffer_minutes)
    })
}

/// Decides whether a proposed interval collides with a practitioner's bookings.
pub struct ConflictDetectionService {
    appointments: Arc<dyn AppointmentRepository>,
    max_duration_minutes: i64,
}

impl ConflictDetectionService {
    pub fn new(appointments: Arc<dyn AppointmentRepository>, max_duration_minutes: i64) -> Self {
        Self {
            appointments,
            max_duration_minutes,
        }
    }

    /// `Ok(false)` for unassigned appointments: without a practitioner there is
    /// nothing to protect.
    pub async fn has_conflict(
        &self,
        practitioner_id: Option<Uuid>,
        candidate_start: DateTime<Utc>,
        candidate_duration_minutes: i64,
        buffer_minutes: i64,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let Some(practitioner_id) = practitioner_id else {
            return Ok(false);
        };

        let guard = ConflictGuard {
            practitioner_id,
            start_time: candidate_start,
            duration_minutes: candidate_duration_minutes,
            buffer_minutes,
            exclude_appointment_id,
        };

        debug!(
            "Checking conflicts for practitioner {} from {} to {} (buffer {} min)",
            practitioner_id,
            guard.start_time,
            guard.end_time(),
            buffer_minutes
        );

        let (from, to) = self.search_range(&guard);
        let existing = self
            .appointments
            .find_by_practitioner_in_range(practitioner_id, from, to)
            .await?;

        match find_conflict(&existing, &guard) {
            Some(blocking) => {
                warn!(
                    "Conflict detected for practitioner {}: candidate {} overlaps appointment {} at {}",
                    practitioner_id, guard.start_time, blocking.id, blocking.start_time
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Start-time range that can contain a blocking appointment. Any blocker
    /// starts before `candidate.end + buffer` and no earlier than
    /// `candidate.start - (max duration + buffer)`.
    fn search_range(&self, guard: &ConflictGuard) -> (DateTime<Utc>, DateTime<Utc>) {
        let buffer = Duration::minutes(guard.buffer_minutes);
        let from = guard.start_time - Duration::minutes(self.max_duration_minutes) - buffer;
        let to = guard.end_time() + buffer;
        (from, to)
    }
}
