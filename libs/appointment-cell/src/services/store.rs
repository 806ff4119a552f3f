use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilters, AppointmentPatch, AppointmentStatus,
    ConflictGuard, Page, Pagination,
};
use crate::services::conflict::find_conflict;

/// Persistence boundary for appointments.
///
/// `insert_checked` and `update_fields_checked` must evaluate the buffered
/// overlap rule for the guard and perform the write as one serialised unit
/// per practitioner, so two concurrent bookings cannot both pass the check.
#[async_trait]
pub trait AppointmentRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError>;

    /// Appointments of `practitioner_id` whose start lies in `[from, to)`, any status,
    /// ordered by start time.
    async fn find_by_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError>;

    async fn find_by_practitioner_and_day(
        &self,
        practitioner_id: Uuid,
        day: NaiveDate,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let start = day.and_time(chrono::NaiveTime::MIN).and_utc();
        let end = start
            .checked_add_signed(Duration::days(1))
            .ok_or_else(|| AppointmentError::Validation(format!("date {} is out of range", day)))?;
        self.find_by_practitioner_in_range(practitioner_id, start, end).await
    }

    async fn list_by_filters(
        &self,
        filters: &AppointmentFilters,
        pagination: Pagination,
    ) -> Result<Page<Appointment>, AppointmentError>;

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError>;

    async fn insert_checked(
        &self,
        appointment: Appointment,
        guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError>;

    async fn update_fields(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, AppointmentError>;

    async fn update_fields_checked(
        &self,
        id: Uuid,
        patch: &AppointmentPatch,
        guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError>;

    /// Compare-and-set on status: fails with `Conflict` when the stored status
    /// is no longer `from`.
    async fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError>;

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError>;
}

/// Process-local store. Every write holds the single write lock, which makes
/// the checked writes atomic with respect to each other.
#[derive(Default)]
pub struct InMemoryAppointmentRepository {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryAppointmentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.appointments.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.appointments.read().await.is_empty()
    }
}

fn reject_if_conflicting(
    appointments: &HashMap<Uuid, Appointment>,
    guard: &ConflictGuard,
) -> Result<(), AppointmentError> {
    if let Some(blocking) = find_conflict(appointments.values(), guard) {
        warn!(
            "Rejecting write for practitioner {}: blocked by appointment {}",
            guard.practitioner_id, blocking.id
        );
        return Err(AppointmentError::Conflict(format!(
            "practitioner {} is booked at {}",
            guard.practitioner_id, blocking.start_time
        )));
    }
    Ok(())
}

#[async_trait]
impl AppointmentRepository for InMemoryAppointmentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn find_by_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let guard = self.appointments.read().await;
        let mut found: Vec<Appointment> = guard
            .values()
            .filter(|a| {
                a.practitioner_id == Some(practitioner_id) && a.start_time >= from && a.start_time < to
            })
            .cloned()
            .collect();
        found.sort_by_key(|a| (a.start_time, a.id));
        Ok(found)
    }

    async fn list_by_filters(
        &self,
        filters: &AppointmentFilters,
        pagination: Pagination,
    ) -> Result<Page<Appointment>, AppointmentError> {
        let guard = self.appointments.read().await;
        let mut matching: Vec<&Appointment> = guard.values().filter(|a| filters.matches(a)).collect();
        matching.sort_by_key(|a| (a.start_time, a.id));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(usize::try_from(pagination.offset()).unwrap_or(usize::MAX))
            .take(pagination.limit as usize)
            .cloned()
            .collect();

        Ok(Page {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        })
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let mut guard = self.appointments.write().await;
        if guard.contains_key(&appointment.id) {
            return Err(AppointmentError::Database(format!(
                "duplicate appointment id {}",
                appointment.id
            )));
        }
        guard.insert(appointment.id, appointment.clone());
        debug!("Stored appointment {}", appointment.id);
        Ok(appointment)
    }

    async fn insert_checked(
        &self,
        appointment: Appointment,
        conflict_guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError> {
        let mut guard = self.appointments.write().await;
        reject_if_conflicting(&guard, conflict_guard)?;
        if guard.contains_key(&appointment.id) {
            return Err(AppointmentError::Database(format!(
                "duplicate appointment id {}",
                appointment.id
            )));
        }
        guard.insert(appointment.id, appointment.clone());
        info!("Stored appointment {} after conflict check", appointment.id);
        Ok(appointment)
    }

    async fn update_fields(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, AppointmentError> {
        let mut guard = self.appointments.write().await;
        let appointment = guard
            .get_mut(&id)
            .ok_or_else(|| AppointmentError::appointment_not_found(id))?;
        patch.apply_to(appointment);
        Ok(appointment.clone())
    }

    async fn update_fields_checked(
        &self,
        id: Uuid,
        patch: &AppointmentPatch,
        conflict_guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError> {
        let mut guard = self.appointments.write().await;
        if !guard.contains_key(&id) {
            return Err(AppointmentError::appointment_not_found(id));
        }
        reject_if_conflicting(&guard, conflict_guard)?;

        let appointment = guard
            .get_mut(&id)
            .ok_or_else(|| AppointmentError::appointment_not_found(id))?;
        patch.apply_to(appointment);
        Ok(appointment.clone())
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let mut guard = self.appointments.write().await;
        let appointment = guard
            .get_mut(&id)
            .ok_or_else(|| AppointmentError::appointment_not_found(id))?;

        if appointment.status != from {
            return Err(AppointmentError::Conflict(format!(
                "appointment {} changed status to {} concurrently",
                id, appointment.status
            )));
        }

        appointment.status = to;
        appointment.updated_at = Utc::now();
        Ok(appointment.clone())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError> {
        self.appointments
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AppointmentError::appointment_not_found(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::TimeZone;

    fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, day, hour, minute, 0).unwrap()
    }

    fn appointment(practitioner: Option<Uuid>, start: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            pet_id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            practitioner_id: practitioner,
            appointment_type: "checkup".to_string(),
            reason: None,
            start_time: start,
            duration_minutes: 20,
            status: AppointmentStatus::Pending,
            created_by: Uuid::new_v4(),
            created_at: start,
            updated_at: start,
        }
    }

    #[tokio::test]
    async fn day_query_is_bounded_to_the_calendar_day() {
        let vet = Uuid::new_v4();
        let store = InMemoryAppointmentRepository::new();
        store.insert(appointment(Some(vet), at(1, 23, 50))).await.unwrap();
        store.insert(appointment(Some(vet), at(2, 0, 0))).await.unwrap();
        store.insert(appointment(Some(vet), at(2, 16, 0))).await.unwrap();
        store.insert(appointment(Some(vet), at(3, 0, 0))).await.unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 6, 2).unwrap();
        let found = store.find_by_practitioner_and_day(vet, day).await.unwrap();
        let starts: Vec<_> = found.iter().map(|a| a.start_time).collect();
        assert_eq!(starts, vec![at(2, 0, 0), at(2, 16, 0)]);

        assert_matches!(
            store.find_by_practitioner_and_day(vet, NaiveDate::MAX).await,
            Err(AppointmentError::Validation(_))
        );
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let store = InMemoryAppointmentRepository::new();
        let stored = store.insert(appointment(None, at(1, 9, 0))).await.unwrap();

        let confirmed = store
            .update_status(stored.id, AppointmentStatus::Pending, AppointmentStatus::Confirmed)
            .await
            .unwrap();
        assert_eq!(confirmed.status, AppointmentStatus::Confirmed);

        let stale = store
            .update_status(stored.id, AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .await;
        assert_matches!(stale, Err(AppointmentError::Conflict(_)));
    }

    #[tokio::test]
    async fn checked_update_excludes_itself() {
        let vet = Uuid::new_v4();
        let store = InMemoryAppointmentRepository::new();
        let stored = store.insert(appointment(Some(vet), at(1, 9, 0))).await.unwrap();

        let patch = AppointmentPatch {
            start_time: Some(at(1, 9, 5)),
            ..AppointmentPatch::default()
        };
        let guard = ConflictGuard {
            practitioner_id: vet,
            start_time: at(1, 9, 5),
            duration_minutes: 20,
            buffer_minutes: 10,
            exclude_appointment_id: Some(stored.id),
        };

        let moved = store.update_fields_checked(stored.id, &patch, &guard).await.unwrap();
        assert_eq!(moved.start_time, at(1, 9, 5));
    }

    #[tokio::test]
    async fn delete_missing_is_not_found() {
        let store = InMemoryAppointmentRepository::new();
        assert_matches!(store.delete(Uuid::new_v4()).await, Err(AppointmentError::NotFound(_)));
    }
}
