// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Appointment, AppointmentError, AppointmentFilters, AppointmentPatch, AppointmentStatus,
    ConflictGuard, CreateAppointmentRequest, Page, Pagination, PractitionerSlots, SchedulingRules,
    SlotQuery, SlotsResponse, UpdateAppointmentRequest,
};
use crate::services::catalog::{AppointmentKind, AppointmentTypeCatalog};
use crate::services::conflict::ConflictDetectionService;
use crate::services::directory::{PetLookup, PractitionerLookup};
use crate::services::lifecycle::AppointmentLifecycleService;
use crate::services::slots::SlotGenerator;
use crate::services::store::AppointmentRepository;

/// Label stored when a booking names no appointment type.
pub const DEFAULT_APPOINTMENT_TYPE: &str = "general_consultation";

pub struct AppointmentBookingService {
    appointments: Arc<dyn AppointmentRepository>,
    pets: Arc<dyn PetLookup>,
    practitioners: Arc<dyn PractitionerLookup>,
    catalog: Arc<AppointmentTypeCatalog>,
    conflict_service: ConflictDetectionService,
    lifecycle_service: AppointmentLifecycleService,
    slot_generator: SlotGenerator,
    rules: SchedulingRules,
}

impl AppointmentBookingService {
    pub fn new(
        appointments: Arc<dyn AppointmentRepository>,
        pets: Arc<dyn PetLookup>,
        practitioners: Arc<dyn PractitionerLookup>,
        catalog: Arc<AppointmentTypeCatalog>,
        rules: SchedulingRules,
    ) -> Self {
        let conflict_service = ConflictDetectionService::new(Arc::clone(&appointments), rules.max_duration_minutes);
        let slot_generator = SlotGenerator::new(Arc::clone(&catalog), rules.slot_step_minutes);

        Self {
            appointments,
            pets,
            practitioners,
            catalog,
            conflict_service,
            lifecycle_service: AppointmentLifecycleService::new(),
            slot_generator,
            rules,
        }
    }

    pub fn rules(&self) -> &SchedulingRules {
        &self.rules
    }

    // ==============================================================================
    // BOOKING
    // ==============================================================================

    /// Book a new appointment in `pending`.
    ///
    /// Checks run in a fixed order: pet ownership, practitioner capability,
    /// start time, duration and buffer, then the overlap check. The write
    /// re-evaluates the overlap rule atomically in the store.
    #[instrument(skip(self, request), fields(pet_id = %request.pet_id, practitioner_id = ?request.practitioner_id))]
    pub async fn create_appointment(
        &self,
        request: CreateAppointmentRequest,
        created_by: Uuid,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for pet {}", request.pet_id);

        self.verify_pet_ownership(request.pet_id, request.owner_id).await?;
        if let Some(practitioner_id) = request.practitioner_id {
            self.verify_practitioner(practitioner_id).await?;
        }

        let start_time = parse_start_time(&request.start_time)?;
        let appointment_type = resolve_type_label(request.appointment_type.as_deref());
        let duration_minutes = request
            .duration_minutes
            .unwrap_or_else(|| self.catalog.duration_for(&appointment_type));
        let buffer_minutes = request.buffer_minutes.unwrap_or(self.rules.default_buffer_minutes);
        self.validate_duration_and_buffer(duration_minutes, buffer_minutes)?;

        if self
            .conflict_service
            .has_conflict(request.practitioner_id, start_time, duration_minutes, buffer_minutes, None)
            .await?
        {
            return Err(conflict_error(start_time));
        }

        let now = Utc::now();
        let appointment = Appointment {
            id: Uuid::new_v4(),
            pet_id: request.pet_id,
            owner_id: request.owner_id,
            practitioner_id: request.practitioner_id,
            appointment_type,
            reason: request.reason,
            start_time,
            duration_minutes,
            status: AppointmentStatus::Pending,
            created_by,
            created_at: now,
            updated_at: now,
        };

        let stored = match appointment.practitioner_id {
            Some(practitioner_id) => {
                let guard = ConflictGuard {
                    practitioner_id,
                    start_time,
                    duration_minutes,
                    buffer_minutes,
                    exclude_appointment_id: None,
                };
                self.appointments.insert_checked(appointment, &guard).await?
            }
            None => self.appointments.insert(appointment).await?,
        };

        info!("Appointment {} booked at {}", stored.id, stored.start_time);
        Ok(stored)
    }

    /// Partial update. Absent fields keep their stored values and the merged
    /// appointment goes through the same checks as a new booking, with the
    /// appointment itself excluded from the overlap check.
    #[instrument(skip(self, request))]
    pub async fn update_appointment(
        &self,
        appointment_id: Uuid,
        request: UpdateAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Updating appointment {}", appointment_id);

        let current = self.get_appointment(appointment_id).await?;

        let pet_id = request.pet_id.unwrap_or(current.pet_id);
        let owner_id = request.owner_id.unwrap_or(current.owner_id);
        self.verify_pet_ownership(pet_id, owner_id).await?;

        let practitioner_id = request.practitioner_id.or(current.practitioner_id);
        if let Some(practitioner_id) = practitioner_id {
            self.verify_practitioner(practitioner_id).await?;
        }

        let new_start = request.start_time.as_deref().map(parse_start_time).transpose()?;
        let start_time = new_start.unwrap_or(current.start_time);
        let duration_minutes = request.duration_minutes.unwrap_or(current.duration_minutes);
        let buffer_minutes = request.buffer_minutes.unwrap_or(self.rules.default_buffer_minutes);
        self.validate_duration_and_buffer(duration_minutes, buffer_minutes)?;

        if self
            .conflict_service
            .has_conflict(practitioner_id, start_time, duration_minutes, buffer_minutes, Some(appointment_id))
            .await?
        {
            return Err(conflict_error(start_time));
        }

        let patch = AppointmentPatch {
            pet_id: request.pet_id,
            owner_id: request.owner_id,
            practitioner_id: request.practitioner_id,
            appointment_type: request
                .appointment_type
                .as_deref()
                .map(|label| resolve_type_label(Some(label))),
            reason: request.reason,
            start_time: new_start,
            duration_minutes: request.duration_minutes,
            updated_at: Some(Utc::now()),
        };

        let updated = match practitioner_id {
            Some(practitioner_id) => {
                let guard = ConflictGuard {
                    practitioner_id,
                    start_time,
                    duration_minutes,
                    buffer_minutes,
                    exclude_appointment_id: Some(appointment_id),
                };
                self.appointments
                    .update_fields_checked(appointment_id, &patch, &guard)
                    .await?
            }
            None => self.appointments.update_fields(appointment_id, &patch).await?,
        };

        info!("Appointment {} updated", appointment_id);
        Ok(updated)
    }

    // ==============================================================================
    // STATUS TRANSITIONS
    // ==============================================================================

    pub async fn confirm(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Confirmed).await
    }

    pub async fn complete(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Completed).await
    }

    pub async fn cancel(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.transition(appointment_id, AppointmentStatus::Cancelled).await
    }

    /// Set any known status. Only terminal sources are refused here; the
    /// forward-only graph is enforced by the dedicated operations.
    #[instrument(skip(self))]
    pub async fn change_status(&self, appointment_id: Uuid, status: &str) -> Result<Appointment, AppointmentError> {
        let target: AppointmentStatus = status.parse()?;
        let current = self.get_appointment(appointment_id).await?;

        self.lifecycle_service.validate_status_change(current.status, target)?;

        let updated = self
            .appointments
            .update_status(appointment_id, current.status, target)
            .await?;

        info!("Appointment {} status changed {} -> {}", appointment_id, current.status, target);
        Ok(updated)
    }

    async fn transition(
        &self,
        appointment_id: Uuid,
        target: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let current = self.get_appointment(appointment_id).await?;

        self.lifecycle_service.validate_status_transition(current.status, target)?;

        let updated = self
            .appointments
            .update_status(appointment_id, current.status, target)
            .await?;

        info!("Appointment {} moved {} -> {}", appointment_id, current.status, target);
        Ok(updated)
    }

    // ==============================================================================
    // AVAILABILITY
    // ==============================================================================

    /// Open slots for every candidate practitioner on `query.date`.
    pub async fn get_slots(&self, query: SlotQuery) -> Result<SlotsResponse, AppointmentError> {
        debug!("Generating {} slots for {}", query.appointment_type, query.date);

        // Appointments that started the day before can still reach into this day.
        let (from, to) = self.slot_search_range(query.date)?;

        let practitioner_ids = match query.practitioner_id {
            Some(practitioner_id) => {
                self.verify_practitioner_exists(practitioner_id).await?;
                vec![practitioner_id]
            }
            None => self
                .practitioners
                .list_practitioners()
                .await?
                .into_iter()
                .map(|p| p.id)
                .collect(),
        };

        let mut existing = Vec::new();
        for &practitioner_id in &practitioner_ids {
            existing.extend(
                self.appointments
                    .find_by_practitioner_in_range(practitioner_id, from, to)
                    .await?,
            );
        }

        let plan = self
            .slot_generator
            .generate(query.date, &query.appointment_type, &practitioner_ids, &existing);

        let appointment_type = self
            .catalog
            .profile_for(&query.appointment_type)
            .kind
            .map(|kind| kind.label().to_string())
            .unwrap_or_else(|| query.appointment_type.trim().to_string());

        Ok(SlotsResponse {
            date: query.date,
            appointment_type,
            duration_minutes: plan.duration_minutes,
            practitioners: plan
                .slots
                .into_iter()
                .map(|(practitioner_id, slots)| PractitionerSlots { practitioner_id, slots })
                .collect(),
        })
    }

    // ==============================================================================
    // READS AND REMOVAL
    // ==============================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        self.appointments
            .find_by_id(appointment_id)
            .await?
            .ok_or_else(|| AppointmentError::appointment_not_found(appointment_id))
    }

    pub async fn list(&self, filters: AppointmentFilters) -> Result<Page<Appointment>, AppointmentError> {
        let pagination = self.resolve_pagination(&filters)?;

        if let (Some(from), Some(to)) = (filters.date_from, filters.date_to) {
            if from > to {
                return Err(AppointmentError::Validation(
                    "date_from must not be after date_to".to_string(),
                ));
            }
        }

        self.appointments.list_by_filters(&filters, pagination).await
    }

    pub async fn remove(&self, appointment_id: Uuid) -> Result<(), AppointmentError> {
        self.appointments.delete(appointment_id).await?;
        info!("Appointment {} removed", appointment_id);
        Ok(())
    }

    // ==============================================================================
    // VALIDATION HELPERS
    // ==============================================================================

    async fn verify_pet_ownership(&self, pet_id: Uuid, owner_id: Uuid) -> Result<(), AppointmentError> {
        let pet = self
            .pets
            .get(pet_id)
            .await?
            .ok_or_else(|| AppointmentError::NotFound(format!("Pet {}", pet_id)))?;

        if pet.owner_id != owner_id {
            warn!("Pet {} belongs to {}, not {}", pet_id, pet.owner_id, owner_id);
            return Err(AppointmentError::OwnershipMismatch { pet_id, owner_id });
        }

        Ok(())
    }

    async fn verify_practitioner(&self, practitioner_id: Uuid) -> Result<(), AppointmentError> {
        match self.practitioners.get(practitioner_id).await? {
            Some(record) if record.is_practitioner() => Ok(()),
            Some(_) => Err(AppointmentError::Validation(format!(
                "User {} is not a practitioner",
                practitioner_id
            ))),
            None => Err(AppointmentError::Validation(format!(
                "Practitioner {} does not exist",
                practitioner_id
            ))),
        }
    }

    /// Like `verify_practitioner`, but a missing user is `NotFound`.
    async fn verify_practitioner_exists(&self, practitioner_id: Uuid) -> Result<(), AppointmentError> {
        match self.practitioners.get(practitioner_id).await? {
            None => Err(AppointmentError::NotFound(format!("Practitioner {}", practitioner_id))),
            Some(_) => self.verify_practitioner(practitioner_id).await,
        }
    }

    fn validate_duration_and_buffer(&self, duration_minutes: i64, buffer_minutes: i64) -> Result<(), AppointmentError> {
        if duration_minutes <= 0 {
            return Err(AppointmentError::Validation(
                "duration_minutes must be positive".to_string(),
            ));
        }
        if duration_minutes > self.rules.max_duration_minutes {
            return Err(AppointmentError::Validation(format!(
                "duration_minutes must not exceed {}",
                self.rules.max_duration_minutes
            )));
        }
        if buffer_minutes <= 0 {
            return Err(AppointmentError::Validation(
                "buffer_minutes must be positive".to_string(),
            ));
        }
        if buffer_minutes > self.rules.max_buffer_minutes {
            return Err(AppointmentError::Validation(format!(
                "buffer_minutes must not exceed {}",
                self.rules.max_buffer_minutes
            )));
        }
        Ok(())
    }

    /// Start-time range of appointments that can touch `date`. Dates whose
    /// range or slot walk would leave the representable calendar are rejected.
    fn slot_search_range(&self, date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>), AppointmentError> {
        let day_start = date.and_time(NaiveTime::MIN).and_utc();
        let reach = Duration::minutes(self.rules.max_duration_minutes);

        let from = day_start.checked_sub_signed(reach);
        let to = day_start.checked_add_signed(Duration::days(1));
        match (from, to) {
            (Some(from), Some(to)) if to.checked_add_signed(reach).is_some() => Ok((from, to)),
            _ => Err(AppointmentError::Validation(format!("date {} is out of range", date))),
        }
    }

    fn resolve_pagination(&self, filters: &AppointmentFilters) -> Result<Pagination, AppointmentError> {
        let page = filters.page.unwrap_or(1);
        let limit = filters.limit.unwrap_or(self.rules.default_page_size);

        if page == 0 {
            return Err(AppointmentError::Validation("page must be at least 1".to_string()));
        }
        if limit == 0 || limit > self.rules.max_page_size {
            return Err(AppointmentError::Validation(format!(
                "limit must be between 1 and {}",
                self.rules.max_page_size
            )));
        }

        Ok(Pagination { page, limit })
    }
}

fn parse_start_time(raw: &str) -> Result<DateTime<Utc>, AppointmentError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|e| AppointmentError::Validation(format!("Invalid start_time '{}': {}", raw, e)))
}

/// Known labels are stored in canonical form; anything else is kept as given.
fn resolve_type_label(label: Option<&str>) -> String {
    match label.map(str::trim).filter(|l| !l.is_empty()) {
        None => DEFAULT_APPOINTMENT_TYPE.to_string(),
        Some(label) => AppointmentKind::from_label(label)
            .map(|kind| kind.label().to_string())
            .unwrap_or_else(|| label.to_string()),
    }
}

fn conflict_error(start_time: DateTime<Utc>) -> AppointmentError {
    AppointmentError::Conflict(format!("requested time {} overlaps an existing booking", start_time))
}
