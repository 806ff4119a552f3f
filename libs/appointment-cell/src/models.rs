// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AppConfig;

use crate::services::interval::TimeInterval;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub pet_id: Uuid,
    pub owner_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub appointment_type: String,
    pub reason: Option<String>,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }

    pub fn interval(&self) -> TimeInterval {
        TimeInterval::new(self.start_time, self.end_time())
    }

    /// Cancelled appointments release their time; every other status holds it.
    pub fn occupies_time(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub const ALL: [AppointmentStatus; 4] = [
        AppointmentStatus::Pending,
        AppointmentStatus::Confirmed,
        AppointmentStatus::Completed,
        AppointmentStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, AppointmentStatus::Completed | AppointmentStatus::Cancelled)
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        let normalized = label.trim().to_ascii_lowercase();
        AppointmentStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| AppointmentError::Validation(format!("Unknown appointment status '{}'", label)))
    }
}

// ==============================================================================
// REQUEST/RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CreateAppointmentRequest {
    pub pet_id: Uuid,
    pub owner_id: Uuid,
    pub practitioner_id: Option<Uuid>,
    pub appointment_type: Option<String>,
    pub reason: Option<String>,
    /// RFC 3339 instant; parsed by the booking service so a bad value is a validation error.
    pub start_time: String,
    pub duration_minutes: Option<i64>,
    pub buffer_minutes: Option<i64>,
}

/// Field-level partial update: absent fields keep their stored values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAppointmentRequest {
    pub pet_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub appointment_type: Option<String>,
    pub reason: Option<String>,
    pub start_time: Option<String>,
    pub duration_minutes: Option<i64>,
    pub buffer_minutes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub status: String,
}

/// Fields written by a partial update. `None` means "leave unchanged".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pet_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub practitioner_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub appointment_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_minutes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl AppointmentPatch {
    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(pet_id) = self.pet_id {
            appointment.pet_id = pet_id;
        }
        if let Some(owner_id) = self.owner_id {
            appointment.owner_id = owner_id;
        }
        if let Some(practitioner_id) = self.practitioner_id {
            appointment.practitioner_id = Some(practitioner_id);
        }
        if let Some(appointment_type) = &self.appointment_type {
            appointment.appointment_type = appointment_type.clone();
        }
        if let Some(reason) = &self.reason {
            appointment.reason = Some(reason.clone());
        }
        if let Some(start_time) = self.start_time {
            appointment.start_time = start_time;
        }
        if let Some(duration_minutes) = self.duration_minutes {
            appointment.duration_minutes = duration_minutes;
        }
        if let Some(updated_at) = self.updated_at {
            appointment.updated_at = updated_at;
        }
    }
}

/// Inputs of the buffered overlap rule, handed to the store so it can
/// re-check inside the same unit of work as the write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictGuard {
    pub practitioner_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
    pub buffer_minutes: i64,
    pub exclude_appointment_id: Option<Uuid>,
}

impl ConflictGuard {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppointmentFilters {
    pub pet_id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub practitioner_id: Option<Uuid>,
    pub status: Option<AppointmentStatus>,
    /// Inclusive lower bound on start time.
    pub date_from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on start time.
    pub date_to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl AppointmentFilters {
    pub fn matches(&self, appointment: &Appointment) -> bool {
        self.pet_id.map_or(true, |id| appointment.pet_id == id)
            && self.owner_id.map_or(true, |id| appointment.owner_id == id)
            && self
                .practitioner_id
                .map_or(true, |id| appointment.practitioner_id == Some(id))
            && self.status.map_or(true, |status| appointment.status == status)
            && self.date_from.map_or(true, |from| appointment.start_time >= from)
            && self.date_to.map_or(true, |to| appointment.start_time < to)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.limit)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

// ==============================================================================
// SLOT MODELS
// ==============================================================================

/// A proposed, never persisted, appointment interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub practitioner_id: Uuid,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: i64,
}

impl Slot {
    pub fn end_time(&self) -> DateTime<Utc> {
        self.start_time + Duration::minutes(self.duration_minutes)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotQuery {
    pub date: NaiveDate,
    #[serde(rename = "type", alias = "appointment_type")]
    pub appointment_type: String,
    pub practitioner_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PractitionerSlots {
    pub practitioner_id: Uuid,
    pub slots: Vec<Slot>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlotsResponse {
    pub date: NaiveDate,
    pub appointment_type: String,
    pub duration_minutes: i64,
    pub practitioners: Vec<PractitionerSlots>,
}

// ==============================================================================
// DIRECTORY MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PetRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PractitionerRecord {
    pub id: Uuid,
    pub role: Option<String>,
    pub full_name: Option<String>,
}

impl PractitionerRecord {
    pub const PRACTITIONER_ROLE: &'static str = "vet";

    pub fn is_practitioner(&self) -> bool {
        self.role
            .as_deref()
            .is_some_and(|role| role.eq_ignore_ascii_case(Self::PRACTITIONER_ROLE))
    }
}

// ==============================================================================
// ERROR TYPES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("Pet {pet_id} does not belong to owner {owner_id}")]
    OwnershipMismatch { pet_id: Uuid, owner_id: Uuid },

    #[error("Appointment conflicts with an existing booking: {0}")]
    Conflict(String),

    #[error("Cannot change appointment status from {from} to {to}")]
    InvalidStatusTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },

    #[error("Database error: {0}")]
    Database(String),
}

impl AppointmentError {
    pub fn appointment_not_found(id: Uuid) -> Self {
        AppointmentError::NotFound(format!("Appointment {}", id))
    }
}

// ==============================================================================
// SCHEDULING RULES
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulingRules {
    pub default_buffer_minutes: i64,
    pub slot_step_minutes: i64,
    pub max_duration_minutes: i64,
    pub max_buffer_minutes: i64,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for SchedulingRules {
    fn default() -> Self {
        Self {
            default_buffer_minutes: 10,
            slot_step_minutes: 15,
            max_duration_minutes: 24 * 60,
            max_buffer_minutes: 24 * 60,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl SchedulingRules {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_buffer_minutes: config.default_buffer_minutes,
            slot_step_minutes: config.slot_step_minutes,
            ..Self::default()
        }
    }
}
