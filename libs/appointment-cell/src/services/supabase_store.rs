// libs/appointment-cell/src/services/supabase_store.rs
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tracing::{debug, error, info};
use uuid::Uuid;

use shared_database::supabase::{SupabaseClient, SupabaseError};

use crate::models::{
    Appointment, AppointmentError, AppointmentFilters, AppointmentPatch, AppointmentStatus,
    ConflictGuard, Page, Pagination,
};
use crate::services::store::AppointmentRepository;

const TABLE: &str = "/rest/v1/appointments";

impl From<SupabaseError> for AppointmentError {
    fn from(err: SupabaseError) -> Self {
        match err {
            SupabaseError::Conflict(message) => AppointmentError::Conflict(message),
            other => {
                error!("Appointment store failure: {}", other);
                AppointmentError::Database(other.to_string())
            }
        }
    }
}

fn timestamp(value: DateTime<Utc>) -> String {
    urlencoding::encode(&value.to_rfc3339_opts(SecondsFormat::Secs, true)).into_owned()
}

fn return_representation() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("Prefer", HeaderValue::from_static("return=representation"));
    headers
}

/// Appointments stored in Postgres behind PostgREST.
///
/// Checked writes go through the `book_appointment` / `reschedule_appointment`
/// functions (see `migrations/`), which take a transaction-scoped advisory
/// lock on the practitioner before re-running the overlap predicate.
pub struct SupabaseAppointmentRepository {
    supabase: Arc<SupabaseClient>,
}

impl SupabaseAppointmentRepository {
    pub fn new(supabase: Arc<SupabaseClient>) -> Self {
        Self { supabase }
    }

    fn filter_query(filters: &AppointmentFilters) -> Vec<String> {
        let mut query_parts = Vec::new();

        if let Some(pet_id) = filters.pet_id {
            query_parts.push(format!("pet_id=eq.{}", pet_id));
        }
        if let Some(owner_id) = filters.owner_id {
            query_parts.push(format!("owner_id=eq.{}", owner_id));
        }
        if let Some(practitioner_id) = filters.practitioner_id {
            query_parts.push(format!("practitioner_id=eq.{}", practitioner_id));
        }
        if let Some(status) = filters.status {
            query_parts.push(format!("status=eq.{}", status));
        }
        if let Some(from) = filters.date_from {
            query_parts.push(format!("start_time=gte.{}", timestamp(from)));
        }
        if let Some(to) = filters.date_to {
            query_parts.push(format!("start_time=lt.{}", timestamp(to)));
        }

        query_parts
    }

    async fn patch_rows(&self, path: &str, body: serde_json::Value) -> Result<Vec<Appointment>, AppointmentError> {
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(Method::PATCH, path, None, Some(body), Some(return_representation()))
            .await?;
        Ok(rows)
    }
}

#[async_trait]
impl AppointmentRepository for SupabaseAppointmentRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Appointment>, AppointmentError> {
        debug!("Fetching appointment: {}", id);

        let path = format!("{}?id=eq.{}&limit=1", TABLE, id);
        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;

        Ok(rows.into_iter().next())
    }

    async fn find_by_practitioner_in_range(
        &self,
        practitioner_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        let path = format!(
            "{}?practitioner_id=eq.{}&start_time=gte.{}&start_time=lt.{}&order=start_time.asc",
            TABLE,
            practitioner_id,
            timestamp(from),
            timestamp(to)
        );

        let rows: Vec<Appointment> = self.supabase.request(Method::GET, &path, None, None).await?;
        Ok(rows)
    }

    async fn list_by_filters(
        &self,
        filters: &AppointmentFilters,
        pagination: Pagination,
    ) -> Result<Page<Appointment>, AppointmentError> {
        debug!("Listing appointments with filters: {:?}", filters);

        let mut query_parts = Self::filter_query(filters);
        query_parts.push("order=start_time.asc,id.asc".to_string());
        query_parts.push(format!("limit={}", pagination.limit));
        query_parts.push(format!("offset={}", pagination.offset()));

        let path = format!("{}?{}", TABLE, query_parts.join("&"));
        let (items, total): (Vec<Appointment>, Option<u64>) =
            self.supabase.request_with_count(&path, None).await?;

        let total = total.unwrap_or(pagination.offset() + items.len() as u64);

        Ok(Page {
            items,
            page: pagination.page,
            limit: pagination.limit,
            total,
        })
    }

    async fn insert(&self, appointment: Appointment) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(&appointment)
            .map_err(|e| AppointmentError::Database(format!("Failed to encode appointment: {}", e)))?;

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(Method::POST, TABLE, None, Some(body), Some(return_representation()))
            .await?;

        rows.into_iter()
            .next()
            .ok_or_else(|| AppointmentError::Database("Failed to create appointment".to_string()))
    }

    async fn insert_checked(
        &self,
        appointment: Appointment,
        guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError> {
        let args = json!({
            "p_appointment": appointment,
            "p_buffer_minutes": guard.buffer_minutes,
        });

        let stored: Appointment = self.supabase.rpc("book_appointment", args, None).await?;
        info!("Appointment {} booked for practitioner {}", stored.id, guard.practitioner_id);
        Ok(stored)
    }

    async fn update_fields(&self, id: Uuid, patch: &AppointmentPatch) -> Result<Appointment, AppointmentError> {
        let body = serde_json::to_value(patch)
            .map_err(|e| AppointmentError::Database(format!("Failed to encode patch: {}", e)))?;

        let path = format!("{}?id=eq.{}", TABLE, id);
        self.patch_rows(&path, body)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AppointmentError::appointment_not_found(id))
    }

    async fn update_fields_checked(
        &self,
        id: Uuid,
        patch: &AppointmentPatch,
        guard: &ConflictGuard,
    ) -> Result<Appointment, AppointmentError> {
        let args = json!({
            "p_id": id,
            "p_patch": patch,
            "p_buffer_minutes": guard.buffer_minutes,
        });

        match self.supabase.rpc::<Appointment>("reschedule_appointment", args, None).await {
            Ok(updated) => Ok(updated),
            // The function reports a missing id as HTTP 404.
            Err(SupabaseError::NotFound(_)) => Err(AppointmentError::appointment_not_found(id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_status(
        &self,
        id: Uuid,
        from: AppointmentStatus,
        to: AppointmentStatus,
    ) -> Result<Appointment, AppointmentError> {
        let path = format!("{}?id=eq.{}&status=eq.{}", TABLE, id, from);
        let body = json!({
            "status": to,
            "updated_at": Utc::now().to_rfc3339(),
        });

        if let Some(updated) = self.patch_rows(&path, body).await?.into_iter().next() {
            return Ok(updated);
        }

        // Nothing matched: either the row is gone or its status moved on.
        match self.find_by_id(id).await? {
            None => Err(AppointmentError::appointment_not_found(id)),
            Some(current) => Err(AppointmentError::Conflict(format!(
                "appointment {} changed status to {} concurrently",
                id, current.status
            ))),
        }
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppointmentError> {
        let path = format!("{}?id=eq.{}", TABLE, id);
        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(Method::DELETE, &path, None, None, Some(return_representation()))
            .await?;

        if rows.is_empty() {
            return Err(AppointmentError::appointment_not_found(id));
        }

        info!("Appointment {} removed", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn builds_filter_query() {
        let pet = Uuid::nil();
        let filters = AppointmentFilters {
            pet_id: Some(pet),
            status: Some(AppointmentStatus::Confirmed),
            date_from: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
            ..AppointmentFilters::default()
        };

        assert_eq!(
            SupabaseAppointmentRepository::filter_query(&filters),
            vec![
                format!("pet_id=eq.{}", pet),
                "status=eq.confirmed".to_string(),
                "start_time=gte.2024-06-01T00%3A00%3A00Z".to_string(),
            ]
        );
    }

    #[test]
    fn conflict_errors_keep_their_class() {
        let err: AppointmentError = SupabaseError::Conflict("overlap".to_string()).into();
        assert_eq!(err, AppointmentError::Conflict("overlap".to_string()));

        let err: AppointmentError = SupabaseError::Api { status: 500, message: "boom".into() }.into();
        assert!(matches!(err, AppointmentError::Database(_)));
    }
}
