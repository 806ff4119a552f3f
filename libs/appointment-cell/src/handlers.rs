// libs/appointment-cell/src/handlers.rs
use axum::{
    extract::{Path, Query, State, Extension},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{
    AppointmentError, AppointmentFilters, CreateAppointmentRequest, SlotQuery,
    StatusChangeRequest, UpdateAppointmentRequest,
};
use crate::state::AppointmentState;

impl From<AppointmentError> for AppError {
    fn from(e: AppointmentError) -> Self {
        match e {
            AppointmentError::Validation(msg) => AppError::ValidationError(msg),
            AppointmentError::NotFound(what) => AppError::NotFound(format!("{} not found", what)),
            AppointmentError::OwnershipMismatch { .. } => AppError::Forbidden(e.to_string()),
            AppointmentError::Conflict(msg) => AppError::Conflict(msg),
            AppointmentError::InvalidStatusTransition { .. } => AppError::ValidationError(e.to_string()),
            AppointmentError::Database(msg) => AppError::Database(msg),
        }
    }
}

fn actor_id(user: &User) -> Result<Uuid, AppError> {
    user.uuid()
        .ok_or_else(|| AppError::Auth("Token subject is not a valid user id".to_string()))
}

// ==============================================================================
// BOOKING HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_appointment(
    State(state): State<AppointmentState>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let created_by = actor_id(&user)?;

    let appointment = state.booking.create_appointment(request, created_by).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "appointment": appointment,
            "message": "Appointment booked successfully"
        })),
    ))
}

#[axum::debug_handler]
pub async fn update_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<UpdateAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.update_appointment(appointment_id, request).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment updated successfully"
    })))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.get_appointment(appointment_id).await?;
    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn list_appointments(
    State(state): State<AppointmentState>,
    Query(filters): Query<AppointmentFilters>,
) -> Result<Json<Value>, AppError> {
    let page = state.booking.list(filters).await?;

    Ok(Json(json!({
        "appointments": page.items,
        "page": page.page,
        "limit": page.limit,
        "total": page.total
    })))
}

#[axum::debug_handler]
pub async fn delete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    state.booking.remove(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "message": "Appointment removed"
    })))
}

// ==============================================================================
// STATUS HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn confirm_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.confirm(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment confirmed"
    })))
}

#[axum::debug_handler]
pub async fn complete_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.complete(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment completed"
    })))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.cancel(appointment_id).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": "Appointment cancelled successfully"
    })))
}

#[axum::debug_handler]
pub async fn change_appointment_status(
    State(state): State<AppointmentState>,
    Path(appointment_id): Path<Uuid>,
    Json(request): Json<StatusChangeRequest>,
) -> Result<Json<Value>, AppError> {
    let appointment = state.booking.change_status(appointment_id, &request.status).await?;

    Ok(Json(json!({
        "success": true,
        "appointment": appointment,
        "message": format!("Appointment status set to {}", appointment.status)
    })))
}

// ==============================================================================
// AVAILABILITY HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn get_available_slots(
    State(state): State<AppointmentState>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.booking.get_slots(query).await?;
    Ok(Json(json!(slots)))
}
