use axum::{
    Router,
    routing::get,
};

use appointment_cell::router::appointment_routes;
use appointment_cell::AppointmentState;

pub fn create_router(state: AppointmentState) -> Router {
    Router::new()
        .route("/", get(|| async { "Vet clinic scheduling API is running!" }))
        .nest("/appointments", appointment_routes(state))
}
