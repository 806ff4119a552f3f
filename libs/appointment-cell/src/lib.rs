pub mod handlers;
pub mod router;
pub mod models;
pub mod services;
pub mod state;

// Re-export the models and service entry points for the API binary and tests
pub use models::*;
pub use services::*;
pub use state::AppointmentState;
