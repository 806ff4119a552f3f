// libs/appointment-cell/src/services/lifecycle.rs
use tracing::{debug, info, warn};

use crate::models::{AppointmentError, AppointmentStatus};

#[derive(Debug, Default, Clone, Copy)]
pub struct AppointmentLifecycleService;

impl AppointmentLifecycleService {
    pub fn new() -> Self {
        Self
    }

    /// Validate that a status transition follows the forward-only graph.
    /// Used by the dedicated confirm/complete/cancel operations.
    pub fn validate_status_transition(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        debug!("Validating status transition from {} to {}", current_status, new_status);

        if !self.get_valid_transitions(current_status).contains(&new_status) {
            warn!("Invalid status transition attempted: {} -> {}", current_status, new_status);
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        info!("Status transition validated: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Validate a generic status change. Any of the known states may be
    /// targeted, but nothing leaves a terminal state.
    pub fn validate_status_change(
        &self,
        current_status: AppointmentStatus,
        new_status: AppointmentStatus,
    ) -> Result<(), AppointmentError> {
        if current_status.is_terminal() {
            warn!(
                "Status change rejected: {} is terminal (requested {})",
                current_status, new_status
            );
            return Err(AppointmentError::InvalidStatusTransition {
                from: current_status,
                to: new_status,
            });
        }

        debug!("Status change accepted: {} -> {}", current_status, new_status);
        Ok(())
    }

    /// Get all valid next statuses for a given current status
    pub fn get_valid_transitions(&self, current_status: AppointmentStatus) -> Vec<AppointmentStatus> {
        match current_status {
            AppointmentStatus::Pending => vec![AppointmentStatus::Confirmed, AppointmentStatus::Cancelled],
            AppointmentStatus::Confirmed => vec![AppointmentStatus::Completed, AppointmentStatus::Cancelled],
            // Terminal states - no transitions allowed
            AppointmentStatus::Completed => vec![],
            AppointmentStatus::Cancelled => vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn forward_graph() {
        let lifecycle = AppointmentLifecycleService::new();

        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Confirmed)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Completed)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Cancelled)
            .is_ok());
        assert!(lifecycle
            .validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Cancelled)
            .is_ok());

        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Pending, AppointmentStatus::Completed),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
        assert_matches!(
            lifecycle.validate_status_transition(AppointmentStatus::Confirmed, AppointmentStatus::Pending),
            Err(AppointmentError::InvalidStatusTransition { .. })
        );
    }

    #[test]
    fn terminal_states_reject_everything() {
        let lifecycle = AppointmentLifecycleService::new();

        for terminal in [AppointmentStatus::Completed, AppointmentStatus::Cancelled] {
            assert!(lifecycle.get_valid_transitions(terminal).is_empty());
            for target in AppointmentStatus::ALL {
                assert!(lifecycle.validate_status_transition(terminal, target).is_err());
                assert!(lifecycle.validate_status_change(terminal, target).is_err());
            }
        }
    }

    #[test]
    fn generic_change_allows_reentering_pending() {
        let lifecycle = AppointmentLifecycleService::new();
        assert!(lifecycle
            .validate_status_change(AppointmentStatus::Confirmed, AppointmentStatus::Pending)
            .is_ok());
        assert!(lifecycle
            .validate_status_change(AppointmentStatus::Pending, AppointmentStatus::Completed)
            .is_ok());
    }
}
