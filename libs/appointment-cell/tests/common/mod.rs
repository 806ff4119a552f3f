#![allow(dead_code)]

use std::sync::Arc;

use chrono::NaiveTime;
use uuid::Uuid;

use appointment_cell::models::{CreateAppointmentRequest, SchedulingRules};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentTypeCatalog, ClinicHours, InMemoryAppointmentRepository,
    StaticDirectory,
};

/// A small clinic: two vets, one receptionist, two owners with one pet each.
pub struct TestClinic {
    pub service: Arc<AppointmentBookingService>,
    pub store: Arc<InMemoryAppointmentRepository>,
    pub vet: Uuid,
    pub second_vet: Uuid,
    pub receptionist: Uuid,
    pub owner: Uuid,
    pub pet: Uuid,
    pub other_owner: Uuid,
    pub other_pet: Uuid,
}

impl TestClinic {
    pub fn new() -> Self {
        let (vet, second_vet, receptionist) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (owner, pet) = (Uuid::new_v4(), Uuid::new_v4());
        let (other_owner, other_pet) = (Uuid::new_v4(), Uuid::new_v4());

        let directory = Arc::new(
            StaticDirectory::new()
                .with_practitioner(vet)
                .with_practitioner(second_vet)
                .with_user(receptionist, "admin")
                .with_pet(pet, owner)
                .with_pet(other_pet, other_owner),
        );
        let store = Arc::new(InMemoryAppointmentRepository::new());
        let catalog = Arc::new(AppointmentTypeCatalog::standard(ClinicHours::new(
            NaiveTime::from_hms_opt(7, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        )));

        let service = AppointmentBookingService::new(
            store.clone(),
            directory.clone(),
            directory,
            catalog,
            SchedulingRules::default(),
        );

        Self {
            service: Arc::new(service),
            store,
            vet,
            second_vet,
            receptionist,
            owner,
            pet,
            other_owner,
            other_pet,
        }
    }

    /// A 30 minute consultation with `vet` at `start` (RFC 3339).
    pub fn request(&self, start: &str) -> CreateAppointmentRequest {
        CreateAppointmentRequest {
            pet_id: self.pet,
            owner_id: self.owner,
            practitioner_id: Some(self.vet),
            appointment_type: Some("general_consultation".to_string()),
            reason: Some("Annual check".to_string()),
            start_time: start.to_string(),
            ..CreateAppointmentRequest::default()
        }
    }
}
