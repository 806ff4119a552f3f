// libs/appointment-cell/src/state.rs
use std::sync::Arc;

use tracing::{info, warn};

use shared_config::{AppConfig, StoreBackend};
use shared_database::supabase::SupabaseClient;

use crate::models::SchedulingRules;
use crate::services::booking::AppointmentBookingService;
use crate::services::catalog::AppointmentTypeCatalog;
use crate::services::directory::{PetLookup, PractitionerLookup, StaticDirectory, SupabaseDirectory};
use crate::services::store::{AppointmentRepository, InMemoryAppointmentRepository};
use crate::services::supabase_store::SupabaseAppointmentRepository;

/// Shared state handed to every appointment handler. Built once at startup.
#[derive(Clone)]
pub struct AppointmentState {
    pub config: Arc<AppConfig>,
    pub booking: Arc<AppointmentBookingService>,
}

impl AppointmentState {
    pub fn new(config: Arc<AppConfig>, booking: Arc<AppointmentBookingService>) -> Self {
        Self { config, booking }
    }

    /// Wires the configured appointment store. Pets and practitioners come
    /// from Supabase whenever it is configured, even with the memory store.
    pub fn from_config(config: Arc<AppConfig>) -> Self {
        let catalog = Arc::new(AppointmentTypeCatalog::from_config(&config));
        let rules = SchedulingRules::from_config(&config);

        let supabase = config
            .is_configured()
            .then(|| Arc::new(SupabaseClient::new(&config)));

        let appointments: Arc<dyn AppointmentRepository> = match (config.store_backend, &supabase) {
            (StoreBackend::Supabase, Some(client)) => {
                info!("Using Supabase appointment store");
                Arc::new(SupabaseAppointmentRepository::new(Arc::clone(client)))
            }
            (StoreBackend::Supabase, None) => {
                warn!("Supabase store requested but not configured, falling back to memory");
                Arc::new(InMemoryAppointmentRepository::new())
            }
            (StoreBackend::Memory, _) => {
                info!("Using in-memory appointment store");
                Arc::new(InMemoryAppointmentRepository::new())
            }
        };

        let (pets, practitioners): (Arc<dyn PetLookup>, Arc<dyn PractitionerLookup>) = match supabase {
            Some(client) => {
                let directory = Arc::new(SupabaseDirectory::new(client));
                (directory.clone() as Arc<dyn PetLookup>, directory as Arc<dyn PractitionerLookup>)
            }
            None => {
                warn!("No pet/practitioner directory configured; bookings will fail lookup");
                let directory = Arc::new(StaticDirectory::new());
                (directory.clone() as Arc<dyn PetLookup>, directory as Arc<dyn PractitionerLookup>)
            }
        };

        let booking = AppointmentBookingService::new(appointments, pets, practitioners, catalog, rules);
        Self::new(config, Arc::new(booking))
    }
}
