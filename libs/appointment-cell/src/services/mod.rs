pub mod interval;
pub mod catalog;
pub mod conflict;
pub mod slots;
pub mod lifecycle;
pub mod store;
pub mod supabase_store;
pub mod directory;
pub mod booking;

pub use booking::AppointmentBookingService;
pub use catalog::{AppointmentKind, AppointmentTypeCatalog, ClinicHours, OperatingWindow};
pub use conflict::ConflictDetectionService;
pub use directory::{PetLookup, PractitionerLookup, StaticDirectory, SupabaseDirectory};
pub use lifecycle::AppointmentLifecycleService;
pub use slots::{SlotGenerator, SlotPlan};
pub use store::{AppointmentRepository, InMemoryAppointmentRepository};
pub use supabase_store::SupabaseAppointmentRepository;
