pub mod booking;
pub mod conflict;
pub mod consistency;
pub mod lifecycle;
pub mod store;
pub mod supabase_store;
pub mod timezone;

pub use booking::AppointmentBookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use store::{AppointmentStore, MemoryAppointmentStore, StoreError};
pub use supabase_store::SupabaseAppointmentStore;
pub use timezone::{TimeConversionService, TimeUnit};
