pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use handlers::AvailabilityState;
pub use router::availability_routes;
pub use services::availability::AvailabilityService;
pub use services::slots::{compute_slots, fits_within_availability, intervals_overlap};
pub use services::store::{AvailabilityStore, InMemoryAvailabilityStore, SupabaseAvailabilityStore};
