pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::*;
pub use handlers::SchedulingState;
pub use router::appointment_routes;
pub use services::authorization::{can_transition, Actor, Role};
pub use services::booking::BookingTransaction;
pub use services::conflict::ConflictChecker;
pub use services::lifecycle::AppointmentLifecycle;
pub use services::notifications::{BroadcastNotifier, NotificationSink};
pub use services::session::{ConsultationSessions, SessionHandle};
pub use services::slots::SlotGenerator;
pub use services::store::{AppointmentStore, InMemoryAppointmentStore, SupabaseAppointmentStore};
