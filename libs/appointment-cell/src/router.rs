// libs/appointment-cell/src/router.rs
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, SchedulingState};

pub fn appointment_routes(state: Arc<SchedulingState>) -> Router {
    // All scheduling operations require authentication
    Router::new()
        .route("/", post(handlers::book_appointment))
        .route("/slots", get(handlers::get_slots))
        .route("/conflicts/check", get(handlers::check_conflicts))
        .route("/{appointment_id}", get(handlers::get_appointment))
        .route("/{appointment_id}/session", get(handlers::get_session))

        // Lifecycle transitions
        .route("/{appointment_id}/start", post(handlers::start_consultation))
        .route("/{appointment_id}/complete", post(handlers::complete_consultation))
        .route("/{appointment_id}/cancel", post(handlers::cancel_appointment))
        .route("/{appointment_id}/reschedule", post(handlers::reschedule_appointment))
        .route("/{appointment_id}/no-show", post(handlers::mark_no_show))
        .route("/{appointment_id}/notes", put(handlers::save_consultation_notes))

        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
