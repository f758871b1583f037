use std::sync::Arc;

use axum::{
    Router,
    routing::{get, put},
    middleware,
};

use shared_utils::extractor::auth_middleware;

use crate::handlers::{self, AvailabilityState};

pub fn availability_routes(state: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route(
            "/doctors/{doctor_id}/rules",
            get(handlers::list_rules).post(handlers::create_rule),
        )
        .route(
            "/doctors/{doctor_id}/rules/{rule_id}",
            put(handlers::update_rule).delete(handlers::delete_rule),
        )
        .layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state)
}
