use std::sync::Arc;

use axum::{
    Json, Router,
    routing::get,
};
use serde_json::{json, Value};

use appointment_cell::{appointment_routes, SchedulingState};
use availability_cell::{availability_routes, AvailabilityState};

pub fn create_router(scheduling: Arc<SchedulingState>, availability: Arc<AvailabilityState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Clinic scheduling API is running!" }))
        .route("/health", get(health))
        .nest("/appointments", appointment_routes(scheduling))
        .nest("/availability", availability_routes(availability))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
