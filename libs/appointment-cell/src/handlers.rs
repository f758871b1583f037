// libs/appointment-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{NaiveDate, NaiveDateTime};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use availability_cell::AvailabilityStore;
use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;
use shared_utils::clock::Clock;

use crate::models::{
    BookAppointmentRequest, CancelAppointmentRequest, ConsultationNotesRequest,
    RescheduleAppointmentRequest, SchedulingConfig,
};
use crate::services::authorization::{Actor, Role};
use crate::services::booking::BookingTransaction;
use crate::services::conflict::ConflictChecker;
use crate::services::lifecycle::AppointmentLifecycle;
use crate::services::notifications::NotificationSink;
use crate::services::session::ConsultationSessions;
use crate::services::slots::SlotGenerator;
use crate::services::store::AppointmentStore;

// ==============================================================================
// STATE
// ==============================================================================

pub struct SchedulingState {
    pub config: Arc<AppConfig>,
    pub slots: Arc<SlotGenerator>,
    pub conflicts: Arc<ConflictChecker>,
    pub sessions: Arc<ConsultationSessions>,
    pub booking: BookingTransaction,
    pub lifecycle: AppointmentLifecycle,
}

impl SchedulingState {
    pub fn new(
        config: Arc<AppConfig>,
        appointments: Arc<dyn AppointmentStore>,
        availability: Arc<dyn AvailabilityStore>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        scheduling: SchedulingConfig,
    ) -> Self {
        let slots = Arc::new(SlotGenerator::new(
            availability,
            Arc::clone(&appointments),
            Arc::clone(&clock),
            scheduling,
        ));
        let conflicts = Arc::new(ConflictChecker::new(Arc::clone(&appointments), scheduling.store_timeout));
        let sessions = Arc::new(ConsultationSessions::new(Arc::clone(&clock)));

        let booking = BookingTransaction::new(
            Arc::clone(&appointments),
            Arc::clone(&slots),
            Arc::clone(&conflicts),
            Arc::clone(&notifier),
            Arc::clone(&clock),
            scheduling,
        );
        let lifecycle = AppointmentLifecycle::new(
            appointments,
            Arc::clone(&slots),
            Arc::clone(&conflicts),
            Arc::clone(&sessions),
            notifier,
            clock,
            scheduling,
        );

        Self { config, slots, conflicts, sessions, booking, lifecycle }
    }
}

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub doctor_id: Uuid,
    pub clinic_id: Option<Uuid>,
    pub date: NaiveDate,
}

#[derive(Debug, Deserialize)]
pub struct ConflictCheckQuery {
    pub doctor_id: Uuid,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub exclude_appointment_id: Option<Uuid>,
}

fn actor(user: &User) -> Result<Actor, AppError> {
    Actor::from_user(user).map_err(AppError::from)
}

// ==============================================================================
// SLOT AND CONFLICT QUERIES
// ==============================================================================

#[axum::debug_handler]
pub async fn get_slots(
    State(state): State<Arc<SchedulingState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<Value>, AppError> {
    let slots = state.slots
        .generate_slots(query.doctor_id, query.clinic_id, query.date)
        .await?;

    Ok(Json(json!({
        "doctor_id": query.doctor_id,
        "date": query.date,
        "slots": slots
    })))
}

#[axum::debug_handler]
pub async fn check_conflicts(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Query(query): Query<ConflictCheckQuery>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    if actor.role != Role::Admin && !actor.acts_for_doctor(query.doctor_id) {
        return Err(AppError::Forbidden("Not authorized to inspect this doctor's schedule".to_string()));
    }

    let report = state.conflicts
        .conflict_report(query.doctor_id, query.starts_at, query.ends_at, query.exclude_appointment_id)
        .await?;

    Ok(Json(json!(report)))
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[axum::debug_handler]
pub async fn book_appointment(
    State(state): State<Arc<SchedulingState>>,
    Extension(user): Extension<User>,
    Json(request): Json<BookAppointmentRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = actor(&user)?;

    let appointment = state.booking.book(&actor, request).await?;

    Ok((StatusCode::CREATED, Json(json!(appointment))))
}

#[axum::debug_handler]
pub async fn get_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let appointment = state.lifecycle.get(&actor, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

// ==============================================================================
// LIFECYCLE
// ==============================================================================

#[axum::debug_handler]
pub async fn start_consultation(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let appointment = state.lifecycle.start(&actor, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn complete_consultation(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(notes): Json<ConsultationNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let completed = state.lifecycle.complete(&actor, appointment_id, notes).await?;

    Ok(Json(json!(completed)))
}

#[axum::debug_handler]
pub async fn cancel_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    body: Option<Json<CancelAppointmentRequest>>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;
    // a bare POST without a JSON body cancels with no reason
    let reason = body.and_then(|Json(request)| request.reason);

    let appointment = state.lifecycle.cancel(&actor, appointment_id, reason).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn reschedule_appointment(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<RescheduleAppointmentRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let appointment = state.lifecycle.reschedule(&actor, appointment_id, request).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn mark_no_show(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let appointment = state.lifecycle.mark_no_show(&actor, appointment_id).await?;

    Ok(Json(json!(appointment)))
}

#[axum::debug_handler]
pub async fn save_consultation_notes(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(notes): Json<ConsultationNotesRequest>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let note = state.lifecycle.save_notes(&actor, appointment_id, notes).await?;

    Ok(Json(json!(note)))
}

#[axum::debug_handler]
pub async fn get_session(
    State(state): State<Arc<SchedulingState>>,
    Path(appointment_id): Path<Uuid>,
    Extension(user): Extension<User>,
) -> Result<Json<Value>, AppError> {
    let actor = actor(&user)?;

    let session = state.lifecycle.session_status(&actor, appointment_id).await?;

    Ok(Json(json!(session)))
}
