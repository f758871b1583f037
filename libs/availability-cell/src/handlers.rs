use std::sync::Arc;

use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use shared_config::AppConfig;
use shared_models::auth::User;
use shared_models::error::AppError;

use crate::models::{CreateAvailabilityRequest, UpdateAvailabilityRequest};
use crate::services::availability::AvailabilityService;

pub struct AvailabilityState {
    pub config: Arc<AppConfig>,
    pub service: AvailabilityService,
}

// Only the doctor themselves or an admin may change a schedule
fn ensure_can_manage(user: &User, doctor_id: Uuid) -> Result<(), AppError> {
    let is_admin = user.role.as_deref() == Some("admin");
    if is_admin || user.id == doctor_id.to_string() {
        Ok(())
    } else {
        Err(AppError::Forbidden("Not authorized to manage availability for this doctor".to_string()))
    }
}

#[axum::debug_handler]
pub async fn list_rules(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
) -> Result<Json<Value>, AppError> {
    let rules = state.service.list_rules(doctor_id).await?;

    Ok(Json(json!({
        "rules": rules,
        "total": rules.len()
    })))
}

#[axum::debug_handler]
pub async fn create_rule(
    State(state): State<Arc<AvailabilityState>>,
    Path(doctor_id): Path<Uuid>,
    Extension(user): Extension<User>,
    Json(request): Json<CreateAvailabilityRequest>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    ensure_can_manage(&user, doctor_id)?;

    let rule = state.service.create_rule(doctor_id, request).await?;

    Ok((StatusCode::CREATED, Json(json!(rule))))
}

#[axum::debug_handler]
pub async fn update_rule(
    State(state): State<Arc<AvailabilityState>>,
    Path((doctor_id, rule_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
    Json(request): Json<UpdateAvailabilityRequest>,
) -> Result<Json<Value>, AppError> {
    ensure_can_manage(&user, doctor_id)?;

    let rule = state.service.update_rule(doctor_id, rule_id, request).await?;

    Ok(Json(json!(rule)))
}

#[axum::debug_handler]
pub async fn delete_rule(
    State(state): State<Arc<AvailabilityState>>,
    Path((doctor_id, rule_id)): Path<(Uuid, Uuid)>,
    Extension(user): Extension<User>,
) -> Result<StatusCode, AppError> {
    ensure_can_manage(&user, doctor_id)?;

    state.service.delete_rule(doctor_id, rule_id).await?;

    Ok(StatusCode::NO_CONTENT)
}
