// libs/appointment-cell/src/models.rs
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use availability_cell::{AvailabilityError, SlotParams};
use shared_config::AppConfig;
use shared_database::DatabaseError;
use shared_models::error::AppError;

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub status: AppointmentStatus,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub notes: String,
    pub price: Option<f64>,
    pub consultation_started_at: Option<NaiveDateTime>,
    pub consultation_ended_at: Option<NaiveDateTime>,
    pub consultation_duration_minutes: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn duration(&self) -> chrono::Duration {
        self.ends_at - self.starts_at
    }

    /// Non-cancelled appointments occupy the doctor's time.
    pub fn occupies_time(&self) -> bool {
        self.status != AppointmentStatus::Cancelled
    }

    pub fn overlaps(&self, starts_at: NaiveDateTime, ends_at: NaiveDateTime) -> bool {
        availability_cell::intervals_overlap(self.starts_at, self.ends_at, starts_at, ends_at)
    }

    /// Notes with `entry` appended on its own line; earlier entries are kept.
    pub fn notes_with(&self, entry: &str) -> String {
        if self.notes.is_empty() {
            entry.to_string()
        } else {
            format!("{}\n{}", self.notes, entry)
        }
    }

    pub fn participants(&self) -> Vec<Uuid> {
        vec![self.doctor_id, self.patient_id]
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    InProgress,
    Completed,
    Cancelled,
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::InProgress => "in_progress",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    /// Statuses reachable in one step.
    pub fn next_statuses(&self) -> &'static [AppointmentStatus] {
        match self {
            AppointmentStatus::Scheduled => &[
                AppointmentStatus::InProgress,
                AppointmentStatus::Cancelled,
                AppointmentStatus::NoShow,
            ],
            AppointmentStatus::InProgress => &[
                AppointmentStatus::Completed,
                AppointmentStatus::Cancelled,
            ],
            AppointmentStatus::Completed
            | AppointmentStatus::Cancelled
            | AppointmentStatus::NoShow => &[],
        }
    }

    pub fn can_become(&self, next: AppointmentStatus) -> bool {
        self.next_statuses().contains(&next)
    }

    pub fn is_terminal(&self) -> bool {
        self.next_statuses().is_empty()
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppointmentStatus {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "scheduled" => Ok(AppointmentStatus::Scheduled),
            "in_progress" => Ok(AppointmentStatus::InProgress),
            "completed" => Ok(AppointmentStatus::Completed),
            "cancelled" => Ok(AppointmentStatus::Cancelled),
            "no_show" => Ok(AppointmentStatus::NoShow),
            other => Err(AppointmentError::InvalidStatus(other.to_string())),
        }
    }
}

/// Lifecycle operations an actor can request on an existing appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Start,
    Complete,
    Cancel,
    Reschedule,
    NoShow,
    SaveNotes,
}

impl Transition {
    /// Whether the operation is defined for an appointment in `status`.
    pub fn permitted_from(&self, status: AppointmentStatus) -> bool {
        match self {
            Transition::Start => status.can_become(AppointmentStatus::InProgress),
            Transition::Complete => status.can_become(AppointmentStatus::Completed),
            Transition::Cancel => status.can_become(AppointmentStatus::Cancelled),
            Transition::NoShow => status.can_become(AppointmentStatus::NoShow),
            // interval moves in place, status unchanged
            Transition::Reschedule => status == AppointmentStatus::Scheduled,
            Transition::SaveNotes => status == AppointmentStatus::InProgress,
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transition::Start => "start",
            Transition::Complete => "complete",
            Transition::Cancel => "cancel",
            Transition::Reschedule => "reschedule",
            Transition::NoShow => "no-show",
            Transition::SaveNotes => "save notes",
        };
        f.write_str(name)
    }
}

// ==============================================================================
// STORE WRITE MODELS
// ==============================================================================

#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub clinic_id: Uuid,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub price: Option<f64>,
}

impl NewAppointment {
    pub fn into_appointment(self, recorded_at: DateTime<Utc>) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            doctor_id: self.doctor_id,
            patient_id: self.patient_id,
            clinic_id: self.clinic_id,
            starts_at: self.starts_at,
            ends_at: self.ends_at,
            status: AppointmentStatus::Scheduled,
            notes: String::new(),
            price: self.price,
            consultation_started_at: None,
            consultation_ended_at: None,
            consultation_duration_minutes: None,
            created_at: recorded_at,
            updated_at: recorded_at,
        }
    }
}

/// Expected current state of the row; a write that finds anything else is
/// rejected as stale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateGuard {
    pub expected_status: AppointmentStatus,
    pub expected_updated_at: DateTime<Utc>,
}

impl UpdateGuard {
    pub fn for_appointment(appointment: &Appointment) -> Self {
        Self {
            expected_status: appointment.status,
            expected_updated_at: appointment.updated_at,
        }
    }

    pub fn matches(&self, appointment: &Appointment) -> bool {
        appointment.status == self.expected_status && appointment.updated_at == self.expected_updated_at
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AppointmentPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AppointmentStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub starts_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_started_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_ended_at: Option<NaiveDateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consultation_duration_minutes: Option<i64>,
}

impl AppointmentPatch {
    pub fn status(status: AppointmentStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn moves_interval(&self) -> bool {
        self.starts_at.is_some() || self.ends_at.is_some()
    }

    pub fn apply_to(&self, appointment: &mut Appointment) {
        if let Some(status) = self.status {
            appointment.status = status;
        }
        if let Some(starts_at) = self.starts_at {
            appointment.starts_at = starts_at;
        }
        if let Some(ends_at) = self.ends_at {
            appointment.ends_at = ends_at;
        }
        if let Some(notes) = &self.notes {
            appointment.notes = notes.clone();
        }
        if let Some(started) = self.consultation_started_at {
            appointment.consultation_started_at = Some(started);
        }
        if let Some(ended) = self.consultation_ended_at {
            appointment.consultation_ended_at = Some(ended);
        }
        if let Some(minutes) = self.consultation_duration_minutes {
            appointment.consultation_duration_minutes = Some(minutes);
        }
    }
}

// ==============================================================================
// CONSULTATION NOTES
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsultationNote {
    pub appointment_id: Uuid,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub diagnosis: String,
    pub prescription: Option<String>,
    pub recommendations: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsultationNotesRequest {
    pub diagnosis: Option<String>,
    pub prescription: Option<String>,
    pub recommendations: Option<String>,
    pub follow_up_date: Option<NaiveDate>,
}

impl ConsultationNotesRequest {
    pub fn has_diagnosis(&self) -> bool {
        self.diagnosis
            .as_deref()
            .map(|d| !d.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn into_note(self, appointment_id: Uuid, recorded_at: DateTime<Utc>) -> ConsultationNote {
        ConsultationNote {
            appointment_id,
            diagnosis: self.diagnosis.map(|d| d.trim().to_string()).unwrap_or_default(),
            prescription: self.prescription,
            recommendations: self.recommendations,
            follow_up_date: self.follow_up_date,
            updated_at: recorded_at,
        }
    }
}

// ==============================================================================
// REQUEST / RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub price: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CancelAppointmentRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RescheduleAppointmentRequest {
    pub new_date: NaiveDate,
    pub new_start_time: NaiveTime,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConflictCheckResponse {
    pub has_conflict: bool,
    pub conflicting_appointments: Vec<Appointment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub appointment_id: Uuid,
    pub active: bool,
    pub started_at: Option<NaiveDateTime>,
    pub elapsed_seconds: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletedConsultation {
    pub appointment: Appointment,
    pub note: ConsultationNote,
}

// ==============================================================================
// NOTIFICATIONS
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEventType {
    Booked,
    Cancelled,
    Rescheduled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEvent {
    pub appointment_id: Uuid,
    pub event_type: NotificationEventType,
    pub recipients: Vec<Uuid>,
}

// ==============================================================================
// CONFIGURATION
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SchedulingConfig {
    pub slot_step_minutes: i64,
    pub appointment_duration_minutes: i64,
    pub store_timeout: Duration,
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            slot_step_minutes: 30,
            appointment_duration_minutes: 30,
            store_timeout: Duration::from_millis(5_000),
        }
    }
}

impl SchedulingConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            slot_step_minutes: config.slot_step_minutes,
            appointment_duration_minutes: config.appointment_duration_minutes,
            store_timeout: Duration::from_millis(config.store_timeout_ms),
        }
    }

    pub fn slot_params(&self) -> SlotParams {
        SlotParams {
            step_minutes: self.slot_step_minutes,
            duration_minutes: self.appointment_duration_minutes,
        }
    }

    pub fn appointment_duration(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.appointment_duration_minutes)
    }
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AppointmentError {
    #[error("Appointment not found")]
    NotFound,

    #[error("Requested time is no longer available")]
    SlotUnavailable,

    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Clinic is not associated with this doctor")]
    InvalidClinicAssignment,

    #[error("Appointments must start in the future")]
    PastDate,

    #[error("This appointment can no longer be modified (currently {current})")]
    InvalidTransition { current: AppointmentStatus },

    #[error("A diagnosis is required to complete the consultation")]
    DiagnosisRequired,

    #[error("Not permitted: {0}")]
    Unauthorized(String),

    #[error("Outside the allowed time window: {0}")]
    OutsideTimeWindow(String),

    #[error("Appointment was modified concurrently, reload and retry")]
    ConcurrentModification,

    #[error("Scheduling store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Invalid appointment status: {0}")]
    InvalidStatus(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl AppointmentError {
    /// Outcomes the caller may resolve by re-reading and retrying the whole
    /// operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppointmentError::SlotUnavailable
                | AppointmentError::ConcurrentModification
                | AppointmentError::StoreUnavailable(_)
        )
    }
}

impl From<DatabaseError> for AppointmentError {
    fn from(err: DatabaseError) -> Self {
        match err {
            err if err.is_transient() => AppointmentError::StoreUnavailable(err.to_string()),
            DatabaseError::ConstraintViolation(_) => AppointmentError::SlotUnavailable,
            DatabaseError::StaleWrite(_) => AppointmentError::ConcurrentModification,
            other => AppointmentError::Database(other.to_string()),
        }
    }
}

impl From<AvailabilityError> for AppointmentError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::DoctorNotFound => AppointmentError::DoctorNotFound,
            AvailabilityError::StoreUnavailable(msg) => AppointmentError::StoreUnavailable(msg),
            other => AppointmentError::Database(other.to_string()),
        }
    }
}

impl From<AppointmentError> for AppError {
    fn from(err: AppointmentError) -> Self {
        match err {
            AppointmentError::NotFound | AppointmentError::DoctorNotFound => {
                AppError::NotFound(err.to_string())
            }
            AppointmentError::SlotUnavailable
            | AppointmentError::InvalidTransition { .. }
            | AppointmentError::ConcurrentModification => AppError::Conflict(err.to_string()),
            AppointmentError::PastDate
            | AppointmentError::InvalidClinicAssignment
            | AppointmentError::DiagnosisRequired
            | AppointmentError::OutsideTimeWindow(_) => AppError::Unprocessable(err.to_string()),
            AppointmentError::Unauthorized(_) => AppError::Forbidden(err.to_string()),
            AppointmentError::StoreUnavailable(_) => AppError::ServiceUnavailable(
                "Scheduling is temporarily unavailable, please retry".to_string(),
            ),
            AppointmentError::InvalidStatus(_) | AppointmentError::Validation(_) => {
                AppError::BadRequest(err.to_string())
            }
            AppointmentError::Database(_) => AppError::Internal(
                "Something went wrong, please retry".to_string(),
            ),
        }
    }
}
