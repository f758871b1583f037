// libs/availability-cell/src/models.rs
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::MINUTES_PER_DAY;
use shared_database::DatabaseError;
use shared_models::error::AppError;

// ==============================================================================
// AVAILABILITY RULES
// ==============================================================================

/// Recurring weekly window during which a doctor accepts bookings at a clinic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub day_of_week: i32, // 0 = Sunday, 1 = Monday, etc.
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: bool,
}

impl AvailabilityRule {
    /// Two active rules collide when they share doctor, clinic and day and
    /// their time windows intersect.
    pub fn conflicts_with(&self, other: &AvailabilityRule) -> bool {
        self.is_available
            && other.is_available
            && self.doctor_id == other.doctor_id
            && self.clinic_id == other.clinic_id
            && self.day_of_week == other.day_of_week
            && self.start_time < other.end_time
            && other.start_time < self.end_time
    }

    pub fn applies_to(&self, date: NaiveDate) -> bool {
        self.is_available && self.day_of_week == day_of_week(date)
    }
}

/// Day index used by availability rules (0 = Sunday).
pub fn day_of_week(date: NaiveDate) -> i32 {
    date.weekday().num_days_from_sunday() as i32
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAvailabilityRequest {
    pub clinic_id: Uuid,
    pub day_of_week: i32,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateAvailabilityRequest {
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub is_available: Option<bool>,
}

// ==============================================================================
// SLOTS
// ==============================================================================

/// Candidate booking window on one date. Never persisted; equality is
/// structural.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Slot {
    pub clinic_id: Uuid,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub available: bool,
}

/// Interval already occupied by a non-cancelled appointment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BookedInterval {
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotParams {
    pub step_minutes: i64,
    pub duration_minutes: i64,
}

impl Default for SlotParams {
    fn default() -> Self {
        Self {
            step_minutes: 30,
            duration_minutes: 30,
        }
    }
}

impl SlotParams {
    /// Both values must lie within `1..=MINUTES_PER_DAY`.
    pub fn is_valid(&self) -> bool {
        let minutes = 1..=MINUTES_PER_DAY;
        minutes.contains(&self.step_minutes) && minutes.contains(&self.duration_minutes)
    }
}

// ==============================================================================
// ERRORS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AvailabilityError {
    #[error("Doctor not found")]
    DoctorNotFound,

    #[error("Availability rule not found")]
    RuleNotFound,

    #[error("Start time must be before end time")]
    InvalidTimeRange,

    #[error("Day of week must be between 0 (Sunday) and 6 (Saturday), got {0}")]
    InvalidDayOfWeek(i32),

    #[error("Availability conflicts with existing schedule")]
    OverlappingRule,

    #[error("Availability store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<DatabaseError> for AvailabilityError {
    fn from(err: DatabaseError) -> Self {
        if err.is_transient() {
            AvailabilityError::StoreUnavailable(err.to_string())
        } else {
            AvailabilityError::Database(err.to_string())
        }
    }
}

impl From<AvailabilityError> for AppError {
    fn from(err: AvailabilityError) -> Self {
        match err {
            AvailabilityError::DoctorNotFound | AvailabilityError::RuleNotFound => {
                AppError::NotFound(err.to_string())
            }
            AvailabilityError::InvalidTimeRange | AvailabilityError::InvalidDayOfWeek(_) => {
                AppError::BadRequest(err.to_string())
            }
            AvailabilityError::OverlappingRule => AppError::Conflict(err.to_string()),
            AvailabilityError::StoreUnavailable(_) => AppError::ServiceUnavailable(err.to_string()),
            AvailabilityError::Database(_) => AppError::Internal(err.to_string()),
        }
    }
}
