use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::with_timeout;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, ConflictCheckResponse};
use crate::services::store::AppointmentStore;

pub struct ConflictChecker {
    store: Arc<dyn AppointmentStore>,
    timeout: Duration,
}

impl ConflictChecker {
    pub fn new(store: Arc<dyn AppointmentStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Non-cancelled appointments of the doctor intersecting
    /// `[starts_at, ends_at)`, except `exclude_appointment_id`.
    pub async fn check_conflicts(
        &self,
        doctor_id: Uuid,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<Vec<Appointment>, AppointmentError> {
        if starts_at >= ends_at {
            return Err(AppointmentError::Validation(
                "Interval start must be before its end".to_string(),
            ));
        }

        debug!("Checking conflicts for doctor {} from {} to {}", doctor_id, starts_at, ends_at);

        let existing = with_timeout(
            self.timeout,
            self.store.list_appointments(doctor_id, starts_at, ends_at, Some(AppointmentStatus::Cancelled)),
        )
        .await?;

        let conflicts: Vec<Appointment> = existing
            .into_iter()
            .filter(|a| Some(a.id) != exclude_appointment_id)
            .filter(|a| a.occupies_time() && a.overlaps(starts_at, ends_at))
            .collect();

        if !conflicts.is_empty() {
            warn!("Conflict detected for doctor {} - {} conflicting appointments",
                  doctor_id, conflicts.len());
        }

        Ok(conflicts)
    }

    pub async fn overlaps(
        &self,
        doctor_id: Uuid,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<bool, AppointmentError> {
        let conflicts = self
            .check_conflicts(doctor_id, starts_at, ends_at, exclude_appointment_id)
            .await?;
        Ok(!conflicts.is_empty())
    }

    pub async fn conflict_report(
        &self,
        doctor_id: Uuid,
        starts_at: NaiveDateTime,
        ends_at: NaiveDateTime,
        exclude_appointment_id: Option<Uuid>,
    ) -> Result<ConflictCheckResponse, AppointmentError> {
        let conflicting_appointments = self
            .check_conflicts(doctor_id, starts_at, ends_at, exclude_appointment_id)
            .await?;

        Ok(ConflictCheckResponse {
            has_conflict: !conflicting_appointments.is_empty(),
            conflicting_appointments,
        })
    }
}
