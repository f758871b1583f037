// libs/appointment-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use availability_cell::fits_within_availability;
use shared_database::{with_timeout, DatabaseError};
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentError, AppointmentPatch, AppointmentStatus, CompletedConsultation,
    ConsultationNote, ConsultationNotesRequest, NotificationEventType, RescheduleAppointmentRequest,
    SchedulingConfig, SessionStatus, Transition, UpdateGuard,
};
use crate::services::authorization::{authorize, can_view, Actor};
use crate::services::conflict::ConflictChecker;
use crate::services::notifications::{event_for, NotificationSink};
use crate::services::session::{ConsultationSessions, SessionHandle};
use crate::services::slots::SlotGenerator;
use crate::services::store::AppointmentStore;

const AUDIT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Status transitions of an existing appointment. Every write is a
/// conditional update on the status and `updated_at` that were read, so of
/// two racing actors only one succeeds.
pub struct AppointmentLifecycle {
    store: Arc<dyn AppointmentStore>,
    slots: Arc<SlotGenerator>,
    conflicts: Arc<ConflictChecker>,
    sessions: Arc<ConsultationSessions>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl AppointmentLifecycle {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        slots: Arc<SlotGenerator>,
        conflicts: Arc<ConflictChecker>,
        sessions: Arc<ConsultationSessions>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> Self {
        Self { store, slots, conflicts, sessions, notifier, clock, config }
    }

    pub async fn get(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        if !can_view(actor, &appointment) {
            return Err(AppointmentError::Unauthorized("appointment belongs to someone else".to_string()));
        }
        Ok(appointment)
    }

    pub async fn start(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let now = self.clock.now();
        self.check(actor, &appointment, Transition::Start, now)?;

        if appointment.starts_at.date() != now.date() {
            return Err(AppointmentError::OutsideTimeWindow(format!(
                "consultation is scheduled for {}, not today",
                appointment.starts_at.date()
            )));
        }

        let patch = AppointmentPatch {
            consultation_started_at: Some(now),
            ..AppointmentPatch::status(AppointmentStatus::InProgress)
        };
        let started = self.commit(&appointment, patch).await?;

        self.sessions.restore(started.id, now).await;

        info!("Consultation started for appointment {}", started.id);
        Ok(started)
    }

    pub async fn complete(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        notes: ConsultationNotesRequest,
    ) -> Result<CompletedConsultation, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let now = self.clock.now();
        self.check(actor, &appointment, Transition::Complete, now)?;

        if !notes.has_diagnosis() {
            return Err(AppointmentError::DiagnosisRequired);
        }

        let note = self.merged_note(&appointment, notes).await?;

        let handle = match self.sessions.get(appointment.id).await {
            Some(handle) => Some(handle),
            None => appointment.consultation_started_at.map(|started_at| SessionHandle {
                appointment_id: appointment.id,
                started_at,
            }),
        };
        let duration_minutes = handle.map(|h| self.sessions.elapsed(&h).num_minutes());

        let patch = AppointmentPatch {
            consultation_ended_at: Some(now),
            consultation_duration_minutes: duration_minutes,
            ..AppointmentPatch::status(AppointmentStatus::Completed)
        };
        let guard = UpdateGuard::for_appointment(&appointment);
        let written = with_timeout(
            self.config.store_timeout,
            self.store.complete_consultation(appointment.id, guard, patch, note),
        )
        .await;
        let completed = self.settle(&appointment, written).await?;

        if let Some(handle) = handle {
            self.sessions.stop(&handle).await;
        }

        info!("Consultation for appointment {} completed after {:?} minutes",
              completed.appointment.id, duration_minutes);
        Ok(completed)
    }

    pub async fn cancel(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        reason: Option<String>,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let now = self.clock.now();
        self.check(actor, &appointment, Transition::Cancel, now)?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| "no reason given".to_string());
        let entry = format!("[cancelled by {} @ {}]: {}", actor.role, now.format(AUDIT_TIME_FORMAT), reason);

        let mut patch = AppointmentPatch {
            notes: Some(appointment.notes_with(&entry)),
            ..AppointmentPatch::status(AppointmentStatus::Cancelled)
        };
        if appointment.status == AppointmentStatus::InProgress {
            patch.consultation_ended_at = Some(now);
        }

        let cancelled = self.commit(&appointment, patch).await?;
        self.sessions.discard(cancelled.id).await;
        self.notifier.notify(event_for(&cancelled, NotificationEventType::Cancelled));

        info!("Appointment {} cancelled by {} {}", cancelled.id, actor.role, actor.id);
        Ok(cancelled)
    }

    pub async fn reschedule(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        request: RescheduleAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let now = self.clock.now();
        self.check(actor, &appointment, Transition::Reschedule, now)?;

        let new_starts_at = request.new_date.and_time(request.new_start_time);
        let new_ends_at = new_starts_at + appointment.duration();

        if new_starts_at <= now {
            return Err(AppointmentError::PastDate);
        }

        let rules = self.slots.doctor_rules(appointment.doctor_id).await?;
        if !fits_within_availability(&rules, appointment.clinic_id, new_starts_at, new_ends_at) {
            warn!("Appointment {} cannot move to {}: outside availability", appointment.id, new_starts_at);
            return Err(AppointmentError::SlotUnavailable);
        }

        if self
            .conflicts
            .overlaps(appointment.doctor_id, new_starts_at, new_ends_at, Some(appointment.id))
            .await?
        {
            warn!("Appointment {} cannot move to {}: interval taken", appointment.id, new_starts_at);
            return Err(AppointmentError::SlotUnavailable);
        }

        let mut entry = format!(
            "[rescheduled by {} @ {}]: {} -> {}",
            actor.role,
            now.format(AUDIT_TIME_FORMAT),
            appointment.starts_at.format(AUDIT_TIME_FORMAT),
            new_starts_at.format(AUDIT_TIME_FORMAT)
        );
        if let Some(reason) = request.reason.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
            entry.push_str(&format!(" ({})", reason));
        }

        let patch = AppointmentPatch {
            starts_at: Some(new_starts_at),
            ends_at: Some(new_ends_at),
            notes: Some(appointment.notes_with(&entry)),
            ..AppointmentPatch::default()
        };
        let moved = self.commit(&appointment, patch).await?;

        self.notifier.notify(event_for(&moved, NotificationEventType::Rescheduled));

        info!("Appointment {} rescheduled to {}", moved.id, moved.starts_at);
        Ok(moved)
    }

    pub async fn mark_no_show(&self, actor: &Actor, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        let now = self.clock.now();
        self.check(actor, &appointment, Transition::NoShow, now)?;

        if appointment.starts_at > now {
            return Err(AppointmentError::OutsideTimeWindow(
                "appointment has not started yet".to_string(),
            ));
        }

        let missed = self.commit(&appointment, AppointmentPatch::status(AppointmentStatus::NoShow)).await?;

        info!("Appointment {} marked as no-show", missed.id);
        Ok(missed)
    }

    /// Draft consultation notes while the consultation is running.
    pub async fn save_notes(
        &self,
        actor: &Actor,
        appointment_id: Uuid,
        notes: ConsultationNotesRequest,
    ) -> Result<ConsultationNote, AppointmentError> {
        let appointment = self.load(appointment_id).await?;
        self.check(actor, &appointment, Transition::SaveNotes, self.clock.now())?;

        let note = self.merged_note(&appointment, notes).await?;
        debug!("Saving consultation note for appointment {}", appointment.id);

        let guard = UpdateGuard::for_appointment(&appointment);
        let written = with_timeout(self.config.store_timeout, self.store.save_consultation_note(guard, note)).await;
        self.settle(&appointment, written).await
    }

    pub async fn session_status(&self, actor: &Actor, appointment_id: Uuid) -> Result<SessionStatus, AppointmentError> {
        let appointment = self.get(actor, appointment_id).await?;

        let handle = match (self.sessions.get(appointment.id).await, appointment.status) {
            (Some(handle), _) => Some(handle),
            // rebuilt after a restart from the persisted start
            (None, AppointmentStatus::InProgress) => match appointment.consultation_started_at {
                Some(started_at) => Some(self.sessions.restore(appointment.id, started_at).await),
                None => None,
            },
            (None, _) => None,
        };

        Ok(SessionStatus {
            appointment_id: appointment.id,
            active: handle.is_some(),
            started_at: handle.map(|h| h.started_at),
            elapsed_seconds: handle.map(|h| self.sessions.elapsed(&h).num_seconds()).unwrap_or(0),
        })
    }

    async fn load(&self, appointment_id: Uuid) -> Result<Appointment, AppointmentError> {
        with_timeout(self.config.store_timeout, self.store.get_appointment(appointment_id))
            .await?
            .ok_or(AppointmentError::NotFound)
    }

    fn check(
        &self,
        actor: &Actor,
        appointment: &Appointment,
        transition: Transition,
        now: NaiveDateTime,
    ) -> Result<(), AppointmentError> {
        if !transition.permitted_from(appointment.status) {
            warn!("Rejected {} on appointment {} in status {}", transition, appointment.id, appointment.status);
            return Err(AppointmentError::InvalidTransition { current: appointment.status });
        }
        authorize(actor, appointment, transition, now)
    }

    /// Request fields layered over the stored draft; nothing is written.
    async fn merged_note(
        &self,
        appointment: &Appointment,
        notes: ConsultationNotesRequest,
    ) -> Result<ConsultationNote, AppointmentError> {
        let existing =
            with_timeout(self.config.store_timeout, self.store.get_consultation_note(appointment.id)).await?;

        let mut note = notes.into_note(appointment.id, Utc::now());
        if let Some(draft) = existing {
            if note.diagnosis.is_empty() {
                note.diagnosis = draft.diagnosis;
            }
            note.prescription = note.prescription.or(draft.prescription);
            note.recommendations = note.recommendations.or(draft.recommendations);
            note.follow_up_date = note.follow_up_date.or(draft.follow_up_date);
        }
        Ok(note)
    }

    /// Conditional write against the state `appointment` was read in.
    async fn commit(&self, appointment: &Appointment, patch: AppointmentPatch) -> Result<Appointment, AppointmentError> {
        let guard = UpdateGuard::for_appointment(appointment);
        let written =
            with_timeout(self.config.store_timeout, self.store.update_appointment(appointment.id, guard, patch)).await;
        self.settle(appointment, written).await
    }

    /// Maps the outcome of a guarded write. A failed guard is reported as
    /// the status the appointment moved to, when it moved.
    async fn settle<T>(&self, appointment: &Appointment, written: Result<T, DatabaseError>) -> Result<T, AppointmentError> {
        match written {
            Ok(value) => Ok(value),
            Err(DatabaseError::StaleWrite(_)) => {
                let current = self.load(appointment.id).await?;
                if current.status != appointment.status {
                    warn!("Appointment {} moved to {} concurrently", appointment.id, current.status);
                    Err(AppointmentError::InvalidTransition { current: current.status })
                } else {
                    Err(AppointmentError::ConcurrentModification)
                }
            }
            Err(DatabaseError::NotFound(_)) => Err(AppointmentError::NotFound),
            Err(other) => Err(other.into()),
        }
    }
}
