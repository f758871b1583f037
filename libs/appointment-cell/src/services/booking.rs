// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use tracing::{info, warn};

use shared_database::{with_timeout, DatabaseError};
use shared_utils::clock::Clock;

use crate::models::{
    Appointment, AppointmentError, BookAppointmentRequest, NewAppointment, NotificationEventType,
    SchedulingConfig,
};
use crate::services::authorization::{can_book, Actor};
use crate::services::conflict::ConflictChecker;
use crate::services::notifications::{event_for, NotificationSink};
use crate::services::slots::SlotGenerator;
use crate::services::store::AppointmentStore;

/// Validates a requested slot and commits the appointment. The final insert
/// relies on the store's overlap constraint, so of two racing requests for
/// one slot exactly one is created and the other sees `SlotUnavailable`.
pub struct BookingTransaction {
    store: Arc<dyn AppointmentStore>,
    slots: Arc<SlotGenerator>,
    conflicts: Arc<ConflictChecker>,
    notifier: Arc<dyn NotificationSink>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl BookingTransaction {
    pub fn new(
        store: Arc<dyn AppointmentStore>,
        slots: Arc<SlotGenerator>,
        conflicts: Arc<ConflictChecker>,
        notifier: Arc<dyn NotificationSink>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> Self {
        Self { store, slots, conflicts, notifier, clock, config }
    }

    pub async fn book(
        &self,
        actor: &Actor,
        request: BookAppointmentRequest,
    ) -> Result<Appointment, AppointmentError> {
        info!("Booking appointment for patient {} with doctor {} at {} {}",
              request.patient_id, request.doctor_id, request.date, request.start_time);

        if !can_book(actor, request.doctor_id, request.patient_id) {
            return Err(AppointmentError::Unauthorized(format!(
                "{} may not book for this patient and doctor",
                actor.role
            )));
        }

        let starts_at = request.date.and_time(request.start_time);

        if starts_at <= self.clock.now() {
            return Err(AppointmentError::PastDate);
        }

        // Step 1: doctor and clinic must be known to the availability store
        let rules = self.slots.doctor_rules(request.doctor_id).await?;
        if !rules.iter().any(|rule| rule.clinic_id == request.clinic_id) {
            warn!("Clinic {} is not assigned to doctor {}", request.clinic_id, request.doctor_id);
            return Err(AppointmentError::InvalidClinicAssignment);
        }

        // Step 2: the start must be a slot that is currently free
        let slots = self
            .slots
            .slots_for_rules(request.doctor_id, &rules, Some(request.clinic_id), request.date)
            .await?;
        let offered = slots
            .iter()
            .any(|slot| slot.start_time == request.start_time && slot.available);
        if !offered {
            warn!("Requested start {} is not an available slot", starts_at);
            return Err(AppointmentError::SlotUnavailable);
        }
        // an offered slot implies the configured duration is in range
        let ends_at = starts_at + self.config.appointment_duration();

        // Step 3: fresh overlap check, independent of the slot read
        let conflicts = self
            .conflicts
            .check_conflicts(request.doctor_id, starts_at, ends_at, None)
            .await?;
        if let Some(existing) = conflicts.first() {
            if existing.patient_id == request.patient_id {
                warn!("Patient {} already holds appointment {} at this time",
                      request.patient_id, existing.id);
            }
            return Err(AppointmentError::SlotUnavailable);
        }

        // Step 4: insert; the store serializes competing writes
        let new_appointment = NewAppointment {
            doctor_id: request.doctor_id,
            patient_id: request.patient_id,
            clinic_id: request.clinic_id,
            starts_at,
            ends_at,
            price: request.price,
        };

        let appointment = with_timeout(self.config.store_timeout, self.store.insert_appointment(new_appointment))
            .await
            .map_err(|e| match e {
                DatabaseError::ConstraintViolation(_) => {
                    warn!("Lost booking race for doctor {} at {}", request.doctor_id, starts_at);
                    AppointmentError::SlotUnavailable
                }
                other => other.into(),
            })?;

        self.notifier.notify(event_for(&appointment, NotificationEventType::Booked));

        info!("Appointment {} booked with doctor {}", appointment.id, appointment.doctor_id);
        Ok(appointment)
    }
}
