use std::sync::Arc;

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::debug;
use uuid::Uuid;

use availability_cell::{compute_slots, AvailabilityRule, AvailabilityStore, BookedInterval, Slot};
use shared_database::with_timeout;
use shared_utils::clock::Clock;

use crate::models::{AppointmentError, AppointmentStatus, SchedulingConfig};
use crate::services::store::AppointmentStore;

/// Derives bookable slots from availability rules and the doctor's
/// non-cancelled appointments. Nothing is cached; every call reads both
/// stores.
pub struct SlotGenerator {
    availability: Arc<dyn AvailabilityStore>,
    appointments: Arc<dyn AppointmentStore>,
    clock: Arc<dyn Clock>,
    config: SchedulingConfig,
}

impl SlotGenerator {
    pub fn new(
        availability: Arc<dyn AvailabilityStore>,
        appointments: Arc<dyn AppointmentStore>,
        clock: Arc<dyn Clock>,
        config: SchedulingConfig,
    ) -> Self {
        Self { availability, appointments, clock, config }
    }

    pub async fn generate_slots(
        &self,
        doctor_id: Uuid,
        clinic_id: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        let rules = self.doctor_rules(doctor_id).await?;
        self.slots_for_rules(doctor_id, &rules, clinic_id, date).await
    }

    /// All rules of a known doctor; `DoctorNotFound` otherwise.
    pub async fn doctor_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, AppointmentError> {
        let timeout = self.config.store_timeout;

        if !with_timeout(timeout, self.availability.doctor_exists(doctor_id)).await? {
            return Err(AppointmentError::DoctorNotFound);
        }

        Ok(with_timeout(timeout, self.availability.list_rules(doctor_id)).await?)
    }

    pub async fn slots_for_rules(
        &self,
        doctor_id: Uuid,
        rules: &[AvailabilityRule],
        clinic_id: Option<Uuid>,
        date: NaiveDate,
    ) -> Result<Vec<Slot>, AppointmentError> {
        let day_start = date.and_time(NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);

        // bookings at any clinic block the doctor
        let booked: Vec<BookedInterval> = with_timeout(
            self.config.store_timeout,
            self.appointments.list_appointments(doctor_id, day_start, day_end, Some(AppointmentStatus::Cancelled)),
        )
        .await?
        .into_iter()
        .filter(|a| a.occupies_time())
        .map(|a| BookedInterval { starts_at: a.starts_at, ends_at: a.ends_at })
        .collect();

        let slots = compute_slots(rules, clinic_id, date, &booked, self.clock.now(), self.config.slot_params());

        debug!(
            "Doctor {} has {} slots on {} ({} booked intervals)",
            doctor_id, slots.len(), date, booked.len()
        );
        Ok(slots)
    }
}
