// libs/appointment-cell/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tokio::sync::Barrier;
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::authorization::{Actor, Role};
use appointment_cell::services::notifications::BroadcastNotifier;
use appointment_cell::services::store::{AppointmentStore, InMemoryAppointmentStore};
use appointment_cell::SchedulingState;
use availability_cell::{AvailabilityRule, AvailabilityStore, InMemoryAvailabilityStore};
use shared_database::DatabaseError;
use shared_utils::clock::FixedClock;
use shared_utils::test_utils::TestConfig;

/// 2026-10-19 is a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
}

pub fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

pub fn monday_at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_time(t(h, m))
}

pub struct Harness {
    pub clock: Arc<FixedClock>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub availability: Arc<InMemoryAvailabilityStore>,
    pub notifier: Arc<BroadcastNotifier>,
    pub state: Arc<SchedulingState>,
    pub config: TestConfig,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    pub patient_id: Uuid,
}

impl Harness {
    /// Doctor available Mondays 09:00-12:00 at one clinic, clock at Monday 08:00.
    pub async fn new() -> Self {
        let clock = Arc::new(FixedClock::new(monday_at(8, 0)));
        let appointments = Arc::new(InMemoryAppointmentStore::new());
        let availability = Arc::new(InMemoryAvailabilityStore::new());
        let notifier = Arc::new(BroadcastNotifier::default());
        let config = TestConfig::default();

        let doctor_id = Uuid::new_v4();
        let clinic_id = Uuid::new_v4();
        availability.register_doctor(doctor_id).await;
        availability
            .insert_rule(AvailabilityRule {
                id: Uuid::new_v4(),
                doctor_id,
                clinic_id,
                day_of_week: 1,
                start_time: t(9, 0),
                end_time: t(12, 0),
                is_available: true,
            })
            .await
            .unwrap();

        let state = Arc::new(SchedulingState::new(
            config.to_arc(),
            appointments.clone(),
            availability.clone(),
            notifier.clone(),
            clock.clone(),
            Self::scheduling_config(),
        ));

        Self {
            clock,
            appointments,
            availability,
            notifier,
            state,
            config,
            doctor_id,
            clinic_id,
            patient_id: Uuid::new_v4(),
        }
    }

    pub fn scheduling_config() -> SchedulingConfig {
        SchedulingConfig {
            store_timeout: Duration::from_millis(500),
            ..SchedulingConfig::default()
        }
    }

    /// Same stores and clock, fresh in-process state, as after a restart.
    pub fn restarted_state(&self) -> Arc<SchedulingState> {
        self.state_with(self.appointments.clone())
    }

    /// Harness availability, clock and notifier over another appointment store.
    pub fn state_with(&self, store: Arc<dyn AppointmentStore>) -> Arc<SchedulingState> {
        self.state_configured(store, Self::scheduling_config())
    }

    pub fn state_configured(&self, store: Arc<dyn AppointmentStore>, scheduling: SchedulingConfig) -> Arc<SchedulingState> {
        Arc::new(SchedulingState::new(
            self.config.to_arc(),
            store,
            self.availability.clone(),
            self.notifier.clone(),
            self.clock.clone(),
            scheduling,
        ))
    }

    pub fn doctor(&self) -> Actor {
        Actor::new(self.doctor_id, Role::Doctor)
    }

    pub fn assistant(&self) -> Actor {
        Actor::assistant(Uuid::new_v4(), self.doctor_id)
    }

    pub fn patient(&self) -> Actor {
        Actor::new(self.patient_id, Role::Patient)
    }

    pub fn admin(&self) -> Actor {
        Actor::new(Uuid::new_v4(), Role::Admin)
    }

    pub fn request_for(&self, patient_id: Uuid, date: NaiveDate, start: NaiveTime) -> BookAppointmentRequest {
        BookAppointmentRequest {
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
            patient_id,
            date,
            start_time: start,
            price: None,
        }
    }

    /// Books `start` on Monday for a fresh patient.
    pub async fn book_other(&self, start: NaiveTime) -> Appointment {
        let patient_id = Uuid::new_v4();
        self.state
            .booking
            .book(&Actor::new(patient_id, Role::Patient), self.request_for(patient_id, monday(), start))
            .await
            .unwrap()
    }

    /// Books `start` on Monday for the harness patient.
    pub async fn book_own(&self, start: NaiveTime) -> Appointment {
        self.state
            .booking
            .book(&self.patient(), self.request_for(self.patient_id, monday(), start))
            .await
            .unwrap()
    }
}

/// In-memory store whose inserts or updates wait until `contenders` callers
/// have arrived, so every racer passes its reads before any write lands.
pub struct ContendedStore {
    pub inner: InMemoryAppointmentStore,
    insert_gate: Option<Barrier>,
    update_gate: Option<Barrier>,
    pub inserts: AtomicUsize,
    pub updates: AtomicUsize,
}

impl ContendedStore {
    pub fn inserts_gated(contenders: usize) -> Self {
        Self {
            insert_gate: Some(Barrier::new(contenders)),
            ..Self::ungated()
        }
    }

    pub fn updates_gated(contenders: usize) -> Self {
        Self {
            update_gate: Some(Barrier::new(contenders)),
            ..Self::ungated()
        }
    }

    fn ungated() -> Self {
        Self {
            inner: InMemoryAppointmentStore::new(),
            insert_gate: None,
            update_gate: None,
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
        }
    }

    pub fn insert_attempts(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_attempts(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppointmentStore for ContendedStore {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        self.inner.get_appointment(id).await
    }

    async fn list_appointments(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
        exclude_status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        self.inner.list_appointments(doctor_id, from, to, exclude_status).await
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, DatabaseError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.insert_gate {
            gate.wait().await;
        }
        self.inner.insert_appointment(appointment).await
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
    ) -> Result<Appointment, DatabaseError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.update_gate {
            gate.wait().await;
        }
        self.inner.update_appointment(id, guard, patch).await
    }

    async fn save_consultation_note(
        &self,
        guard: UpdateGuard,
        note: ConsultationNote,
    ) -> Result<ConsultationNote, DatabaseError> {
        self.inner.save_consultation_note(guard, note).await
    }

    async fn complete_consultation(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
        note: ConsultationNote,
    ) -> Result<CompletedConsultation, DatabaseError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.update_gate {
            gate.wait().await;
        }
        self.inner.complete_consultation(id, guard, patch, note).await
    }

    async fn get_consultation_note(&self, appointment_id: Uuid) -> Result<Option<ConsultationNote>, DatabaseError> {
        self.inner.get_consultation_note(appointment_id).await
    }
}
