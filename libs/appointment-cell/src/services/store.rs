// libs/appointment-cell/src/services/store.rs
use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use shared_database::supabase::{representation_headers, SupabaseClient};
use shared_database::DatabaseError;

use crate::models::{
    Appointment, AppointmentPatch, AppointmentStatus, CompletedConsultation, ConsultationNote,
    NewAppointment, UpdateGuard,
};

const TIME_FILTER_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Persistence boundary for appointments and their consultation notes.
///
/// Implementations must enforce, atomically with the write, that no two
/// non-cancelled appointments of one doctor overlap
/// (`DatabaseError::ConstraintViolation`), and must apply updates only when
/// the row still matches the [`UpdateGuard`] (`DatabaseError::StaleWrite`).
#[async_trait]
pub trait AppointmentStore: Send + Sync {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError>;

    /// Appointments of `doctor_id` whose interval intersects `[from, to)`,
    /// ordered by start.
    async fn list_appointments(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
        exclude_status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, DatabaseError>;

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, DatabaseError>;

    async fn update_appointment(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
    ) -> Result<Appointment, DatabaseError>;

    /// Writes `note` only while its appointment still matches `guard`.
    async fn save_consultation_note(
        &self,
        guard: UpdateGuard,
        note: ConsultationNote,
    ) -> Result<ConsultationNote, DatabaseError>;

    /// Applies `patch` and writes `note` as one guarded step; neither is
    /// stored when the guard fails.
    async fn complete_consultation(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
        note: ConsultationNote,
    ) -> Result<CompletedConsultation, DatabaseError>;

    async fn get_consultation_note(&self, appointment_id: Uuid) -> Result<Option<ConsultationNote>, DatabaseError>;
}

// Postgres keeps microseconds; guards compare on the stored value
fn stored_timestamp(at: DateTime<Utc>) -> DateTime<Utc> {
    at.trunc_subsecs(6)
}

// ==============================================================================
// SUPABASE-BACKED STORE
// ==============================================================================

pub struct SupabaseAppointmentStore {
    supabase: Arc<SupabaseClient>,
    token: String,
}

impl SupabaseAppointmentStore {
    pub fn new(supabase: Arc<SupabaseClient>, token: impl Into<String>) -> Self {
        Self {
            supabase,
            token: token.into(),
        }
    }

    fn parse_appointments(rows: Vec<Value>) -> Result<Vec<Appointment>, DatabaseError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<Appointment>, _>>()
            .map_err(|e| DatabaseError::Decode(format!("Failed to parse appointment: {}", e)))
    }

    fn guard_timestamp(guard: &UpdateGuard) -> String {
        guard.expected_updated_at.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Calls a database function that applies its writes only when the
    /// appointment still matches the guard, answering `null` otherwise.
    async fn guarded_rpc(&self, function: &str, body: Value, appointment_id: Uuid) -> Result<Value, DatabaseError> {
        let path = format!("/rest/v1/rpc/{}", function);
        let result: Value = self.supabase
            .request(Method::POST, &path, Some(&self.token), Some(body))
            .await?;

        if result.is_null() {
            warn!("{} for appointment {} matched no row", function, appointment_id);
            return Err(DatabaseError::StaleWrite(format!("appointment {}", appointment_id)));
        }
        Ok(result)
    }

    fn parse_note(rows: Vec<Value>) -> Result<Option<ConsultationNote>, DatabaseError> {
        match rows.into_iter().next() {
            Some(row) => serde_json::from_value(row)
                .map(Some)
                .map_err(|e| DatabaseError::Decode(format!("Failed to parse consultation note: {}", e))),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl AppointmentStore for SupabaseAppointmentStore {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        let path = format!("/rest/v1/appointments?id=eq.{}", id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;

        Ok(Self::parse_appointments(rows)?.into_iter().next())
    }

    async fn list_appointments(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
        exclude_status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let mut query_parts = vec![
            format!("doctor_id=eq.{}", doctor_id),
            format!("starts_at=lt.{}", to.format(TIME_FILTER_FORMAT)),
            format!("ends_at=gt.{}", from.format(TIME_FILTER_FORMAT)),
        ];
        if let Some(status) = exclude_status {
            query_parts.push(format!("status=neq.{}", status));
        }
        query_parts.push("order=starts_at.asc".to_string());

        let path = format!("/rest/v1/appointments?{}", query_parts.join("&"));
        debug!("Listing appointments: {}", path);

        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;

        Self::parse_appointments(rows)
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, DatabaseError> {
        let record = appointment.into_appointment(stored_timestamp(Utc::now()));
        let body = serde_json::to_value(&record)
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/appointments",
                Some(&self.token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        Self::parse_appointments(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::Decode("Insert returned no appointment".to_string()))
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
    ) -> Result<Appointment, DatabaseError> {
        let expected_updated_at = Self::guard_timestamp(&guard);
        let path = format!(
            "/rest/v1/appointments?id=eq.{}&status=eq.{}&updated_at=eq.{}",
            id,
            guard.expected_status,
            urlencoding::encode(&expected_updated_at)
        );

        let mut body = serde_json::to_value(&patch)
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;
        if let Value::Object(fields) = &mut body {
            fields.insert(
                "updated_at".to_string(),
                Value::String(stored_timestamp(Utc::now()).to_rfc3339_opts(SecondsFormat::Micros, true)),
            );
        }

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        Self::parse_appointments(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| {
                warn!("Conditional update of appointment {} matched no row", id);
                DatabaseError::StaleWrite(format!("appointment {}", id))
            })
    }

    async fn save_consultation_note(
        &self,
        guard: UpdateGuard,
        note: ConsultationNote,
    ) -> Result<ConsultationNote, DatabaseError> {
        let appointment_id = note.appointment_id;
        let body = json!({
            "p_appointment_id": appointment_id,
            "p_expected_status": guard.expected_status,
            "p_expected_updated_at": Self::guard_timestamp(&guard),
            "p_note": note,
        });

        let saved = self.guarded_rpc("save_consultation_note", body, appointment_id).await?;
        serde_json::from_value(saved)
            .map_err(|e| DatabaseError::Decode(format!("Failed to parse consultation note: {}", e)))
    }

    async fn complete_consultation(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
        note: ConsultationNote,
    ) -> Result<CompletedConsultation, DatabaseError> {
        let body = json!({
            "p_appointment_id": id,
            "p_expected_status": guard.expected_status,
            "p_expected_updated_at": Self::guard_timestamp(&guard),
            "p_patch": patch,
            "p_updated_at": stored_timestamp(Utc::now()).to_rfc3339_opts(SecondsFormat::Micros, true),
            "p_note": note,
        });

        let completed = self.guarded_rpc("complete_consultation", body, id).await?;
        serde_json::from_value(completed)
            .map_err(|e| DatabaseError::Decode(format!("Failed to parse completed consultation: {}", e)))
    }

    async fn get_consultation_note(&self, appointment_id: Uuid) -> Result<Option<ConsultationNote>, DatabaseError> {
        let path = format!("/rest/v1/consultation_notes?appointment_id=eq.{}", appointment_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;

        Self::parse_note(rows)
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

/// Map-backed store. Every write holds the appointments lock for the whole
/// check-then-write, which gives the same guarantees as the database
/// constraints.
#[derive(Default)]
pub struct InMemoryAppointmentStore {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
    notes: RwLock<HashMap<Uuid, ConsultationNote>>,
}

impl InMemoryAppointmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn clashes(
        appointments: &HashMap<Uuid, Appointment>,
        candidate: &Appointment,
    ) -> bool {
        appointments.values().any(|existing| {
            existing.id != candidate.id
                && existing.doctor_id == candidate.doctor_id
                && existing.occupies_time()
                && existing.overlaps(candidate.starts_at, candidate.ends_at)
        })
    }

    fn next_updated_at(previous: DateTime<Utc>) -> DateTime<Utc> {
        let now = stored_timestamp(Utc::now());
        if now > previous {
            now
        } else {
            previous + Duration::microseconds(1)
        }
    }
}

#[async_trait]
impl AppointmentStore for InMemoryAppointmentStore {
    async fn get_appointment(&self, id: Uuid) -> Result<Option<Appointment>, DatabaseError> {
        Ok(self.appointments.read().await.get(&id).cloned())
    }

    async fn list_appointments(
        &self,
        doctor_id: Uuid,
        from: NaiveDateTime,
        to: NaiveDateTime,
        exclude_status: Option<AppointmentStatus>,
    ) -> Result<Vec<Appointment>, DatabaseError> {
        let appointments = self.appointments.read().await;
        let mut matching: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.doctor_id == doctor_id)
            .filter(|a| exclude_status.map_or(true, |excluded| a.status != excluded))
            .filter(|a| a.overlaps(from, to))
            .cloned()
            .collect();
        matching.sort_by_key(|a| a.starts_at);
        Ok(matching)
    }

    async fn insert_appointment(&self, appointment: NewAppointment) -> Result<Appointment, DatabaseError> {
        let record = appointment.into_appointment(stored_timestamp(Utc::now()));

        let mut appointments = self.appointments.write().await;
        if Self::clashes(&appointments, &record) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "doctor {} already booked between {} and {}",
                record.doctor_id, record.starts_at, record.ends_at
            )));
        }
        appointments.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_appointment(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
    ) -> Result<Appointment, DatabaseError> {
        let mut appointments = self.appointments.write().await;
        let current = appointments
            .get(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("appointment {}", id)))?;

        if !guard.matches(current) {
            return Err(DatabaseError::StaleWrite(format!("appointment {}", id)));
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.updated_at = Self::next_updated_at(current.updated_at);

        if updated.occupies_time() && patch.moves_interval() && Self::clashes(&appointments, &updated) {
            return Err(DatabaseError::ConstraintViolation(format!(
                "doctor {} already booked between {} and {}",
                updated.doctor_id, updated.starts_at, updated.ends_at
            )));
        }

        appointments.insert(id, updated.clone());
        Ok(updated)
    }

    async fn save_consultation_note(
        &self,
        guard: UpdateGuard,
        note: ConsultationNote,
    ) -> Result<ConsultationNote, DatabaseError> {
        // held until the note is written so no transition slips in between
        let appointments = self.appointments.read().await;
        let current = appointments
            .get(&note.appointment_id)
            .ok_or_else(|| DatabaseError::NotFound(format!("appointment {}", note.appointment_id)))?;

        if !guard.matches(current) {
            return Err(DatabaseError::StaleWrite(format!("appointment {}", note.appointment_id)));
        }

        self.notes.write().await.insert(note.appointment_id, note.clone());
        Ok(note)
    }

    async fn complete_consultation(
        &self,
        id: Uuid,
        guard: UpdateGuard,
        patch: AppointmentPatch,
        note: ConsultationNote,
    ) -> Result<CompletedConsultation, DatabaseError> {
        let mut appointments = self.appointments.write().await;
        let current = appointments
            .get(&id)
            .ok_or_else(|| DatabaseError::NotFound(format!("appointment {}", id)))?;

        if !guard.matches(current) {
            return Err(DatabaseError::StaleWrite(format!("appointment {}", id)));
        }

        let mut updated = current.clone();
        patch.apply_to(&mut updated);
        updated.updated_at = Self::next_updated_at(current.updated_at);

        self.notes.write().await.insert(id, note.clone());
        appointments.insert(id, updated.clone());

        Ok(CompletedConsultation { appointment: updated, note })
    }

    async fn get_consultation_note(&self, appointment_id: Uuid) -> Result<Option<ConsultationNote>, DatabaseError> {
        Ok(self.notes.read().await.get(&appointment_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap().and_hms_opt(h, m, 0).unwrap()
    }

    fn booking(doctor_id: Uuid, start: NaiveDateTime, minutes: i64) -> NewAppointment {
        NewAppointment {
            doctor_id,
            patient_id: Uuid::new_v4(),
            clinic_id: Uuid::new_v4(),
            starts_at: start,
            ends_at: start + Duration::minutes(minutes),
            price: None,
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_overlap_for_same_doctor_only() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();

        store.insert_appointment(booking(doctor, at(10, 0), 30)).await.unwrap();

        assert_matches!(
            store.insert_appointment(booking(doctor, at(10, 15), 30)).await,
            Err(DatabaseError::ConstraintViolation(_))
        );
        // back-to-back and other doctors are fine
        store.insert_appointment(booking(doctor, at(10, 30), 30)).await.unwrap();
        store.insert_appointment(booking(Uuid::new_v4(), at(10, 0), 30)).await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_appointments_free_their_interval() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();
        let first = store.insert_appointment(booking(doctor, at(9, 0), 30)).await.unwrap();

        store
            .update_appointment(
                first.id,
                UpdateGuard::for_appointment(&first),
                AppointmentPatch::status(AppointmentStatus::Cancelled),
            )
            .await
            .unwrap();

        store.insert_appointment(booking(doctor, at(9, 0), 30)).await.unwrap();

        let active = store
            .list_appointments(doctor, at(0, 0), at(23, 59), Some(AppointmentStatus::Cancelled))
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_ne!(active[0].id, first.id);
    }

    #[tokio::test]
    async fn test_guarded_update_rejects_stale_writes() {
        let store = InMemoryAppointmentStore::new();
        let created = store.insert_appointment(booking(Uuid::new_v4(), at(9, 0), 30)).await.unwrap();
        let guard = UpdateGuard::for_appointment(&created);

        let started = store
            .update_appointment(created.id, guard, AppointmentPatch::status(AppointmentStatus::InProgress))
            .await
            .unwrap();
        assert!(started.updated_at > created.updated_at);

        assert_matches!(
            store
                .update_appointment(created.id, guard, AppointmentPatch::status(AppointmentStatus::Cancelled))
                .await,
            Err(DatabaseError::StaleWrite(_))
        );
        assert_eq!(
            store.get_appointment(created.id).await.unwrap().unwrap().status,
            AppointmentStatus::InProgress
        );
    }

    fn note_for(appointment_id: Uuid, diagnosis: &str) -> ConsultationNote {
        ConsultationNote {
            appointment_id,
            diagnosis: diagnosis.to_string(),
            prescription: None,
            recommendations: None,
            follow_up_date: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_note_writes_follow_the_guard() {
        let store = InMemoryAppointmentStore::new();
        let created = store.insert_appointment(booking(Uuid::new_v4(), at(9, 0), 30)).await.unwrap();
        let started = store
            .update_appointment(
                created.id,
                UpdateGuard::for_appointment(&created),
                AppointmentPatch::status(AppointmentStatus::InProgress),
            )
            .await
            .unwrap();

        store
            .save_consultation_note(UpdateGuard::for_appointment(&started), note_for(created.id, ""))
            .await
            .unwrap();

        let cancelled = store
            .update_appointment(
                created.id,
                UpdateGuard::for_appointment(&started),
                AppointmentPatch::status(AppointmentStatus::Cancelled),
            )
            .await
            .unwrap();

        assert_matches!(
            store
                .save_consultation_note(UpdateGuard::for_appointment(&started), note_for(created.id, "late"))
                .await,
            Err(DatabaseError::StaleWrite(_))
        );
        assert_matches!(
            store
                .complete_consultation(
                    created.id,
                    UpdateGuard::for_appointment(&started),
                    AppointmentPatch::status(AppointmentStatus::Completed),
                    note_for(created.id, "late"),
                )
                .await,
            Err(DatabaseError::StaleWrite(_))
        );

        let note = store.get_consultation_note(created.id).await.unwrap().unwrap();
        assert!(note.diagnosis.is_empty());
        assert_eq!(store.get_appointment(created.id).await.unwrap().unwrap(), cancelled);
    }

    #[tokio::test]
    async fn test_complete_consultation_writes_status_and_note_together() {
        let store = InMemoryAppointmentStore::new();
        let created = store.insert_appointment(booking(Uuid::new_v4(), at(9, 0), 30)).await.unwrap();
        let started = store
            .update_appointment(
                created.id,
                UpdateGuard::for_appointment(&created),
                AppointmentPatch::status(AppointmentStatus::InProgress),
            )
            .await
            .unwrap();

        let done = store
            .complete_consultation(
                created.id,
                UpdateGuard::for_appointment(&started),
                AppointmentPatch::status(AppointmentStatus::Completed),
                note_for(created.id, "sinusitis"),
            )
            .await
            .unwrap();

        assert_eq!(done.appointment.status, AppointmentStatus::Completed);
        assert!(done.appointment.updated_at > started.updated_at);
        assert_eq!(
            store.get_consultation_note(created.id).await.unwrap().unwrap().diagnosis,
            "sinusitis"
        );
    }

    #[tokio::test]
    async fn test_moving_interval_checks_other_appointments() {
        let store = InMemoryAppointmentStore::new();
        let doctor = Uuid::new_v4();
        store.insert_appointment(booking(doctor, at(10, 0), 30)).await.unwrap();
        let moving = store.insert_appointment(booking(doctor, at(11, 0), 30)).await.unwrap();

        let blocked = store
            .update_appointment(moving.id, UpdateGuard::for_appointment(&moving), AppointmentPatch {
                starts_at: Some(at(10, 0)),
                ends_at: Some(at(10, 30)),
                ..AppointmentPatch::default()
            })
            .await;
        assert_matches!(blocked, Err(DatabaseError::ConstraintViolation(_)));

        // overlapping its own previous interval is not a clash
        let nudged = store
            .update_appointment(moving.id, UpdateGuard::for_appointment(&moving), AppointmentPatch {
                starts_at: Some(at(11, 15)),
                ends_at: Some(at(11, 45)),
                ..AppointmentPatch::default()
            })
            .await
            .unwrap();
        assert_eq!(nudged.starts_at, at(11, 15));
    }
}
