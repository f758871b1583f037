// libs/appointment-cell/src/services/authorization.rs
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use uuid::Uuid;

use shared_models::auth::User;

use crate::models::{Appointment, AppointmentError, AppointmentStatus, Transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Patient,
    Doctor,
    Assistant,
    Admin,
}

impl FromStr for Role {
    type Err = AppointmentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "patient" => Ok(Role::Patient),
            "doctor" => Ok(Role::Doctor),
            "assistant" => Ok(Role::Assistant),
            "admin" => Ok(Role::Admin),
            other => Err(AppointmentError::Unauthorized(format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Patient => "patient",
            Role::Doctor => "doctor",
            Role::Assistant => "assistant",
            Role::Admin => "admin",
        };
        f.write_str(name)
    }
}

/// Verified caller identity. Assistants act for exactly one doctor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
    pub assigned_doctor_id: Option<Uuid>,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role, assigned_doctor_id: None }
    }

    pub fn assistant(id: Uuid, doctor_id: Uuid) -> Self {
        Self { id, role: Role::Assistant, assigned_doctor_id: Some(doctor_id) }
    }

    pub fn from_user(user: &User) -> Result<Self, AppointmentError> {
        let id = Uuid::parse_str(&user.id)
            .map_err(|_| AppointmentError::Unauthorized("user id is not a valid identifier".to_string()))?;

        let role = user
            .role
            .as_deref()
            .ok_or_else(|| AppointmentError::Unauthorized("user has no role".to_string()))?
            .parse::<Role>()?;

        let assigned_doctor_id = match (role, user.assigned_doctor_id.as_deref()) {
            (Role::Assistant, Some(doctor_id)) => Some(Uuid::parse_str(doctor_id).map_err(|_| {
                AppointmentError::Unauthorized("assigned doctor is not a valid identifier".to_string())
            })?),
            _ => None,
        };

        Ok(Self { id, role, assigned_doctor_id })
    }

    /// Doctor or assistant acting for `doctor_id`.
    pub fn acts_for_doctor(&self, doctor_id: Uuid) -> bool {
        match self.role {
            Role::Doctor => self.id == doctor_id,
            Role::Assistant => self.assigned_doctor_id == Some(doctor_id),
            Role::Patient | Role::Admin => false,
        }
    }
}

/// Role gate for a lifecycle operation. Status validity is checked
/// separately against the transition table.
pub fn can_transition(
    actor: &Actor,
    appointment: &Appointment,
    transition: Transition,
    now: NaiveDateTime,
) -> bool {
    let upcoming = appointment.starts_at > now;

    match actor.role {
        Role::Admin => true,
        Role::Patient => {
            actor.id == appointment.patient_id
                && match transition {
                    // elapsed or running appointments are not the patient's to cancel
                    Transition::Cancel => appointment.status == AppointmentStatus::Scheduled && upcoming,
                    Transition::Reschedule => true,
                    Transition::Start
                    | Transition::Complete
                    | Transition::NoShow
                    | Transition::SaveNotes => false,
                }
        }
        Role::Doctor | Role::Assistant => {
            actor.acts_for_doctor(appointment.doctor_id)
                && match transition {
                    Transition::Cancel => appointment.status == AppointmentStatus::InProgress || upcoming,
                    _ => true,
                }
        }
    }
}

/// Who may create an appointment for `patient_id` with `doctor_id`.
pub fn can_book(actor: &Actor, doctor_id: Uuid, patient_id: Uuid) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Patient => actor.id == patient_id,
        Role::Doctor | Role::Assistant => actor.acts_for_doctor(doctor_id),
    }
}

/// Read access to an appointment and its consultation session.
pub fn can_view(actor: &Actor, appointment: &Appointment) -> bool {
    match actor.role {
        Role::Admin => true,
        Role::Patient => actor.id == appointment.patient_id,
        Role::Doctor | Role::Assistant => actor.acts_for_doctor(appointment.doctor_id),
    }
}

pub fn authorize(
    actor: &Actor,
    appointment: &Appointment,
    transition: Transition,
    now: NaiveDateTime,
) -> Result<(), AppointmentError> {
    if can_transition(actor, appointment, transition, now) {
        Ok(())
    } else {
        Err(AppointmentError::Unauthorized(format!(
            "{} may not {} this appointment",
            actor.role, transition
        )))
    }
}
