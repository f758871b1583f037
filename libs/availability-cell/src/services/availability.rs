// libs/availability-cell/src/services/availability.rs
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

use shared_database::{with_timeout, DatabaseError};

use crate::models::{
    AvailabilityError, AvailabilityRule, CreateAvailabilityRequest, UpdateAvailabilityRequest,
};
use crate::services::store::AvailabilityStore;

pub struct AvailabilityService {
    store: Arc<dyn AvailabilityStore>,
    timeout: Duration,
}

impl AvailabilityService {
    pub fn new(store: Arc<dyn AvailabilityStore>, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    pub async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, AvailabilityError> {
        self.ensure_doctor(doctor_id).await?;
        Ok(with_timeout(self.timeout, self.store.list_rules(doctor_id)).await?)
    }

    pub async fn create_rule(
        &self,
        doctor_id: Uuid,
        request: CreateAvailabilityRequest,
    ) -> Result<AvailabilityRule, AvailabilityError> {
        info!("Creating availability for doctor {} on day {}", doctor_id, request.day_of_week);

        validate_window(request.start_time, request.end_time)?;
        if !(0..=6).contains(&request.day_of_week) {
            return Err(AvailabilityError::InvalidDayOfWeek(request.day_of_week));
        }

        self.ensure_doctor(doctor_id).await?;

        let rule = AvailabilityRule {
            id: Uuid::new_v4(),
            doctor_id,
            clinic_id: request.clinic_id,
            day_of_week: request.day_of_week,
            start_time: request.start_time,
            end_time: request.end_time,
            is_available: request.is_available.unwrap_or(true),
        };

        self.check_overlaps(&rule).await?;

        let created = with_timeout(self.timeout, self.store.insert_rule(rule))
            .await
            .map_err(overlap_or)?;

        info!("Availability rule {} created", created.id);
        Ok(created)
    }

    pub async fn update_rule(
        &self,
        doctor_id: Uuid,
        rule_id: Uuid,
        request: UpdateAvailabilityRequest,
    ) -> Result<AvailabilityRule, AvailabilityError> {
        debug!("Updating availability rule {} for doctor {}", rule_id, doctor_id);

        let mut rule = self.owned_rule(doctor_id, rule_id).await?;

        if let Some(start_time) = request.start_time {
            rule.start_time = start_time;
        }
        if let Some(end_time) = request.end_time {
            rule.end_time = end_time;
        }
        if let Some(is_available) = request.is_available {
            rule.is_available = is_available;
        }

        validate_window(rule.start_time, rule.end_time)?;
        self.check_overlaps(&rule).await?;

        with_timeout(self.timeout, self.store.update_rule(rule))
            .await
            .map_err(overlap_or)
    }

    pub async fn delete_rule(&self, doctor_id: Uuid, rule_id: Uuid) -> Result<(), AvailabilityError> {
        self.owned_rule(doctor_id, rule_id).await?;

        with_timeout(self.timeout, self.store.delete_rule(rule_id))
            .await
            .map_err(|e| match e {
                DatabaseError::NotFound(_) => AvailabilityError::RuleNotFound,
                other => other.into(),
            })?;

        info!("Availability rule {} deleted", rule_id);
        Ok(())
    }

    async fn ensure_doctor(&self, doctor_id: Uuid) -> Result<(), AvailabilityError> {
        if with_timeout(self.timeout, self.store.doctor_exists(doctor_id)).await? {
            Ok(())
        } else {
            Err(AvailabilityError::DoctorNotFound)
        }
    }

    async fn owned_rule(&self, doctor_id: Uuid, rule_id: Uuid) -> Result<AvailabilityRule, AvailabilityError> {
        match with_timeout(self.timeout, self.store.get_rule(rule_id)).await? {
            Some(rule) if rule.doctor_id == doctor_id => Ok(rule),
            _ => Err(AvailabilityError::RuleNotFound),
        }
    }

    async fn check_overlaps(&self, candidate: &AvailabilityRule) -> Result<(), AvailabilityError> {
        let existing = with_timeout(self.timeout, self.store.list_rules(candidate.doctor_id)).await?;

        if let Some(clash) = existing
            .iter()
            .find(|rule| rule.id != candidate.id && rule.conflicts_with(candidate))
        {
            warn!(
                "Availability {}-{} overlaps rule {} on day {}",
                candidate.start_time, candidate.end_time, clash.id, candidate.day_of_week
            );
            return Err(AvailabilityError::OverlappingRule);
        }

        Ok(())
    }
}

fn validate_window(start_time: NaiveTime, end_time: NaiveTime) -> Result<(), AvailabilityError> {
    if start_time >= end_time {
        return Err(AvailabilityError::InvalidTimeRange);
    }
    Ok(())
}

fn overlap_or(err: DatabaseError) -> AvailabilityError {
    match err {
        DatabaseError::ConstraintViolation(_) => AvailabilityError::OverlappingRule,
        DatabaseError::NotFound(_) => AvailabilityError::RuleNotFound,
        other => other.into(),
    }
}
