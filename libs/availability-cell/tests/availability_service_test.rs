// libs/availability-cell/tests/availability_service_test.rs
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::NaiveTime;
use uuid::Uuid;

use availability_cell::models::*;
use availability_cell::services::availability::AvailabilityService;
use availability_cell::services::store::{AvailabilityStore, InMemoryAvailabilityStore};
use shared_database::DatabaseError;

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

fn create_request(clinic_id: Uuid, day: i32, start: NaiveTime, end: NaiveTime) -> CreateAvailabilityRequest {
    CreateAvailabilityRequest {
        clinic_id,
        day_of_week: day,
        start_time: start,
        end_time: end,
        is_available: None,
    }
}

async fn service_with_doctor() -> (AvailabilityService, Uuid) {
    let store = Arc::new(InMemoryAvailabilityStore::new());
    let doctor_id = Uuid::new_v4();
    store.register_doctor(doctor_id).await;
    (AvailabilityService::new(store, Duration::from_millis(500)), doctor_id)
}

#[tokio::test]
async fn test_create_and_list_rules() {
    let (service, doctor_id) = service_with_doctor().await;
    let clinic = Uuid::new_v4();

    let afternoon = service.create_rule(doctor_id, create_request(clinic, 1, t(14, 0), t(17, 0))).await.unwrap();
    let morning = service.create_rule(doctor_id, create_request(clinic, 1, t(9, 0), t(12, 0))).await.unwrap();

    assert!(morning.is_available);
    assert_eq!(morning.doctor_id, doctor_id);

    let rules = service.list_rules(doctor_id).await.unwrap();
    let ids: Vec<Uuid> = rules.iter().map(|r| r.id).collect();
    assert_eq!(ids, vec![morning.id, afternoon.id]);
}

#[tokio::test]
async fn test_rejects_invalid_windows_and_days() {
    let (service, doctor_id) = service_with_doctor().await;
    let clinic = Uuid::new_v4();

    let inverted = service.create_rule(doctor_id, create_request(clinic, 1, t(12, 0), t(9, 0))).await;
    assert_matches!(inverted, Err(AvailabilityError::InvalidTimeRange));

    let empty = service.create_rule(doctor_id, create_request(clinic, 1, t(9, 0), t(9, 0))).await;
    assert_matches!(empty, Err(AvailabilityError::InvalidTimeRange));

    let bad_day = service.create_rule(doctor_id, create_request(clinic, 7, t(9, 0), t(12, 0))).await;
    assert_matches!(bad_day, Err(AvailabilityError::InvalidDayOfWeek(7)));
}

#[tokio::test]
async fn test_unknown_doctor_is_rejected() {
    let (service, _) = service_with_doctor().await;

    let result = service
        .create_rule(Uuid::new_v4(), create_request(Uuid::new_v4(), 1, t(9, 0), t(12, 0)))
        .await;
    assert_matches!(result, Err(AvailabilityError::DoctorNotFound));

    assert_matches!(service.list_rules(Uuid::new_v4()).await, Err(AvailabilityError::DoctorNotFound));
}

#[tokio::test]
async fn test_overlapping_rules_in_same_clinic_are_rejected() {
    let (service, doctor_id) = service_with_doctor().await;
    let clinic = Uuid::new_v4();

    service.create_rule(doctor_id, create_request(clinic, 1, t(9, 0), t(12, 0))).await.unwrap();

    let overlapping = service.create_rule(doctor_id, create_request(clinic, 1, t(11, 0), t(13, 0))).await;
    assert_matches!(overlapping, Err(AvailabilityError::OverlappingRule));

    // back-to-back, another day, and another clinic are all fine
    service.create_rule(doctor_id, create_request(clinic, 1, t(12, 0), t(13, 0))).await.unwrap();
    service.create_rule(doctor_id, create_request(clinic, 2, t(9, 0), t(12, 0))).await.unwrap();
    service.create_rule(doctor_id, create_request(Uuid::new_v4(), 1, t(9, 0), t(12, 0))).await.unwrap();
}

#[tokio::test]
async fn test_update_revalidates_window_and_overlap() {
    let (service, doctor_id) = service_with_doctor().await;
    let clinic = Uuid::new_v4();

    let morning = service.create_rule(doctor_id, create_request(clinic, 1, t(9, 0), t(12, 0))).await.unwrap();
    let afternoon = service.create_rule(doctor_id, create_request(clinic, 1, t(13, 0), t(17, 0))).await.unwrap();

    let stretched = service
        .update_rule(doctor_id, morning.id, UpdateAvailabilityRequest {
            end_time: Some(t(14, 0)),
            ..Default::default()
        })
        .await;
    assert_matches!(stretched, Err(AvailabilityError::OverlappingRule));

    let inverted = service
        .update_rule(doctor_id, afternoon.id, UpdateAvailabilityRequest {
            start_time: Some(t(18, 0)),
            ..Default::default()
        })
        .await;
    assert_matches!(inverted, Err(AvailabilityError::InvalidTimeRange));

    let shortened = service
        .update_rule(doctor_id, morning.id, UpdateAvailabilityRequest {
            end_time: Some(t(11, 0)),
            is_available: Some(false),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(shortened.end_time, t(11, 0));
    assert!(!shortened.is_available);
}

#[tokio::test]
async fn test_delete_rule_scoped_to_owner() {
    let (service, doctor_id) = service_with_doctor().await;
    let rule = service
        .create_rule(doctor_id, create_request(Uuid::new_v4(), 3, t(9, 0), t(12, 0)))
        .await
        .unwrap();

    let foreign = service.delete_rule(Uuid::new_v4(), rule.id).await;
    assert_matches!(foreign, Err(AvailabilityError::RuleNotFound));

    service.delete_rule(doctor_id, rule.id).await.unwrap();
    assert!(service.list_rules(doctor_id).await.unwrap().is_empty());

    let again = service.delete_rule(doctor_id, rule.id).await;
    assert_matches!(again, Err(AvailabilityError::RuleNotFound));
}

struct SlowStore;

#[async_trait]
impl AvailabilityStore for SlowStore {
    async fn doctor_exists(&self, _doctor_id: Uuid) -> Result<bool, DatabaseError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(true)
    }

    async fn list_rules(&self, _doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(vec![])
    }

    async fn get_rule(&self, _rule_id: Uuid) -> Result<Option<AvailabilityRule>, DatabaseError> {
        Ok(None)
    }

    async fn insert_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        Ok(rule)
    }

    async fn update_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        Ok(rule)
    }

    async fn delete_rule(&self, _rule_id: Uuid) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[tokio::test]
async fn test_slow_store_surfaces_as_unavailable() {
    let service = AvailabilityService::new(Arc::new(SlowStore), Duration::from_millis(20));

    let result = service.list_rules(Uuid::new_v4()).await;
    assert_matches!(result, Err(AvailabilityError::StoreUnavailable(_)));
}
