// libs/availability-cell/src/services/store.rs
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::{representation_headers, SupabaseClient};
use shared_database::DatabaseError;

use crate::models::AvailabilityRule;

/// Read/write access to doctors' weekly availability rules.
#[async_trait]
pub trait AvailabilityStore: Send + Sync {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, DatabaseError>;

    async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError>;

    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, DatabaseError>;

    async fn insert_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError>;

    async fn update_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError>;

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), DatabaseError>;
}

// ==============================================================================
// SUPABASE-BACKED STORE
// ==============================================================================

pub struct SupabaseAvailabilityStore {
    supabase: Arc<SupabaseClient>,
    token: String,
}

impl SupabaseAvailabilityStore {
    pub fn new(supabase: Arc<SupabaseClient>, token: impl Into<String>) -> Self {
        Self {
            supabase,
            token: token.into(),
        }
    }

    fn parse_rules(rows: Vec<Value>) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        rows.into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<AvailabilityRule>, _>>()
            .map_err(|e| DatabaseError::Decode(format!("Failed to parse availability: {}", e)))
    }

    fn single_rule(rows: Vec<Value>) -> Result<AvailabilityRule, DatabaseError> {
        Self::parse_rules(rows)?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::NotFound("availability rule".to_string()))
    }
}

#[async_trait]
impl AvailabilityStore for SupabaseAvailabilityStore {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, DatabaseError> {
        let path = format!("/rest/v1/doctors?id=eq.{}&select=id", doctor_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;
        Ok(!rows.is_empty())
    }

    async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        debug!("Fetching availability rules for doctor: {}", doctor_id);

        let path = format!(
            "/rest/v1/doctor_availability?doctor_id=eq.{}&order=day_of_week.asc,start_time.asc",
            doctor_id
        );
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;

        Self::parse_rules(rows)
    }

    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, DatabaseError> {
        let path = format!("/rest/v1/doctor_availability?id=eq.{}", rule_id);
        let rows: Vec<Value> = self.supabase
            .request(Method::GET, &path, Some(&self.token), None)
            .await?;

        Ok(Self::parse_rules(rows)?.into_iter().next())
    }

    async fn insert_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        let body = serde_json::to_value(&rule)
            .map_err(|e| DatabaseError::Decode(e.to_string()))?;

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::POST,
                "/rest/v1/doctor_availability",
                Some(&self.token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        Self::single_rule(rows)
    }

    async fn update_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        let path = format!("/rest/v1/doctor_availability?id=eq.{}", rule.id);
        let body = json!({
            "start_time": rule.start_time.format("%H:%M:%S").to_string(),
            "end_time": rule.end_time.format("%H:%M:%S").to_string(),
            "is_available": rule.is_available,
        });

        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::PATCH,
                &path,
                Some(&self.token),
                Some(body),
                Some(representation_headers()),
            )
            .await?;

        Self::single_rule(rows)
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), DatabaseError> {
        let path = format!("/rest/v1/doctor_availability?id=eq.{}", rule_id);
        let rows: Vec<Value> = self.supabase
            .request_with_headers(
                Method::DELETE,
                &path,
                Some(&self.token),
                None,
                Some(representation_headers()),
            )
            .await?;

        if rows.is_empty() {
            return Err(DatabaseError::NotFound("availability rule".to_string()));
        }
        Ok(())
    }
}

// ==============================================================================
// IN-MEMORY STORE
// ==============================================================================

#[derive(Default)]
pub struct InMemoryAvailabilityStore {
    doctors: RwLock<HashSet<Uuid>>,
    rules: RwLock<HashMap<Uuid, AvailabilityRule>>,
}

impl InMemoryAvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_doctor(&self, doctor_id: Uuid) {
        self.doctors.write().await.insert(doctor_id);
    }
}

#[async_trait]
impl AvailabilityStore for InMemoryAvailabilityStore {
    async fn doctor_exists(&self, doctor_id: Uuid) -> Result<bool, DatabaseError> {
        Ok(self.doctors.read().await.contains(&doctor_id))
    }

    async fn list_rules(&self, doctor_id: Uuid) -> Result<Vec<AvailabilityRule>, DatabaseError> {
        let rules = self.rules.read().await;
        let mut matching: Vec<AvailabilityRule> = rules
            .values()
            .filter(|rule| rule.doctor_id == doctor_id)
            .cloned()
            .collect();
        matching.sort_by_key(|rule| (rule.day_of_week, rule.start_time));
        Ok(matching)
    }

    async fn get_rule(&self, rule_id: Uuid) -> Result<Option<AvailabilityRule>, DatabaseError> {
        Ok(self.rules.read().await.get(&rule_id).cloned())
    }

    async fn insert_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        let mut rules = self.rules.write().await;
        if rules.values().any(|existing| existing.id != rule.id && existing.conflicts_with(&rule)) {
            return Err(DatabaseError::ConstraintViolation(
                "overlapping availability rule".to_string(),
            ));
        }
        rules.insert(rule.id, rule.clone());
        drop(rules);

        self.doctors.write().await.insert(rule.doctor_id);
        Ok(rule)
    }

    async fn update_rule(&self, rule: AvailabilityRule) -> Result<AvailabilityRule, DatabaseError> {
        let mut rules = self.rules.write().await;
        if !rules.contains_key(&rule.id) {
            return Err(DatabaseError::NotFound("availability rule".to_string()));
        }
        if rules.values().any(|existing| existing.id != rule.id && existing.conflicts_with(&rule)) {
            return Err(DatabaseError::ConstraintViolation(
                "overlapping availability rule".to_string(),
            ));
        }
        rules.insert(rule.id, rule.clone());
        Ok(rule)
    }

    async fn delete_rule(&self, rule_id: Uuid) -> Result<(), DatabaseError> {
        self.rules
            .write()
            .await
            .remove(&rule_id)
            .map(|_| ())
            .ok_or_else(|| DatabaseError::NotFound("availability rule".to_string()))
    }
}
