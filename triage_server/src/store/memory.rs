//! In-memory implementation of `Store`.
//!
//! Enforces the same uniqueness rules as the PostgreSQL schema. All data is
//! lost on restart; used by tests and by `--in-memory` runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{ActivityCounts, ActivityTimestamps, MetricSample, Store, StoreError};
use crate::models::alert::{Alert, NewAlert};
use crate::models::audit::{AuditEntry, NewAuditEntry};
use crate::models::delivery::{Delivery, NewDelivery};
use crate::models::failure::{ActionFailure, NewActionFailure, RetryOutcome, RetryStatus};
use crate::models::metric::{DeliveryMetric, NewDeliveryMetric};
use crate::models::rule::{NewRule, Rule};
use crate::models::user::{NewUser, User};

#[derive(Default)]
struct Tables {
    next_id: i64,
    deliveries: Vec<Delivery>,
    rules: Vec<Rule>,
    alerts: Vec<Alert>,
    failures: Vec<ActionFailure>,
    audit: Vec<AuditEntry>,
    metrics: Vec<DeliveryMetric>,
    users: Vec<User>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent operation fail as if the database were down.
    #[cfg(test)]
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Pool("store unavailable".to_string()));
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn deliveries(&self) -> Vec<Delivery> {
        self.tables.read().await.deliveries.clone()
    }

    #[cfg(test)]
    pub async fn alerts(&self) -> Vec<Alert> {
        self.tables.read().await.alerts.clone()
    }

    #[cfg(test)]
    pub async fn failures(&self) -> Vec<ActionFailure> {
        self.tables.read().await.failures.clone()
    }

    #[cfg(test)]
    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.tables.read().await.audit.clone()
    }

    #[cfg(test)]
    pub async fn delivery_metrics(&self) -> Vec<DeliveryMetric> {
        self.tables.read().await.metrics.clone()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn save_delivery(&self, delivery: NewDelivery) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables
            .deliveries
            .iter()
            .any(|d| d.delivery_id == delivery.delivery_id)
        {
            return Ok(false);
        }
        let id = tables.id();
        tables.deliveries.push(Delivery {
            id,
            delivery_id: delivery.delivery_id,
            event_type: delivery.event_type,
            action: delivery.action,
            repository_full_name: delivery.repository_full_name,
            sender_login: delivery.sender_login,
            raw_payload: delivery.raw_payload,
            received_at: delivery.received_at,
        });
        Ok(true)
    }

    async fn delivery_payload(
        &self,
        delivery_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .deliveries
            .iter()
            .find(|d| d.delivery_id == delivery_id)
            .map(|d| d.raw_payload.clone()))
    }

    async fn active_rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.rules.iter().filter(|r| r.is_active).cloned().collect())
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.check()?;
        Ok(self.tables.read().await.rules.clone())
    }

    async fn create_rule(&self, rule: NewRule) -> Result<Rule, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.rules.iter().any(|r| {
            r.event_type == rule.event_type
                && r.keyword == rule.keyword
                && r.suggestion_type == rule.suggestion_type
                && r.suggestion_value == rule.suggestion_value
        }) {
            return Err(StoreError::Conflict(format!(
                "rule for keyword {:?} already exists",
                rule.keyword
            )));
        }
        let id = tables.id();
        let row = Rule {
            id,
            event_type: rule.event_type,
            keyword: rule.keyword,
            suggestion_type: rule.suggestion_type,
            suggestion_value: rule.suggestion_value,
            reason: rule.reason,
            is_active: rule.is_active,
            created_at: Utc::now(),
        };
        tables.rules.push(row.clone());
        Ok(row)
    }

    async fn toggle_rule(&self, id: i64) -> Result<Option<Rule>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.rules.iter_mut().find(|r| r.id == id).map(|r| {
            r.is_active = !r.is_active;
            r.clone()
        }))
    }

    async fn save_alert(&self, alert: NewAlert) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.alerts.iter().any(|a| {
            a.delivery_id == alert.delivery_id
                && a.suggestion_type == alert.suggestion_type
                && a.suggestion_value == alert.suggestion_value
                && a.rule_matched == alert.rule_matched
        }) {
            return Ok(false);
        }
        let id = tables.id();
        tables.alerts.push(Alert {
            id,
            delivery_id: alert.delivery_id,
            event_type: alert.event_type,
            action: alert.action,
            repository_full_name: alert.repository_full_name,
            sender_login: alert.sender_login,
            rule_matched: alert.rule_matched,
            suggestion_type: alert.suggestion_type,
            suggestion_value: alert.suggestion_value,
            reason: alert.reason,
            created_at: alert.created_at,
        });
        Ok(true)
    }

    async fn record_failure(&self, failure: NewActionFailure) -> Result<ActionFailure, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.id();
        let row = ActionFailure {
            id,
            delivery_id: failure.delivery_id,
            event_type: failure.event_type,
            action: failure.action,
            repository_full_name: failure.repository_full_name,
            suggestion_type: failure.suggestion_type,
            suggestion_value: failure.suggestion_value,
            error_message: failure.error_message,
            attempt_count: failure.attempt_count,
            retry_count: 0,
            last_retry_status: RetryStatus::Never.as_str().to_string(),
            last_retry_message: None,
            last_retry_at: None,
            is_resolved: false,
            occurred_at: failure.occurred_at,
        };
        tables.failures.push(row.clone());
        Ok(row)
    }

    async fn get_failure(&self, id: i64) -> Result<Option<ActionFailure>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.failures.iter().find(|f| f.id == id).cloned())
    }

    async fn apply_retry_outcome(
        &self,
        id: i64,
        outcome: RetryOutcome,
    ) -> Result<Option<ActionFailure>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.failures.iter_mut().find(|f| f.id == id).map(|f| {
            f.retry_count += 1;
            f.last_retry_status = outcome.status.as_str().to_string();
            f.last_retry_message = Some(outcome.message.clone());
            f.last_retry_at = Some(outcome.at);
            f.is_resolved = outcome.is_resolved();
            f.clone()
        }))
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.id();
        tables.audit.push(AuditEntry {
            id,
            actor: entry.actor,
            action: entry.action,
            target: entry.target,
            target_id: entry.target_id,
            payload: entry.payload,
            created_at: entry.created_at,
        });
        Ok(())
    }

    async fn record_delivery_metric(&self, metric: NewDeliveryMetric) -> Result<(), StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let id = tables.id();
        tables.metrics.push(DeliveryMetric {
            id,
            event_type: metric.event_type,
            delivery_id: metric.delivery_id,
            success: metric.success,
            processing_ms: metric.processing_ms,
            recorded_at: metric.recorded_at,
        });
        Ok(())
    }

    async fn activity_counts(&self, since: DateTime<Utc>) -> Result<ActivityCounts, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(ActivityCounts {
            events: tables
                .deliveries
                .iter()
                .filter(|d| d.received_at >= since)
                .count() as i64,
            alerts: tables
                .alerts
                .iter()
                .filter(|a| a.created_at >= since)
                .count() as i64,
            failures: tables
                .failures
                .iter()
                .filter(|f| f.occurred_at >= since)
                .count() as i64,
        })
    }

    async fn activity_timestamps(
        &self,
        since: DateTime<Utc>,
    ) -> Result<ActivityTimestamps, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(ActivityTimestamps {
            events: tables
                .deliveries
                .iter()
                .map(|d| d.received_at)
                .filter(|t| *t >= since)
                .collect(),
            alerts: tables
                .alerts
                .iter()
                .map(|a| a.created_at)
                .filter(|t| *t >= since)
                .collect(),
            failures: tables
                .failures
                .iter()
                .map(|f| f.occurred_at)
                .filter(|t| *t >= since)
                .collect(),
        })
    }

    async fn metric_samples(&self, since: DateTime<Utc>) -> Result<Vec<MetricSample>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables
            .metrics
            .iter()
            .filter(|m| m.recorded_at >= since)
            .map(|m| MetricSample {
                success: m.success,
                processing_ms: m.processing_ms,
            })
            .collect())
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.check()?;
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "user {:?} already exists",
                user.username
            )));
        }
        let id = tables.id();
        let now = Utc::now();
        let row = User {
            id,
            username: user.username,
            password_hash: user.password_hash,
            is_active: user.is_active,
            created_at: now,
            updated_at: now,
        };
        tables.users.push(row.clone());
        Ok(row)
    }

    async fn set_user_active(&self, id: i64, active: bool) -> Result<Option<User>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.is_active = active;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    async fn set_user_password(
        &self,
        id: i64,
        password_hash: String,
    ) -> Result<Option<User>, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|u| {
            u.password_hash = password_hash;
            u.updated_at = Utc::now();
            u.clone()
        }))
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        self.check()?;
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        Ok(tables.users.len() < before)
    }
}
