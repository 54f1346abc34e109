//! Persistence abstraction for the triage pipeline.
//!
//! `Store` is the single seam between the pipeline and its storage. The
//! production backend is PostgreSQL via diesel-async (`PgStore`); tests use
//! `MemoryStore`, which honours the same uniqueness rules.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::models::alert::NewAlert;
use crate::models::audit::NewAuditEntry;
use crate::models::delivery::NewDelivery;
use crate::models::failure::{ActionFailure, NewActionFailure, RetryOutcome};
use crate::models::metric::NewDeliveryMetric;
use crate::models::rule::{NewRule, Rule};
use crate::models::user::{NewUser, User};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database pool: {0}")]
    Pool(String),

    #[error("database query: {0}")]
    Query(#[from] diesel::result::Error),

    #[error("database operation timed out after {0:?}")]
    Timeout(Duration),

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Row counts newer than a cutoff, one per activity table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActivityCounts {
    pub events: i64,
    pub alerts: i64,
    pub failures: i64,
}

/// Raw timestamps newer than a cutoff, one list per activity table.
#[derive(Debug, Clone, Default)]
pub struct ActivityTimestamps {
    pub events: Vec<DateTime<Utc>>,
    pub alerts: Vec<DateTime<Utc>>,
    pub failures: Vec<DateTime<Utc>>,
}

/// One delivery metric reduced to what the overview needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSample {
    pub success: bool,
    pub processing_ms: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert a delivery. Returns `false` when the delivery id already exists;
    /// the existing row is left untouched.
    async fn save_delivery(&self, delivery: NewDelivery) -> Result<bool, StoreError>;

    /// Raw payload of a stored delivery.
    async fn delivery_payload(
        &self,
        delivery_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError>;

    /// All active rules, oldest first.
    async fn active_rules(&self) -> Result<Vec<Rule>, StoreError>;

    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError>;

    /// Fails with `StoreError::Conflict` on a duplicate
    /// (event_type, keyword, suggestion_type, suggestion_value).
    async fn create_rule(&self, rule: NewRule) -> Result<Rule, StoreError>;

    /// Flip `is_active`. `None` when the rule does not exist.
    async fn toggle_rule(&self, id: i64) -> Result<Option<Rule>, StoreError>;

    /// Insert an alert; a duplicate (delivery, type, value, rule) is a no-op.
    /// Returns `true` when a new row was written.
    async fn save_alert(&self, alert: NewAlert) -> Result<bool, StoreError>;

    async fn record_failure(&self, failure: NewActionFailure) -> Result<ActionFailure, StoreError>;

    async fn get_failure(&self, id: i64) -> Result<Option<ActionFailure>, StoreError>;

    /// Apply a manual retry outcome: bumps `retry_count` and overwrites the
    /// last-retry columns. `None` when the failure does not exist.
    async fn apply_retry_outcome(
        &self,
        id: i64,
        outcome: RetryOutcome,
    ) -> Result<Option<ActionFailure>, StoreError>;

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError>;

    async fn record_delivery_metric(&self, metric: NewDeliveryMetric) -> Result<(), StoreError>;

    async fn activity_counts(&self, since: DateTime<Utc>) -> Result<ActivityCounts, StoreError>;

    async fn activity_timestamps(
        &self,
        since: DateTime<Utc>,
    ) -> Result<ActivityTimestamps, StoreError>;

    async fn metric_samples(&self, since: DateTime<Utc>) -> Result<Vec<MetricSample>, StoreError>;

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError>;

    /// Fails with `StoreError::Conflict` on a duplicate username.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn set_user_active(&self, id: i64, active: bool) -> Result<Option<User>, StoreError>;

    async fn set_user_password(
        &self,
        id: i64,
        password_hash: String,
    ) -> Result<Option<User>, StoreError>;

    /// Returns `false` when no such user existed.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;
}
