//! PostgreSQL implementation of `Store` on diesel-async.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel_async::pooled_connection::deadpool::{Object, Pool};
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{ActivityCounts, ActivityTimestamps, MetricSample, Store, StoreError};
use crate::models::alert::NewAlert;
use crate::models::audit::NewAuditEntry;
use crate::models::delivery::NewDelivery;
use crate::models::failure::{ActionFailure, NewActionFailure, RetryOutcome};
use crate::models::metric::NewDeliveryMetric;
use crate::models::rule::{NewRule, Rule};
use crate::models::user::{NewUser, User};
use crate::schema::{
    triage_action_failures, triage_alerts, triage_audit_log, triage_deliveries,
    triage_delivery_metrics, triage_rules, triage_users,
};

pub type DbPool = Pool<AsyncPgConnection>;

/// Diesel-backed store. Every operation runs under `timeout`.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
    timeout: Duration,
}

impl PgStore {
    pub fn connect(database_url: &str, max_size: usize, timeout: Duration) -> anyhow::Result<Self> {
        let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
        let pool = Pool::builder(manager)
            .max_size(max_size)
            .build()
            .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;
        Ok(Self { pool, timeout })
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    async fn conn(&self) -> Result<Object<AsyncPgConnection>, StoreError> {
        self.pool
            .get()
            .await
            .map_err(|e| StoreError::Pool(e.to_string()))
    }

    async fn timed<T>(
        &self,
        op: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        tokio::time::timeout(self.timeout, op)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

fn conflict_or_query(e: DieselError) -> StoreError {
    match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
            StoreError::Conflict(info.message().to_string())
        }
        other => StoreError::Query(other),
    }
}

#[async_trait]
impl Store for PgStore {
    async fn save_delivery(&self, delivery: NewDelivery) -> Result<bool, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let inserted = diesel::insert_into(triage_deliveries::table)
                .values(&delivery)
                .on_conflict(triage_deliveries::delivery_id)
                .do_nothing()
                .execute(&mut conn)
                .await?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn delivery_payload(
        &self,
        delivery_id: &str,
    ) -> Result<Option<serde_json::Value>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let payload = triage_deliveries::table
                .filter(triage_deliveries::delivery_id.eq(delivery_id))
                .select(triage_deliveries::raw_payload)
                .first::<serde_json::Value>(&mut conn)
                .await
                .optional()?;
            Ok(payload)
        })
        .await
    }

    async fn active_rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let rules = triage_rules::table
                .filter(triage_rules::is_active.eq(true))
                .order(triage_rules::id.asc())
                .load::<Rule>(&mut conn)
                .await?;
            Ok(rules)
        })
        .await
    }

    async fn list_rules(&self) -> Result<Vec<Rule>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let rules = triage_rules::table
                .order(triage_rules::id.asc())
                .load::<Rule>(&mut conn)
                .await?;
            Ok(rules)
        })
        .await
    }

    async fn create_rule(&self, rule: NewRule) -> Result<Rule, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            diesel::insert_into(triage_rules::table)
                .values(&rule)
                .get_result::<Rule>(&mut conn)
                .await
                .map_err(conflict_or_query)
        })
        .await
    }

    async fn toggle_rule(&self, id: i64) -> Result<Option<Rule>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let rule = diesel::update(triage_rules::table.find(id))
                .set(triage_rules::is_active.eq(diesel::dsl::not(triage_rules::is_active)))
                .get_result::<Rule>(&mut conn)
                .await
                .optional()?;
            Ok(rule)
        })
        .await
    }

    async fn save_alert(&self, alert: NewAlert) -> Result<bool, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let inserted = diesel::insert_into(triage_alerts::table)
                .values(&alert)
                .on_conflict_do_nothing()
                .execute(&mut conn)
                .await?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn record_failure(&self, failure: NewActionFailure) -> Result<ActionFailure, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let row = diesel::insert_into(triage_action_failures::table)
                .values(&failure)
                .get_result::<ActionFailure>(&mut conn)
                .await?;
            Ok(row)
        })
        .await
    }

    async fn get_failure(&self, id: i64) -> Result<Option<ActionFailure>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let row = triage_action_failures::table
                .find(id)
                .first::<ActionFailure>(&mut conn)
                .await
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn apply_retry_outcome(
        &self,
        id: i64,
        outcome: RetryOutcome,
    ) -> Result<Option<ActionFailure>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let row = diesel::update(triage_action_failures::table.find(id))
                .set((
                    triage_action_failures::retry_count.eq(triage_action_failures::retry_count + 1),
                    triage_action_failures::last_retry_status.eq(outcome.status.as_str()),
                    triage_action_failures::last_retry_message.eq(Some(outcome.message.clone())),
                    triage_action_failures::last_retry_at.eq(Some(outcome.at)),
                    triage_action_failures::is_resolved.eq(outcome.is_resolved()),
                ))
                .get_result::<ActionFailure>(&mut conn)
                .await
                .optional()?;
            Ok(row)
        })
        .await
    }

    async fn append_audit(&self, entry: NewAuditEntry) -> Result<(), StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            diesel::insert_into(triage_audit_log::table)
                .values(&entry)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn record_delivery_metric(&self, metric: NewDeliveryMetric) -> Result<(), StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            diesel::insert_into(triage_delivery_metrics::table)
                .values(&metric)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
        .await
    }

    async fn activity_counts(&self, since: DateTime<Utc>) -> Result<ActivityCounts, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let events: i64 = triage_deliveries::table
                .filter(triage_deliveries::received_at.ge(since))
                .count()
                .get_result(&mut conn)
                .await?;
            let alerts: i64 = triage_alerts::table
                .filter(triage_alerts::created_at.ge(since))
                .count()
                .get_result(&mut conn)
                .await?;
            let failures: i64 = triage_action_failures::table
                .filter(triage_action_failures::occurred_at.ge(since))
                .count()
                .get_result(&mut conn)
                .await?;
            Ok(ActivityCounts {
                events,
                alerts,
                failures,
            })
        })
        .await
    }

    async fn activity_timestamps(
        &self,
        since: DateTime<Utc>,
    ) -> Result<ActivityTimestamps, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let events = triage_deliveries::table
                .filter(triage_deliveries::received_at.ge(since))
                .select(triage_deliveries::received_at)
                .load::<DateTime<Utc>>(&mut conn)
                .await?;
            let alerts = triage_alerts::table
                .filter(triage_alerts::created_at.ge(since))
                .select(triage_alerts::created_at)
                .load::<DateTime<Utc>>(&mut conn)
                .await?;
            let failures = triage_action_failures::table
                .filter(triage_action_failures::occurred_at.ge(since))
                .select(triage_action_failures::occurred_at)
                .load::<DateTime<Utc>>(&mut conn)
                .await?;
            Ok(ActivityTimestamps {
                events,
                alerts,
                failures,
            })
        })
        .await
    }

    async fn metric_samples(&self, since: DateTime<Utc>) -> Result<Vec<MetricSample>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let rows: Vec<(bool, i64)> = triage_delivery_metrics::table
                .filter(triage_delivery_metrics::recorded_at.ge(since))
                .select((
                    triage_delivery_metrics::success,
                    triage_delivery_metrics::processing_ms,
                ))
                .load(&mut conn)
                .await?;
            Ok(rows
                .into_iter()
                .map(|(success, processing_ms)| MetricSample {
                    success,
                    processing_ms,
                })
                .collect())
        })
        .await
    }

    async fn find_user(&self, username: &str) -> Result<Option<User>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let user = triage_users::table
                .filter(triage_users::username.eq(username))
                .first::<User>(&mut conn)
                .await
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            diesel::insert_into(triage_users::table)
                .values(&user)
                .get_result::<User>(&mut conn)
                .await
                .map_err(conflict_or_query)
        })
        .await
    }

    async fn set_user_active(&self, id: i64, active: bool) -> Result<Option<User>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let user = diesel::update(triage_users::table.find(id))
                .set((
                    triage_users::is_active.eq(active),
                    triage_users::updated_at.eq(Utc::now()),
                ))
                .get_result::<User>(&mut conn)
                .await
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn set_user_password(
        &self,
        id: i64,
        password_hash: String,
    ) -> Result<Option<User>, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let user = diesel::update(triage_users::table.find(id))
                .set((
                    triage_users::password_hash.eq(&password_hash),
                    triage_users::updated_at.eq(Utc::now()),
                ))
                .get_result::<User>(&mut conn)
                .await
                .optional()?;
            Ok(user)
        })
        .await
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        self.timed(async {
            let mut conn = self.conn().await?;
            let deleted = diesel::delete(triage_users::table.find(id))
                .execute(&mut conn)
                .await?;
            Ok(deleted > 0)
        })
        .await
    }
}
