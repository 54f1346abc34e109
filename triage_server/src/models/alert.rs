//! triage.alert: a suggestion that was emitted for a delivery.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::triage_alerts;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = triage_alerts)]
pub struct Alert {
    pub id: i64,
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub sender_login: String,
    pub rule_matched: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = triage_alerts)]
pub struct NewAlert {
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub sender_login: String,
    pub rule_matched: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}
