//! triage.delivery: one inbound webhook occurrence, stored once per delivery id.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::triage_deliveries;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = triage_deliveries)]
pub struct Delivery {
    pub id: i64,
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub sender_login: String,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = triage_deliveries)]
pub struct NewDelivery {
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub sender_login: String,
    pub raw_payload: serde_json::Value,
    pub received_at: DateTime<Utc>,
}
