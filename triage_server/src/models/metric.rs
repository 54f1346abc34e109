//! triage.delivery_metric: outcome and latency of one handled delivery.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::triage_delivery_metrics;

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = triage_delivery_metrics)]
pub struct DeliveryMetric {
    pub id: i64,
    pub event_type: String,
    pub delivery_id: String,
    pub success: bool,
    pub processing_ms: i64,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = triage_delivery_metrics)]
pub struct NewDeliveryMetric {
    pub event_type: String,
    pub delivery_id: String,
    pub success: bool,
    pub processing_ms: i64,
    pub recorded_at: DateTime<Utc>,
}
