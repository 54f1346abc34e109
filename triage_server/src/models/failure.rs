//! triage.action_failure: remediation action that exhausted its retries.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};

use crate::schema::triage_action_failures;

/// Outcome of the most recent manual retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetryStatus {
    Never,
    Success,
    Failed,
}

impl RetryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RetryStatus::Never => "never",
            RetryStatus::Success => "success",
            RetryStatus::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = triage_action_failures)]
pub struct ActionFailure {
    pub id: i64,
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub error_message: String,
    pub attempt_count: i32,
    pub retry_count: i32,
    pub last_retry_status: String,
    pub last_retry_message: Option<String>,
    pub last_retry_at: Option<DateTime<Utc>>,
    pub is_resolved: bool,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable, Deserialize)]
#[diesel(table_name = triage_action_failures)]
pub struct NewActionFailure {
    pub delivery_id: String,
    pub event_type: String,
    pub action: String,
    pub repository_full_name: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    pub error_message: String,
    pub attempt_count: i32,
    pub occurred_at: DateTime<Utc>,
}

/// Result of one manual retry, applied on top of `retry_count += 1`.
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    pub status: RetryStatus,
    pub message: String,
    pub at: DateTime<Utc>,
}

impl RetryOutcome {
    pub fn is_resolved(&self) -> bool {
        self.status == RetryStatus::Success
    }
}
