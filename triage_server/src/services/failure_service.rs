//! Failure ledger: actions that exhausted their retries, and manual retry.

use serde::Serialize;
use thiserror::Error;

use crate::models::failure::{ActionFailure, NewActionFailure, RetryOutcome, RetryStatus};
use crate::models::payload::WebhookPayload;
use crate::models::rule::{SuggestionKind, UnsupportedSuggestion};
use crate::services::action_executor::{ActionExecutor, ActionTarget};
use crate::services::audit_service;
use crate::store::{Store, StoreError};

#[derive(Debug, Error)]
pub enum RetryFailureError {
    #[error("action failure {0} not found")]
    NotFound(i64),

    /// The failure references a delivery that is no longer stored.
    #[error("payload for delivery {0} not found")]
    PayloadMissing(String),

    #[error(transparent)]
    Unsupported(#[from] UnsupportedSuggestion),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of one manual retry.
#[derive(Debug, Clone, Serialize)]
pub struct RetryReport {
    pub success: bool,
    pub message: String,
    /// The remote side rejected or could not be reached.
    #[serde(skip)]
    pub remote_failure: bool,
    pub failure: ActionFailure,
}

/// Write an exhausted action to the ledger. Best-effort: a store failure is
/// logged and the delivery carries on.
pub async fn record_exhausted(store: &dyn Store, failure: NewActionFailure) -> Option<ActionFailure> {
    let delivery_id = failure.delivery_id.clone();
    match store.record_failure(failure).await {
        Ok(row) => {
            tracing::warn!(
                failure_id = row.id,
                delivery_id = %row.delivery_id,
                attempts = row.attempt_count,
                "Action failed, recorded in failure ledger"
            );
            Some(row)
        }
        Err(e) => {
            tracing::error!(delivery_id = %delivery_id, "Failed to record action failure: {e}");
            None
        }
    }
}

/// Re-run a recorded action exactly once and store the outcome.
pub async fn retry_failure(
    store: &dyn Store,
    executor: &ActionExecutor,
    id: i64,
    actor: &str,
) -> Result<RetryReport, RetryFailureError> {
    let failure = store
        .get_failure(id)
        .await?
        .ok_or(RetryFailureError::NotFound(id))?;

    let kind: SuggestionKind = failure.suggestion_type.parse()?;

    let raw = store
        .delivery_payload(&failure.delivery_id)
        .await?
        .ok_or_else(|| RetryFailureError::PayloadMissing(failure.delivery_id.clone()))?;
    let payload = WebhookPayload::project(&raw);

    let target = ActionTarget {
        repository: &failure.repository_full_name,
        number: payload.target_number(&failure.event_type),
    };

    let result = executor
        .apply_once(kind, target, &failure.suggestion_value)
        .await;

    let (status, message, remote_failure) = match &result {
        Ok(()) => (RetryStatus::Success, "action applied".to_string(), false),
        Err(e) => (RetryStatus::Failed, e.to_string(), e.is_retryable()),
    };

    let updated = store
        .apply_retry_outcome(
            id,
            RetryOutcome {
                status,
                message: message.clone(),
                at: chrono::Utc::now(),
            },
        )
        .await?
        .ok_or(RetryFailureError::NotFound(id))?;

    tracing::info!(
        failure_id = id,
        actor,
        status = status.as_str(),
        retry_count = updated.retry_count,
        "Manual retry finished"
    );

    audit_service::record(
        store,
        actor,
        audit_service::FAILURE_RETRY,
        "action_failure",
        Some(id.to_string()),
        serde_json::json!({
            "delivery_id": updated.delivery_id,
            "suggestion_type": updated.suggestion_type,
            "suggestion_value": updated.suggestion_value,
            "status": status.as_str(),
            "message": message,
        }),
    )
    .await;

    Ok(RetryReport {
        success: result.is_ok(),
        message,
        remote_failure,
        failure: updated,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::delivery::NewDelivery;
    use crate::services::action_executor::RetryPolicy;
    use crate::services::github_service::GithubClient;
    use crate::store::MemoryStore;
    use chrono::Utc;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn executor(base: &str) -> ActionExecutor {
        let github = GithubClient::new(base, "token", Duration::from_secs(2)).unwrap();
        ActionExecutor::new(github, RetryPolicy::default())
    }

    async fn seed(store: &MemoryStore, suggestion_type: &str, with_payload: bool) -> ActionFailure {
        if with_payload {
            store
                .save_delivery(NewDelivery {
                    delivery_id: "d-1".to_string(),
                    event_type: "issues".to_string(),
                    action: "opened".to_string(),
                    repository_full_name: "octo/repo".to_string(),
                    sender_login: "alice".to_string(),
                    raw_payload: json!({ "issue": { "number": 12, "title": "urgent" } }),
                    received_at: Utc::now(),
                })
                .await
                .unwrap();
        }
        record_exhausted(
            store,
            NewActionFailure {
                delivery_id: "d-1".to_string(),
                event_type: "issues".to_string(),
                action: "opened".to_string(),
                repository_full_name: "octo/repo".to_string(),
                suggestion_type: suggestion_type.to_string(),
                suggestion_value: "priority-high".to_string(),
                error_message: "GitHub API returned 500".to_string(),
                attempt_count: 3,
                occurred_at: Utc::now(),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_successful_retry_resolves_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repos/octo/repo/issues/12/labels"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let failure = seed(&store, "label", true).await;

        let report = retry_failure(&store, &executor(&server.uri()), failure.id, "alice")
            .await
            .unwrap();

        assert!(report.success);
        assert_eq!(report.failure.retry_count, 1);
        assert_eq!(report.failure.last_retry_status, "success");
        assert!(report.failure.is_resolved);

        let audit = store.audit_entries().await;
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].actor, "alice");
        assert_eq!(audit[0].action, audit_service::FAILURE_RETRY);
        assert_eq!(audit[0].payload["status"], "success");
    }

    #[tokio::test]
    async fn test_remote_failure_is_recorded_once() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let store = MemoryStore::new();
        let failure = seed(&store, "label", true).await;

        let report = retry_failure(&store, &executor(&server.uri()), failure.id, "alice")
            .await
            .unwrap();

        assert!(!report.success);
        assert!(report.remote_failure);
        assert_eq!(report.failure.last_retry_status, "failed");
        assert!(!report.failure.is_resolved);
        assert_eq!(report.failure.attempt_count, 3);
    }

    #[tokio::test]
    async fn test_missing_failure_is_not_found() {
        let store = MemoryStore::new();
        let err = retry_failure(&store, &executor("http://127.0.0.1:9"), 42, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RetryFailureError::NotFound(42)));
    }

    #[tokio::test]
    async fn test_missing_payload_leaves_ledger_untouched() {
        let store = MemoryStore::new();
        let failure = seed(&store, "label", false).await;

        let err = retry_failure(&store, &executor("http://127.0.0.1:9"), failure.id, "alice")
            .await
            .unwrap_err();

        assert!(matches!(err, RetryFailureError::PayloadMissing(_)));
        let row = store.get_failure(failure.id).await.unwrap().unwrap();
        assert_eq!(row.retry_count, 0);
        assert!(store.audit_entries().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_type_rejected() {
        let store = MemoryStore::new();
        let failure = seed(&store, "assign", true).await;

        let err = retry_failure(&store, &executor("http://127.0.0.1:9"), failure.id, "alice")
            .await
            .unwrap_err();
        assert!(matches!(err, RetryFailureError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_record_exhausted_is_best_effort() {
        let store = MemoryStore::new();
        store.set_unavailable(true);

        let recorded = record_exhausted(
            &store,
            NewActionFailure {
                delivery_id: "d-9".to_string(),
                event_type: "issues".to_string(),
                action: "opened".to_string(),
                repository_full_name: "octo/repo".to_string(),
                suggestion_type: "comment".to_string(),
                suggestion_value: "hello".to_string(),
                error_message: "timeout".to_string(),
                attempt_count: 3,
                occurred_at: Utc::now(),
            },
        )
        .await;

        assert!(recorded.is_none());
    }
}
