//! GitHub webhook handler: verify, store, evaluate rules, remediate.

use std::time::Instant;

use axum::body::Bytes;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use super::error::ApiError;
use super::TriageState;
use crate::dashboard::kpi;
use crate::models::alert::NewAlert;
use crate::models::delivery::NewDelivery;
use crate::models::failure::NewActionFailure;
use crate::models::payload::{WebhookPayload, UNKNOWN};
use crate::services::action_executor::ActionTarget;
use crate::services::rule_engine::{self, Suggestion};
use crate::services::{failure_service, github_service};

#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub ok: bool,
    pub message: String,
    pub event: String,
    pub suggested_actions: Vec<Suggestion>,
}

/// Delivery metadata taken from the request headers.
#[derive(Debug, Clone)]
pub struct DeliveryHeaders {
    pub delivery_id: String,
    pub event_type: String,
    pub signature: String,
}

impl DeliveryHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let delivery_id = get("x-github-delivery").unwrap_or_else(|| {
            let generated = format!("generated-{}", uuid::Uuid::new_v4());
            tracing::warn!(delivery_id = %generated, "Delivery id header missing, using synthetic id");
            generated
        });

        Self {
            delivery_id,
            event_type: get("x-github-event").unwrap_or_else(|| UNKNOWN.to_string()),
            signature: get("x-hub-signature-256").unwrap_or_default(),
        }
    }
}

/// Handle an incoming GitHub webhook.
///
/// Processing runs on its own task. If the client goes away the task keeps
/// going, but no new retry attempt is started.
pub async fn handle_webhook(state: TriageState, headers: HeaderMap, body: Bytes) -> Response {
    let cancel = CancellationToken::new();
    let guard = cancel.clone().drop_guard();

    let task = tokio::spawn(process_delivery(state, headers, body, cancel));
    let result = task.await;
    guard.disarm();

    match result {
        Ok(response) => response,
        Err(e) => ApiError::Internal(format!("delivery task failed: {e}")).into_response(),
    }
}

/// Ingest one delivery and record its metric on every exit path.
async fn process_delivery(
    state: TriageState,
    headers: HeaderMap,
    body: Bytes,
    cancel: CancellationToken,
) -> Response {
    let started = Instant::now();
    let delivery = DeliveryHeaders::from_headers(&headers);

    let result = ingest(&state, &delivery, &body, &cancel).await;

    let elapsed_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);
    kpi::record_delivery(
        state.store.as_ref(),
        &delivery.event_type,
        &delivery.delivery_id,
        result.is_ok(),
        elapsed_ms,
    )
    .await;

    match result {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn ingest(
    state: &TriageState,
    delivery: &DeliveryHeaders,
    body: &[u8],
    cancel: &CancellationToken,
) -> Result<WebhookResponse, ApiError> {
    if !github_service::validate_signature(
        &state.config.github_webhook_secret,
        body,
        &delivery.signature,
    ) {
        tracing::warn!(delivery_id = %delivery.delivery_id, "Webhook signature validation failed");
        return Err(ApiError::Unauthorized("invalid signature".to_string()));
    }

    let raw: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON payload: {e}")))?;
    let payload = WebhookPayload::project(&raw);
    let event_type = delivery.event_type.as_str();
    let evaluated = rule_engine::is_evaluated(event_type);

    // Rules load before the delivery is written; a load failure stores nothing.
    let rules = if evaluated {
        state.store.active_rules().await?
    } else {
        Vec::new()
    };

    let fresh = state
        .store
        .save_delivery(NewDelivery {
            delivery_id: delivery.delivery_id.clone(),
            event_type: event_type.to_string(),
            action: payload.action(),
            repository_full_name: payload.repository_full_name(),
            sender_login: payload.sender_login(),
            raw_payload: raw,
            received_at: chrono::Utc::now(),
        })
        .await?;

    if !fresh {
        tracing::info!(delivery_id = %delivery.delivery_id, "Replayed delivery, only missing alerts are acted on");
    }

    if !evaluated {
        tracing::debug!("Ignoring webhook event: {}", event_type);
        return Ok(WebhookResponse {
            ok: true,
            message: format!("event {event_type} accepted"),
            event: event_type.to_string(),
            suggested_actions: Vec::new(),
        });
    }

    let suggestions = rule_engine::evaluate(event_type, &payload, &rules);

    let repository = payload.repository_full_name();
    let number = payload.target_number(event_type);
    let actionable = number > 0 && state.executor.is_configured();

    for suggestion in &suggestions {
        crate::metrics::suggestion_emitted(suggestion.kind.as_str());

        // An alert that already exists means its action was handled by an
        // earlier delivery of the same id.
        let inserted = state
            .store
            .save_alert(NewAlert {
                delivery_id: delivery.delivery_id.clone(),
                event_type: event_type.to_string(),
                action: payload.action(),
                repository_full_name: repository.clone(),
                sender_login: payload.sender_login(),
                rule_matched: suggestion.matched.clone(),
                suggestion_type: suggestion.kind.as_str().to_string(),
                suggestion_value: suggestion.value.clone(),
                reason: suggestion.reason.clone(),
                created_at: chrono::Utc::now(),
            })
            .await?;

        if !(inserted && actionable) {
            continue;
        }

        let target = ActionTarget {
            repository: &repository,
            number,
        };
        let (err, attempts) = state
            .executor
            .apply_with_retry(suggestion.kind, target, &suggestion.value, cancel)
            .await;

        match err {
            None => {
                crate::metrics::action_finished(suggestion.kind.as_str(), "applied");
                tracing::info!(
                    delivery_id = %delivery.delivery_id,
                    kind = suggestion.kind.as_str(),
                    value = %suggestion.value,
                    attempts,
                    "Action applied"
                );
            }
            Some(e) => {
                crate::metrics::action_finished(suggestion.kind.as_str(), "failed");
                failure_service::record_exhausted(
                    state.store.as_ref(),
                    NewActionFailure {
                        delivery_id: delivery.delivery_id.clone(),
                        event_type: event_type.to_string(),
                        action: payload.action(),
                        repository_full_name: repository.clone(),
                        suggestion_type: suggestion.kind.as_str().to_string(),
                        suggestion_value: suggestion.value.clone(),
                        error_message: e.to_string(),
                        attempt_count: i32::try_from(attempts.max(1)).unwrap_or(i32::MAX),
                        occurred_at: chrono::Utc::now(),
                    },
                )
                .await;
            }
        }
    }

    let message = if fresh {
        format!("{} suggestion(s)", suggestions.len())
    } else {
        format!("duplicate delivery, {} suggestion(s)", suggestions.len())
    };

    Ok(WebhookResponse {
        ok: true,
        message,
        event: event_type.to_string(),
        suggested_actions: suggestions,
    })
}
