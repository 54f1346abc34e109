//! Triage server HTTP routes: webhook, operator API.

pub mod api;
pub mod error;
pub mod webhook;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware;
use axum::response::{Json, Response};
use axum::routing::{get, post};
use axum::{Extension, Router};
use tower_http::trace::TraceLayer;

use crate::auth::{require_bearer, Actor, AuthGate, IssuedToken};
use crate::config::TriageConfig;
use crate::models::payload::UNKNOWN;
use crate::models::rule::Rule;
use crate::models::user::User;
use crate::services::action_executor::{ActionExecutor, RetryPolicy};
use crate::services::failure_service::{self, RetryReport};
use crate::services::github_service::GithubClient;
use crate::store::Store;
use error::ApiError;

/// Shared state for route handlers.
#[derive(Clone)]
pub struct TriageState {
    pub store: Arc<dyn Store>,
    pub config: Arc<TriageConfig>,
    pub executor: Arc<ActionExecutor>,
    pub auth: Arc<AuthGate>,
}

impl TriageState {
    pub fn new(store: Arc<dyn Store>, config: TriageConfig) -> anyhow::Result<Self> {
        let github = GithubClient::new(
            &config.github_api_base,
            &config.github_token,
            config.github_timeout,
        )?;
        let auth = AuthGate::new(store.clone(), &config);
        Ok(Self {
            store,
            executor: Arc::new(ActionExecutor::new(github, RetryPolicy::default())),
            auth: Arc::new(auth),
            config: Arc::new(config),
        })
    }
}

/// Build the triage server's Axum router.
pub fn triage_router(state: TriageState) -> Router {
    let operator = Router::new()
        // Failure ledger
        .route("/api/failures/{id}/retry", post(retry_failure_handler))
        // Metrics API
        .route("/api/metrics/overview", get(metrics_overview_handler))
        .route("/api/metrics/timeseries", get(metrics_timeseries_handler))
        // Rules API
        .route("/api/rules", get(list_rules).post(create_rule_handler))
        .route("/api/rules/{id}/toggle", post(toggle_rule_handler))
        // Users API
        .route("/api/users", post(create_user_handler))
        .route(
            "/api/users/{id}",
            axum::routing::patch(update_user_handler).delete(delete_user_handler),
        )
        .route("/api/users/{id}/password", post(change_password_handler))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            require_bearer,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .route("/webhook/github", post(webhook_handler))
        .route("/api/auth/login", post(login_handler))
        .merge(operator)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}

// ── Webhook ──

async fn webhook_handler(
    State(state): State<TriageState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    crate::metrics::webhook_received(
        headers
            .get("x-github-event")
            .and_then(|v| v.to_str().ok())
            .unwrap_or(UNKNOWN),
    );

    webhook::handle_webhook(state, headers, body).await
}

// ── Auth ──

async fn login_handler(
    State(state): State<TriageState>,
    Json(req): Json<api::LoginRequest>,
) -> Result<Json<IssuedToken>, ApiError> {
    let issued = state.auth.login(&req.username, &req.password).await?;
    Ok(Json(issued))
}

// ── Failures ──

async fn retry_failure_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<(StatusCode, Json<RetryReport>), ApiError> {
    let report =
        failure_service::retry_failure(state.store.as_ref(), &state.executor, id, &actor).await?;
    let status = if report.remote_failure {
        StatusCode::BAD_GATEWAY
    } else {
        StatusCode::OK
    };
    Ok((status, Json(report)))
}

// ── Metrics API ──

async fn metrics_overview_handler(
    State(state): State<TriageState>,
    Query(query): Query<api::MetricsQuery>,
) -> Result<Json<api::OverviewJson>, ApiError> {
    api::metrics_overview(state.store.as_ref(), &query)
        .await
        .map(Json)
}

async fn metrics_timeseries_handler(
    State(state): State<TriageState>,
    Query(query): Query<api::MetricsQuery>,
) -> Result<Json<api::TimeseriesJson>, ApiError> {
    api::metrics_timeseries(state.store.as_ref(), &query)
        .await
        .map(Json)
}

// ── Rules API ──

async fn list_rules(State(state): State<TriageState>) -> Result<Json<Vec<Rule>>, ApiError> {
    Ok(Json(state.store.list_rules().await?))
}

async fn create_rule_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<api::CreateRuleRequest>,
) -> Result<(StatusCode, Json<Rule>), ApiError> {
    api::create_rule(state.store.as_ref(), &actor, req)
        .await
        .map(|r| (StatusCode::CREATED, Json(r)))
}

async fn toggle_rule_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<Json<Rule>, ApiError> {
    api::toggle_rule(state.store.as_ref(), &actor, id)
        .await
        .map(Json)
}

// ── Users API ──

async fn create_user_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Json(req): Json<api::CreateUserRequest>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    api::create_user(state.store.as_ref(), state.config.bcrypt_cost, &actor, req)
        .await
        .map(|u| (StatusCode::CREATED, Json(u)))
}

async fn update_user_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<api::UpdateUserRequest>,
) -> Result<Json<User>, ApiError> {
    api::update_user(state.store.as_ref(), &actor, id, req)
        .await
        .map(Json)
}

async fn delete_user_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    api::delete_user(state.store.as_ref(), &actor, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn change_password_handler(
    State(state): State<TriageState>,
    Extension(Actor(actor)): Extension<Actor>,
    Path(id): Path<i64>,
    Json(req): Json<api::ChangePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    api::change_password(state.store.as_ref(), state.config.bcrypt_cost, &actor, id, req).await?;
    Ok(StatusCode::NO_CONTENT)
}
