//! REST API for operators: login, failures, metrics, rules and users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use crate::auth::password;
use crate::dashboard::kpi::{self, Bucket, Overview, Window};
use crate::models::rule::{NewRule, Rule, SuggestionKind};
use crate::models::user::{NewUser, User};
use crate::services::audit_service;
use crate::store::Store;

// ── Auth ──

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

// ── Metrics ──

#[derive(Debug, Default, Deserialize)]
pub struct MetricsQuery {
    pub window: Option<String>,
    pub interval: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OverviewJson {
    pub window: &'static str,
    pub since: DateTime<Utc>,
    #[serde(flatten)]
    pub overview: Overview,
}

#[derive(Debug, Serialize)]
pub struct TimeseriesJson {
    pub window: &'static str,
    pub interval_minutes: i64,
    pub buckets: Vec<Bucket>,
}

pub async fn metrics_overview(
    store: &dyn Store,
    query: &MetricsQuery,
) -> Result<OverviewJson, ApiError> {
    let window = Window::parse(query.window.as_deref());
    let since = window.since(Utc::now());
    let overview = kpi::overview(store, since).await?;
    Ok(OverviewJson {
        window: window.as_str(),
        since,
        overview,
    })
}

pub async fn metrics_timeseries(
    store: &dyn Store,
    query: &MetricsQuery,
) -> Result<TimeseriesJson, ApiError> {
    let window = Window::parse(query.window.as_deref());
    let interval = kpi::clamp_interval(query.interval);
    let now = Utc::now();
    let buckets = kpi::timeseries(store, window.since(now), now, interval).await?;
    Ok(TimeseriesJson {
        window: window.as_str(),
        interval_minutes: interval,
        buckets,
    })
}

// ── Rules ──

#[derive(Debug, Deserialize)]
pub struct CreateRuleRequest {
    #[serde(default)]
    pub event_type: String,
    pub keyword: String,
    pub suggestion_type: String,
    pub suggestion_value: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

pub async fn create_rule(
    store: &dyn Store,
    actor: &str,
    req: CreateRuleRequest,
) -> Result<Rule, ApiError> {
    let keyword = req.keyword.trim();
    if keyword.is_empty() {
        return Err(ApiError::BadRequest("keyword must not be empty".to_string()));
    }
    let kind = req
        .suggestion_type
        .parse::<SuggestionKind>()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    if req.suggestion_value.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "suggestion_value must not be empty".to_string(),
        ));
    }

    let rule = store
        .create_rule(NewRule {
            event_type: req.event_type.trim().to_string(),
            keyword: keyword.to_string(),
            suggestion_type: kind.as_str().to_string(),
            suggestion_value: req.suggestion_value,
            reason: req.reason,
            is_active: req.is_active,
        })
        .await?;

    audit_service::record(
        store,
        actor,
        audit_service::RULE_CREATE,
        "rule",
        Some(rule.id.to_string()),
        serde_json::json!({
            "event_type": rule.event_type,
            "keyword": rule.keyword,
            "suggestion_type": rule.suggestion_type,
            "suggestion_value": rule.suggestion_value,
            "is_active": rule.is_active,
        }),
    )
    .await;

    Ok(rule)
}

pub async fn toggle_rule(store: &dyn Store, actor: &str, id: i64) -> Result<Rule, ApiError> {
    let rule = store
        .toggle_rule(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("rule {id} not found")))?;

    audit_service::record(
        store,
        actor,
        audit_service::RULE_TOGGLE,
        "rule",
        Some(id.to_string()),
        serde_json::json!({ "is_active": rule.is_active }),
    )
    .await;

    Ok(rule)
}

// ── Users ──

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub password: String,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub is_active: bool,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub password: String,
}

fn check_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < password::MIN_PASSWORD_LEN {
        return Err(ApiError::BadRequest(format!(
            "password must be at least {} characters",
            password::MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

pub async fn create_user(
    store: &dyn Store,
    bcrypt_cost: u32,
    actor: &str,
    req: CreateUserRequest,
) -> Result<User, ApiError> {
    let username = req.username.trim();
    if username.is_empty() {
        return Err(ApiError::BadRequest("username must not be empty".to_string()));
    }
    check_password(&req.password)?;

    let password_hash = password::hash(&req.password, bcrypt_cost).await?;
    let user = store
        .create_user(NewUser {
            username: username.to_string(),
            password_hash,
            is_active: req.is_active,
        })
        .await?;

    audit_service::record(
        store,
        actor,
        audit_service::USER_CREATE,
        "user",
        Some(user.id.to_string()),
        serde_json::json!({ "username": user.username, "is_active": user.is_active }),
    )
    .await;

    Ok(user)
}

pub async fn update_user(
    store: &dyn Store,
    actor: &str,
    id: i64,
    req: UpdateUserRequest,
) -> Result<User, ApiError> {
    let user = store
        .set_user_active(id, req.is_active)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;

    audit_service::record(
        store,
        actor,
        audit_service::USER_UPDATE,
        "user",
        Some(id.to_string()),
        serde_json::json!({ "username": user.username, "is_active": user.is_active }),
    )
    .await;

    Ok(user)
}

pub async fn delete_user(store: &dyn Store, actor: &str, id: i64) -> Result<(), ApiError> {
    if !store.delete_user(id).await? {
        return Err(ApiError::NotFound(format!("user {id} not found")));
    }

    audit_service::record(
        store,
        actor,
        audit_service::USER_DELETE,
        "user",
        Some(id.to_string()),
        serde_json::json!({}),
    )
    .await;

    Ok(())
}

pub async fn change_password(
    store: &dyn Store,
    bcrypt_cost: u32,
    actor: &str,
    id: i64,
    req: ChangePasswordRequest,
) -> Result<(), ApiError> {
    check_password(&req.password)?;
    let password_hash = password::hash(&req.password, bcrypt_cost).await?;

    let user = store
        .set_user_password(id, password_hash)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("user {id} not found")))?;

    audit_service::record(
        store,
        actor,
        audit_service::USER_PASSWORD,
        "user",
        Some(id.to_string()),
        serde_json::json!({ "username": user.username }),
    )
    .await;

    Ok(())
}
