use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::{triage_router, TriageState};
use crate::auth::password;
use crate::config::TriageConfig;
use crate::models::delivery::NewDelivery;
use crate::models::failure::NewActionFailure;
use crate::models::user::NewUser;
use crate::services::audit_service;
use crate::services::github_service::sign_payload;
use crate::store::{MemoryStore, Store};

struct Harness {
    store: Arc<MemoryStore>,
    state: TriageState,
    router: Router,
    github: MockServer,
}

impl Harness {
    async fn new() -> Self {
        let github = MockServer::start().await;
        let store = Arc::new(MemoryStore::new());
        let state =
            TriageState::new(store.clone(), TriageConfig::for_tests(&github.uri())).unwrap();
        Self {
            store,
            router: triage_router(state.clone()),
            state,
            github,
        }
    }

    async fn send(&self, req: Request<Body>) -> (StatusCode, Value) {
        let resp = self.router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    fn token(&self, subject: &str) -> String {
        self.state.auth.tokens().issue(subject).unwrap().token
    }

    async fn add_user(&self, username: &str, password: &str) -> i64 {
        self.store
            .create_user(NewUser {
                username: username.to_string(),
                password_hash: password::hash(password, 4).await.unwrap(),
                is_active: true,
            })
            .await
            .unwrap()
            .id
    }
}

fn issue_payload(number: i64, title: &str) -> Value {
    json!({
        "action": "opened",
        "repository": { "full_name": "octo/repo" },
        "sender": { "login": "alice" },
        "issue": { "number": number, "title": title, "body": "Seen in production." }
    })
}

fn webhook(event: &str, delivery: Option<&str>, body: Vec<u8>, secret: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhook/github")
        .header(header::CONTENT_TYPE, "application/json")
        .header("x-github-event", event)
        .header("x-hub-signature-256", sign_payload(secret, &body));
    if let Some(id) = delivery {
        builder = builder.header("x-github-delivery", id);
    }
    builder.body(Body::from(body)).unwrap()
}

fn signed(event: &str, delivery: &str, payload: &Value) -> Request<Body> {
    webhook(
        event,
        Some(delivery),
        serde_json::to_vec(payload).unwrap(),
        "test-secret",
    )
}

fn authed(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"));
    match body {
        Some(v) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(v.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn login(username: &str, password: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "username": username, "password": password }).to_string(),
        ))
        .unwrap()
}

async fn mount_github(server: &MockServer, number: i64, status: u16, expected: u64) {
    Mock::given(method("POST"))
        .and(path(format!("/repos/octo/repo/issues/{number}/labels")))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
    Mock::given(method("POST"))
        .and(path(format!("/repos/octo/repo/issues/{number}/comments")))
        .respond_with(ResponseTemplate::new(status))
        .expect(expected)
        .mount(server)
        .await;
}

async fn seed_failure(store: &MemoryStore, number: i64) -> i64 {
    store
        .save_delivery(NewDelivery {
            delivery_id: "d-seed".to_string(),
            event_type: "issues".to_string(),
            action: "opened".to_string(),
            repository_full_name: "octo/repo".to_string(),
            sender_login: "alice".to_string(),
            raw_payload: issue_payload(number, "urgent"),
            received_at: Utc::now(),
        })
        .await
        .unwrap();
    store
        .record_failure(NewActionFailure {
            delivery_id: "d-seed".to_string(),
            event_type: "issues".to_string(),
            action: "opened".to_string(),
            repository_full_name: "octo/repo".to_string(),
            suggestion_type: "label".to_string(),
            suggestion_value: "priority-high".to_string(),
            error_message: "GitHub API returned 500".to_string(),
            attempt_count: 3,
            occurred_at: Utc::now(),
        })
        .await
        .unwrap()
        .id
}

// ── Webhook ──

#[tokio::test]
async fn test_urgent_issue_end_to_end() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/repo/issues/42/labels"))
        .and(body_json(json!({ "labels": ["priority-high"] })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.github)
        .await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/repo/issues/42/comments"))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&h.github)
        .await;

    let (status, body) = h
        .send(signed("issues", "d-1", &issue_payload(42, "urgent: memory leak")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    assert_eq!(body["event"], "issues");
    assert_eq!(body["suggested_actions"][0]["type"], "label");
    assert_eq!(body["suggested_actions"][0]["value"], "priority-high");
    assert_eq!(body["suggested_actions"][0]["matched"], "urgent");

    let labels: Vec<_> = h
        .store
        .alerts()
        .await
        .into_iter()
        .filter(|a| a.suggestion_type == "label")
        .collect();
    assert_eq!(labels.len(), 1);
    assert_eq!(labels[0].suggestion_value, "priority-high");
    assert_eq!(labels[0].repository_full_name, "octo/repo");

    let metrics = h.store.delivery_metrics().await;
    assert_eq!(metrics.len(), 1);
    assert!(metrics[0].success);
    assert_eq!(metrics[0].delivery_id, "d-1");
    assert!(h.store.failures().await.is_empty());
}

#[tokio::test]
async fn test_bad_signature_is_rejected_but_measured() {
    let h = Harness::new().await;
    let body = serde_json::to_vec(&issue_payload(1, "urgent")).unwrap();

    let (status, _) = h
        .send(webhook("issues", Some("d-1"), body, "wrong-secret"))
        .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(h.store.deliveries().await.is_empty());
    assert!(h.store.alerts().await.is_empty());
    let metrics = h.store.delivery_metrics().await;
    assert_eq!(metrics.len(), 1);
    assert!(!metrics[0].success);
}

#[tokio::test]
async fn test_invalid_json_is_bad_request() {
    let h = Harness::new().await;
    let (status, body) = h
        .send(webhook("issues", Some("d-1"), b"{not json".to_vec(), "test-secret"))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["ok"], false);
    assert!(h.store.deliveries().await.is_empty());
}

#[tokio::test]
async fn test_replayed_delivery_does_not_repeat_actions() {
    let h = Harness::new().await;
    mount_github(&h.github, 7, 200, 1).await;
    let payload = issue_payload(7, "urgent");

    let (first, _) = h.send(signed("issues", "d-7", &payload)).await;
    let (second, body) = h.send(signed("issues", "d-7", &payload)).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(body["suggested_actions"].as_array().unwrap().len(), 2);
    assert_eq!(h.store.deliveries().await.len(), 1);
    assert_eq!(h.store.alerts().await.len(), 2);
    assert_eq!(h.store.delivery_metrics().await.len(), 2);
}

#[tokio::test]
async fn test_exhausted_retries_land_in_ledger() {
    let h = Harness::new().await;
    mount_github(&h.github, 9, 500, 3).await;

    let (status, body) = h
        .send(signed("issues", "d-9", &issue_payload(9, "urgent")))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["ok"], true);
    let failures = h.store.failures().await;
    assert_eq!(failures.len(), 2);
    assert!(failures.iter().all(|f| f.attempt_count == 3));
    assert!(failures.iter().all(|f| f.last_retry_status == "never"));
    assert!(h.store.delivery_metrics().await[0].success);
}

#[tokio::test]
async fn test_unresolved_target_only_alerts() {
    let h = Harness::new().await;
    mount_github(&h.github, 0, 200, 0).await;
    let payload = json!({
        "action": "opened",
        "repository": { "full_name": "octo/repo" },
        "issue": { "title": "urgent" }
    });

    let (status, _) = h.send(signed("issues", "d-0", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(h.store.alerts().await.len(), 2);
    assert!(h.store.failures().await.is_empty());
}

#[tokio::test]
async fn test_other_events_are_stored_without_suggestions() {
    let h = Harness::new().await;
    let (status, body) = h
        .send(signed("push", "d-push", &json!({ "ref": "refs/heads/main" })))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["suggested_actions"].as_array().unwrap().is_empty());
    let deliveries = h.store.deliveries().await;
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].repository_full_name, "unknown");
}

#[tokio::test]
async fn test_missing_delivery_id_is_generated() {
    let h = Harness::new().await;
    let body = serde_json::to_vec(&json!({ "zen": "Design for failure." })).unwrap();

    let (status, _) = h.send(webhook("ping", None, body, "test-secret")).await;

    assert_eq!(status, StatusCode::OK);
    let deliveries = h.store.deliveries().await;
    assert!(deliveries[0].delivery_id.starts_with("generated-"));
    assert_eq!(
        h.store.delivery_metrics().await[0].delivery_id,
        deliveries[0].delivery_id
    );
}

#[tokio::test]
async fn test_store_outage_fails_delivery() {
    let h = Harness::new().await;
    h.store.set_unavailable(true);

    let (status, body) = h
        .send(signed("issues", "d-1", &issue_payload(1, "urgent")))
        .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "internal server error");
}

#[tokio::test]
async fn test_redelivery_after_outage_runs_actions() {
    let h = Harness::new().await;
    mount_github(&h.github, 5, 200, 1).await;
    let payload = issue_payload(5, "urgent: memory leak");

    h.store.set_unavailable(true);
    let (status, _) = h.send(signed("issues", "d-5", &payload)).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    h.store.set_unavailable(false);
    assert!(h.store.deliveries().await.is_empty());
    let (status, body) = h.send(signed("issues", "d-5", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["suggested_actions"].as_array().unwrap().len(), 2);
    assert_eq!(h.store.alerts().await.len(), 2);
}

#[tokio::test]
async fn test_redelivery_completes_missing_alerts() {
    let h = Harness::new().await;
    mount_github(&h.github, 6, 200, 1).await;
    let payload = issue_payload(6, "urgent: memory leak");
    h.store
        .save_delivery(NewDelivery {
            delivery_id: "d-partial".to_string(),
            event_type: "issues".to_string(),
            action: "opened".to_string(),
            repository_full_name: "octo/repo".to_string(),
            sender_login: "alice".to_string(),
            raw_payload: payload.clone(),
            received_at: Utc::now(),
        })
        .await
        .unwrap();

    let (status, body) = h.send(signed("issues", "d-partial", &payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("duplicate delivery"));
    assert_eq!(h.store.alerts().await.len(), 2);
    assert!(h.store.failures().await.is_empty());
}

// ── Failures ──

#[tokio::test]
async fn test_manual_retry_resolves_failure() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .and(path("/repos/octo/repo/issues/12/labels"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&h.github)
        .await;
    let id = seed_failure(&h.store, 12).await;

    let (status, body) = h
        .send(authed(
            "POST",
            &format!("/api/failures/{id}/retry"),
            &h.token("alice"),
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["failure"]["retry_count"], 1);
    assert_eq!(body["failure"]["is_resolved"], true);

    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 1);
    assert_eq!(audit[0].actor, "alice");
    assert_eq!(audit[0].action, audit_service::FAILURE_RETRY);
    assert_eq!(audit[0].target_id.as_deref(), Some(id.to_string().as_str()));
}

#[tokio::test]
async fn test_manual_retry_remote_failure_is_bad_gateway() {
    let h = Harness::new().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&h.github)
        .await;
    let id = seed_failure(&h.store, 12).await;

    let (status, body) = h
        .send(authed(
            "POST",
            &format!("/api/failures/{id}/retry"),
            &h.token("alice"),
            None,
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    let row = h.store.get_failure(id).await.unwrap().unwrap();
    assert_eq!(row.retry_count, 1);
    assert_eq!(row.last_retry_status, "failed");
}

#[tokio::test]
async fn test_manual_retry_errors() {
    let h = Harness::new().await;
    let token = h.token("alice");

    let (missing, _) = h
        .send(authed("POST", "/api/failures/404/retry", &token, None))
        .await;
    let (invalid, _) = h
        .send(authed("POST", "/api/failures/abc/retry", &token, None))
        .await;

    assert_eq!(missing, StatusCode::NOT_FOUND);
    assert_eq!(invalid, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_operator_routes_require_bearer() {
    let h = Harness::new().await;
    let req = Request::builder()
        .method("POST")
        .uri("/api/failures/1/retry")
        .body(Body::empty())
        .unwrap();

    let (status, body) = h.send(req).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["ok"], false);

    let (garbage, _) = h
        .send(authed("GET", "/api/rules", "not-a-token", None))
        .await;
    assert_eq!(garbage, StatusCode::UNAUTHORIZED);
}

// ── Auth ──

#[tokio::test]
async fn test_login_issues_usable_token() {
    let h = Harness::new().await;
    h.add_user("alice", "s3cret-pass").await;

    let (status, body) = h.send(login("alice", "s3cret-pass")).await;
    assert_eq!(status, StatusCode::OK);
    let token = body["token"].as_str().unwrap().to_string();
    assert!(body["expires_at"].is_string());

    let (rules, _) = h.send(authed("GET", "/api/rules", &token, None)).await;
    assert_eq!(rules, StatusCode::OK);
}

#[tokio::test]
async fn test_login_lockout_rejects_correct_password() {
    let h = Harness::new().await;
    h.add_user("alice", "s3cret-pass").await;

    for _ in 0..3 {
        let (status, _) = h.send(login("alice", "wrong-pass")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let resp = h
        .router
        .clone()
        .oneshot(login("alice", "s3cret-pass"))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(resp.headers().contains_key(header::RETRY_AFTER));
}

// ── Metrics ──

#[tokio::test]
async fn test_metrics_endpoints() {
    let h = Harness::new().await;
    h.send(signed("push", "d-a", &json!({}))).await;
    h.send(signed("push", "d-b", &json!({}))).await;
    let token = h.token("alice");

    let (status, overview) = h
        .send(authed("GET", "/api/metrics/overview?window=1h", &token, None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(overview["window"], "1h");
    assert_eq!(overview["events"], 2);
    assert_eq!(overview["success_rate"], 100.0);

    let (status, series) = h
        .send(authed(
            "GET",
            "/api/metrics/timeseries?window=6h&interval=0",
            &token,
            None,
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(series["interval_minutes"], 1);
    let buckets = series["buckets"].as_array().unwrap();
    let events: i64 = buckets.iter().map(|b| b["events"].as_i64().unwrap()).sum();
    assert_eq!(events, 2);
}

// ── Rules & users ──

#[tokio::test]
async fn test_rules_api_is_audited() {
    let h = Harness::new().await;
    let token = h.token("alice");
    let rule = json!({
        "event_type": "issues",
        "keyword": "flaky",
        "suggestion_type": "label",
        "suggestion_value": "flaky-test"
    });

    let (created, body) = h
        .send(authed("POST", "/api/rules", &token, Some(rule.clone())))
        .await;
    assert_eq!(created, StatusCode::CREATED);
    let id = body["id"].as_i64().unwrap();

    let (dup, _) = h
        .send(authed("POST", "/api/rules", &token, Some(rule)))
        .await;
    assert_eq!(dup, StatusCode::CONFLICT);

    let (bad, _) = h
        .send(authed(
            "POST",
            "/api/rules",
            &token,
            Some(json!({ "keyword": "x", "suggestion_type": "assign", "suggestion_value": "y" })),
        ))
        .await;
    assert_eq!(bad, StatusCode::BAD_REQUEST);

    let (toggled, body) = h
        .send(authed("POST", &format!("/api/rules/{id}/toggle"), &token, None))
        .await;
    assert_eq!(toggled, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let actions: Vec<_> = h
        .store
        .audit_entries()
        .await
        .into_iter()
        .map(|e| e.action)
        .collect();
    assert_eq!(actions, [audit_service::RULE_CREATE, audit_service::RULE_TOGGLE]);
}

#[tokio::test]
async fn test_users_api_never_exposes_hashes() {
    let h = Harness::new().await;
    let token = h.token("admin");

    let (short, _) = h
        .send(authed(
            "POST",
            "/api/users",
            &token,
            Some(json!({ "username": "bob", "password": "short" })),
        ))
        .await;
    assert_eq!(short, StatusCode::BAD_REQUEST);

    let (created, body) = h
        .send(authed(
            "POST",
            "/api/users",
            &token,
            Some(json!({ "username": "bob", "password": "long-enough" })),
        ))
        .await;
    assert_eq!(created, StatusCode::CREATED);
    assert!(body.get("password_hash").is_none());
    let id = body["id"].as_i64().unwrap();

    let (disabled, body) = h
        .send(authed(
            "PATCH",
            &format!("/api/users/{id}"),
            &token,
            Some(json!({ "is_active": false })),
        ))
        .await;
    assert_eq!(disabled, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (changed, _) = h
        .send(authed(
            "POST",
            &format!("/api/users/{id}/password"),
            &token,
            Some(json!({ "password": "another-long-one" })),
        ))
        .await;
    assert_eq!(changed, StatusCode::NO_CONTENT);

    let (deleted, _) = h
        .send(authed("DELETE", &format!("/api/users/{id}"), &token, None))
        .await;
    assert_eq!(deleted, StatusCode::NO_CONTENT);
    let (gone, _) = h
        .send(authed("DELETE", &format!("/api/users/{id}"), &token, None))
        .await;
    assert_eq!(gone, StatusCode::NOT_FOUND);

    let audit = h.store.audit_entries().await;
    assert_eq!(audit.len(), 4);
    assert!(audit.iter().all(|e| e.actor == "admin"));
    for entry in &audit {
        let text = entry.payload.to_string();
        assert!(!text.contains("$2"));
        assert!(!text.contains("long-enough"));
    }
}

#[tokio::test]
async fn test_healthz() {
    let h = Harness::new().await;
    let resp = h
        .router
        .clone()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}
