//! Prometheus metrics for triage server observability.
//!
//! These complement the per-delivery rows in `triage_delivery_metrics`,
//! which back the dashboard overview and timeseries.

use metrics::{counter, histogram};

/// Initialize metrics exporter (Prometheus).
pub fn init_metrics() {
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
    if let Err(e) = builder.install() {
        tracing::warn!("Failed to install Prometheus exporter: {}", e);
    }
}

/// Record a webhook received event.
pub fn webhook_received(event_type: &str) {
    counter!("triage_webhooks_received_total", "event" => event_type.to_string()).increment(1);
}

/// Record a suggestion emitted by the rule engine.
pub fn suggestion_emitted(kind: &str) {
    counter!("triage_suggestions_total", "type" => kind.to_string()).increment(1);
}

/// Record the final outcome of one remediation action.
pub fn action_finished(kind: &str, outcome: &str) {
    counter!(
        "triage_actions_total",
        "type" => kind.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record delivery handling duration.
pub fn delivery_duration(duration_ms: u64, success: bool) {
    histogram!(
        "triage_delivery_duration_ms",
        "success" => success.to_string()
    )
    .record(duration_ms as f64);
}

/// Record a failed operator login.
pub fn login_failed() {
    counter!("triage_login_failures_total").increment(1);
}

/// Record an identity being locked out.
pub fn lockout_engaged() {
    counter!("triage_lockouts_total").increment(1);
}
