//! Audit trail for privileged operations.

use crate::models::audit::NewAuditEntry;
use crate::store::Store;

pub const RULE_CREATE: &str = "rule.create";
pub const RULE_TOGGLE: &str = "rule.toggle";
pub const FAILURE_RETRY: &str = "failure.retry";
pub const USER_CREATE: &str = "user.create";
pub const USER_UPDATE: &str = "user.update";
pub const USER_DELETE: &str = "user.delete";
pub const USER_PASSWORD: &str = "user.password";

/// Append an audit entry. Best-effort: a store failure is logged and
/// swallowed so the audited operation itself still succeeds.
pub async fn record(
    store: &dyn Store,
    actor: &str,
    action: &str,
    target: &str,
    target_id: Option<String>,
    payload: serde_json::Value,
) {
    let entry = NewAuditEntry {
        actor: actor.to_string(),
        action: action.to_string(),
        target: target.to_string(),
        target_id: target_id.clone(),
        payload,
        created_at: chrono::Utc::now(),
    };

    if let Err(e) = store.append_audit(entry).await {
        tracing::warn!(
            actor,
            action,
            target,
            target_id = target_id.as_deref().unwrap_or_default(),
            "Failed to write audit entry: {e}"
        );
    }
}
