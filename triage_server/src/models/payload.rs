//! Typed projections of the GitHub webhook payload.
//!
//! Only the fields the triage pipeline reads are modelled. Every field is
//! optional: GitHub omits or nulls many of them depending on the event.

use serde::Deserialize;

/// Placeholder used when the payload does not name a repository or sender.
pub const UNKNOWN: &str = "unknown";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub repository: Option<RepositoryRef>,
    #[serde(default)]
    pub sender: Option<Account>,
    #[serde(default)]
    pub issue: Option<Subject>,
    #[serde(default)]
    pub pull_request: Option<Subject>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RepositoryRef {
    #[serde(default)]
    pub full_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub login: Option<String>,
}

/// The issue or pull request a delivery is about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Subject {
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Subject {
    /// Title and body joined, lower-cased.
    pub fn corpus(&self) -> String {
        let title = self.title.as_deref().unwrap_or_default();
        let body = self.body.as_deref().unwrap_or_default();
        format!("{title}\n{body}").to_lowercase()
    }
}

impl WebhookPayload {
    /// Project a parsed JSON document. Shapes that do not fit the projection
    /// (e.g. a string where a number is expected) yield an empty projection.
    pub fn project(value: &serde_json::Value) -> Self {
        match Self::deserialize(value) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::debug!("Payload does not match webhook projection: {e}");
                Self::default()
            }
        }
    }

    /// The entity the rules and actions apply to, by event type.
    pub fn subject(&self, event_type: &str) -> Option<&Subject> {
        match event_type {
            "issues" => self.issue.as_ref(),
            "pull_request" => self.pull_request.as_ref(),
            _ => None,
        }
    }

    /// Issue or pull request number, or 0 when it cannot be resolved.
    pub fn target_number(&self, event_type: &str) -> i64 {
        self.subject(event_type)
            .and_then(|s| s.number)
            .filter(|n| *n > 0)
            .unwrap_or(0)
    }

    pub fn action(&self) -> String {
        self.action.clone().unwrap_or_default()
    }

    pub fn repository_full_name(&self) -> String {
        self.repository
            .as_ref()
            .and_then(|r| r.full_name.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    pub fn sender_login(&self) -> String {
        self.sender
            .as_ref()
            .and_then(|s| s.login.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| UNKNOWN.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn projects_issue_fields() {
        let payload = WebhookPayload::project(&json!({
            "action": "opened",
            "repository": { "full_name": "octo/repo" },
            "sender": { "login": "alice" },
            "issue": { "number": 42, "title": "Crash", "body": null }
        }));

        assert_eq!(payload.action(), "opened");
        assert_eq!(payload.repository_full_name(), "octo/repo");
        assert_eq!(payload.sender_login(), "alice");
        assert_eq!(payload.target_number("issues"), 42);
        assert_eq!(payload.subject("issues").unwrap().corpus(), "crash\n");
    }

    #[test]
    fn target_number_follows_event_type() {
        let payload = WebhookPayload::project(&json!({
            "issue": { "number": 7 },
            "pull_request": { "number": 9 }
        }));

        assert_eq!(payload.target_number("issues"), 7);
        assert_eq!(payload.target_number("pull_request"), 9);
        assert_eq!(payload.target_number("push"), 0);
    }

    #[test]
    fn missing_fields_fall_back_to_placeholders() {
        let payload = WebhookPayload::project(&json!({ "zen": "Keep it simple" }));

        assert_eq!(payload.repository_full_name(), UNKNOWN);
        assert_eq!(payload.sender_login(), UNKNOWN);
        assert_eq!(payload.action(), "");
        assert_eq!(payload.target_number("issues"), 0);
    }

    #[test]
    fn non_positive_number_is_unresolved() {
        let payload = WebhookPayload::project(&json!({ "issue": { "number": -3 } }));
        assert_eq!(payload.target_number("issues"), 0);
    }

    #[test]
    fn mistyped_payload_projects_to_empty() {
        let payload = WebhookPayload::project(&json!({ "issue": { "number": "seven" } }));
        assert!(payload.issue.is_none());
    }
}
