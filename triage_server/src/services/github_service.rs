//! GitHub integration: webhook validation, issue labels and comments.

use std::time::Duration;

use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::models::payload::UNKNOWN;
use crate::services::action_executor::ActionError;

type HmacSha256 = Hmac<Sha256>;

const API_VERSION: &str = "2022-11-28";

/// Validate a GitHub webhook signature (X-Hub-Signature-256).
///
/// The header must be `sha256=<hex>`. A missing secret or a malformed
/// header is rejected before any HMAC is computed. The digest comparison is
/// constant-time.
pub fn validate_signature(secret: &str, payload: &[u8], signature: &str) -> bool {
    if secret.is_empty() {
        tracing::warn!("Webhook secret not configured, rejecting delivery");
        return false;
    }

    let Some(sig) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let sig_bytes = match hex::decode(sig) {
        Ok(b) => b,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(m) => m,
        Err(_) => return false,
    };
    mac.update(payload);

    mac.verify_slice(&sig_bytes).is_ok()
}

/// Header value GitHub would send for `payload` signed with `secret`.
#[cfg(test)]
pub fn sign_payload(secret: &str, payload: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(payload);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Authenticated client for the issue label/comment endpoints.
#[derive(Clone)]
pub struct GithubClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl GithubClient {
    pub fn new(api_base: &str, token: &str, timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("webhook-triage/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    /// Whether a bearer token is configured.
    pub fn has_token(&self) -> bool {
        !self.token.is_empty()
    }

    /// Add a label to an issue or pull request.
    pub async fn add_label(&self, repo: &str, number: i64, label: &str) -> Result<(), ActionError> {
        self.check_target(repo, number, label)?;
        let url = format!("{}/repos/{repo}/issues/{number}/labels", self.api_base);
        self.post(&url, serde_json::json!({ "labels": [label] }))
            .await
    }

    /// Post a comment on an issue or pull request.
    pub async fn add_comment(&self, repo: &str, number: i64, body: &str) -> Result<(), ActionError> {
        self.check_target(repo, number, body)?;
        let url = format!("{}/repos/{repo}/issues/{number}/comments", self.api_base);
        self.post(&url, serde_json::json!({ "body": body })).await
    }

    fn check_target(&self, repo: &str, number: i64, value: &str) -> Result<(), ActionError> {
        if repo.trim().is_empty() || repo == UNKNOWN {
            return Err(ActionError::UnresolvedRepository);
        }
        if number <= 0 {
            return Err(ActionError::InvalidTarget(number));
        }
        if value.trim().is_empty() {
            return Err(ActionError::EmptyValue);
        }
        if !self.has_token() {
            return Err(ActionError::MissingToken);
        }
        Ok(())
    }

    async fn post(&self, url: &str, body: serde_json::Value) -> Result<(), ActionError> {
        let resp = self
            .http
            .post(url)
            .header("Authorization", format!("Bearer {}", self.token))
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(|e| ActionError::Transport(e.to_string()))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            tracing::warn!("GitHub call failed: {} {}", status, text);
            return Err(ActionError::Status { status, body: text });
        }

        Ok(())
    }
}
