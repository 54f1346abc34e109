//! Triage server configuration, loaded from environment variables.

use std::time::Duration;

#[derive(Clone, Debug)]
pub struct TriageConfig {
    /// GitHub webhook secret for HMAC validation.
    pub github_webhook_secret: String,
    /// GitHub token for label/comment calls. Empty disables remote actions.
    pub github_token: String,
    /// GitHub REST API base URL.
    pub github_api_base: String,
    /// Timeout for each outbound GitHub call.
    pub github_timeout: Duration,
    /// Timeout for each store operation.
    pub store_timeout: Duration,
    /// HS256 signing secret for operator tokens.
    pub jwt_secret: String,
    /// Lifetime of issued operator tokens.
    pub token_ttl: Duration,
    /// Failed logins allowed inside the window before the identity is locked.
    pub lockout_max_attempts: u32,
    /// Rolling window in which failed logins accumulate.
    pub lockout_window: Duration,
    /// How long a locked identity stays locked.
    pub lockout_duration: Duration,
    /// bcrypt work factor for stored operator passwords.
    pub bcrypt_cost: u32,
    /// Accept the static operator credentials for unknown users or when the user
    /// table is unreachable.
    pub admin_fallback_enabled: bool,
    pub admin_username: String,
    pub admin_password: String,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl TriageConfig {
    pub fn from_env() -> Self {
        let github_webhook_secret = std::env::var("TRIAGE_WEBHOOK_SECRET").unwrap_or_default();
        let github_token = std::env::var("TRIAGE_GITHUB_TOKEN").unwrap_or_default();
        let github_api_base = std::env::var("TRIAGE_GITHUB_API_BASE")
            .unwrap_or_else(|_| "https://api.github.com".to_string());
        let jwt_secret = std::env::var("TRIAGE_JWT_SECRET").unwrap_or_default();
        let admin_username =
            std::env::var("TRIAGE_ADMIN_USERNAME").unwrap_or_else(|_| "admin".to_string());
        let admin_password = std::env::var("TRIAGE_ADMIN_PASSWORD").unwrap_or_default();

        if github_webhook_secret.is_empty() {
            tracing::warn!("TRIAGE_WEBHOOK_SECRET not set -- every webhook will be rejected");
        }
        if github_token.is_empty() {
            tracing::warn!("TRIAGE_GITHUB_TOKEN not set -- label/comment actions disabled");
        }
        if jwt_secret.is_empty() {
            tracing::warn!("TRIAGE_JWT_SECRET not set -- operator login disabled");
        }

        Self {
            github_webhook_secret,
            github_token,
            github_api_base,
            github_timeout: Duration::from_secs(env_or("TRIAGE_GITHUB_TIMEOUT_SECS", 5)),
            store_timeout: Duration::from_secs(env_or("TRIAGE_STORE_TIMEOUT_SECS", 5)),
            jwt_secret,
            token_ttl: Duration::from_secs(env_or("TRIAGE_TOKEN_TTL_SECS", 12 * 3600)),
            lockout_max_attempts: env_or("TRIAGE_LOCKOUT_MAX_ATTEMPTS", 5),
            lockout_window: Duration::from_secs(env_or("TRIAGE_LOCKOUT_WINDOW_SECS", 15 * 60)),
            lockout_duration: Duration::from_secs(env_or("TRIAGE_LOCKOUT_DURATION_SECS", 15 * 60)),
            bcrypt_cost: env_or("TRIAGE_BCRYPT_COST", bcrypt::DEFAULT_COST),
            admin_fallback_enabled: env_or("TRIAGE_ADMIN_FALLBACK", false),
            admin_username,
            admin_password,
        }
    }
}

#[cfg(test)]
impl TriageConfig {
    /// Configuration for tests: short timeouts, small lockout threshold.
    pub fn for_tests(github_api_base: &str) -> Self {
        Self {
            github_webhook_secret: "test-secret".to_string(),
            github_token: "test-token".to_string(),
            github_api_base: github_api_base.to_string(),
            github_timeout: Duration::from_secs(2),
            store_timeout: Duration::from_secs(2),
            jwt_secret: "test-jwt-secret".to_string(),
            token_ttl: Duration::from_secs(3600),
            lockout_max_attempts: 3,
            lockout_window: Duration::from_secs(60),
            lockout_duration: Duration::from_secs(60),
            bcrypt_cost: 4,
            admin_fallback_enabled: false,
            admin_username: "admin".to_string(),
            admin_password: "admin-password".to_string(),
        }
    }
}
