//! Operator login.

use std::sync::Arc;

use sha2::{Digest, Sha256};

use super::lockout::{LockoutPolicy, LockoutState, LockoutStore};
use super::password;
use super::token::{IssuedToken, TokenIssuer};
use super::AuthError;
use crate::config::TriageConfig;
use crate::store::Store;

/// Static operator credentials, checked for names the user table does not know
/// or when the table cannot answer.
struct StaticOperator {
    username: String,
    password_digest: Vec<u8>,
}

impl StaticOperator {
    fn matches(&self, username: &str, password: &str) -> bool {
        let digest = Sha256::digest(password.as_bytes());
        self.username == username && self.password_digest.as_slice() == digest.as_slice()
    }
}

enum Verdict {
    Accept(String),
    Reject,
    Inactive,
}

pub struct AuthGate {
    store: Arc<dyn Store>,
    tokens: TokenIssuer,
    lockout: LockoutStore,
    fallback: Option<StaticOperator>,
}

impl AuthGate {
    pub fn new(store: Arc<dyn Store>, config: &TriageConfig) -> Self {
        let fallback = (config.admin_fallback_enabled && !config.admin_password.is_empty()).then(
            || StaticOperator {
                username: config.admin_username.clone(),
                password_digest: Sha256::digest(config.admin_password.as_bytes()).to_vec(),
            },
        );
        if config.admin_fallback_enabled && fallback.is_none() {
            tracing::warn!("TRIAGE_ADMIN_FALLBACK set without TRIAGE_ADMIN_PASSWORD -- fallback disabled");
        }

        Self {
            store,
            tokens: TokenIssuer::new(&config.jwt_secret, config.token_ttl),
            lockout: LockoutStore::new(LockoutPolicy {
                max_attempts: config.lockout_max_attempts.max(1),
                window: config.lockout_window,
                duration: config.lockout_duration,
            }),
            fallback,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    /// Check credentials and issue a token.
    ///
    /// A locked identity is refused before its credentials are looked at.
    /// Every other attempt is counted before verification and only handed
    /// back when it succeeds or never reaches a credential verdict.
    pub async fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        if !self.tokens.is_configured() {
            return Err(AuthError::NotConfigured);
        }
        let identity = username.trim();
        if identity.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidCredentials);
        }

        let reserved = match self.lockout.begin_attempt(identity) {
            Ok(state) => state,
            Err(retry_after) => {
                tracing::warn!(identity, "Login refused, identity locked");
                return Err(AuthError::Locked { retry_after });
            }
        };

        let verdict = match self.verify(identity, password).await {
            Ok(verdict) => verdict,
            Err(e) => {
                self.lockout.release(identity);
                return Err(e);
            }
        };

        match verdict {
            Verdict::Accept(subject) => {
                self.lockout.record_success(identity);
                tracing::info!(identity, "Operator logged in");
                self.tokens.issue(&subject)
            }
            Verdict::Inactive => {
                self.lockout.release(identity);
                tracing::warn!(identity, "Login refused, account disabled");
                Err(AuthError::Inactive)
            }
            Verdict::Reject => {
                crate::metrics::login_failed();
                match reserved {
                    LockoutState::Warning {
                        failures,
                        remaining,
                    } => tracing::warn!(identity, failures, remaining, "Login failed"),
                    state => tracing::warn!(identity, ?state, "Login failed"),
                }
                Err(AuthError::InvalidCredentials)
            }
        }
    }

    async fn verify(&self, identity: &str, password: &str) -> Result<Verdict, AuthError> {
        match self.store.find_user(identity).await {
            Ok(Some(user)) => {
                if !password::verify(password, &user.password_hash).await? {
                    return Ok(Verdict::Reject);
                }
                if !user.is_active {
                    return Ok(Verdict::Inactive);
                }
                Ok(Verdict::Accept(user.username))
            }
            Ok(None) => Ok(self.check_fallback(identity, password)),
            Err(e) if self.fallback.is_some() => {
                tracing::warn!("User lookup failed, trying static operator: {e}");
                Ok(self.check_fallback(identity, password))
            }
            Err(e) => Err(AuthError::Backend(e.to_string())),
        }
    }

    fn check_fallback(&self, identity: &str, password: &str) -> Verdict {
        match &self.fallback {
            Some(op) if op.matches(identity, password) => Verdict::Accept(op.username.clone()),
            _ => Verdict::Reject,
        }
    }
}
