//! Operator authentication: bearer tokens, login with lockout.

pub mod lockout;
pub mod login;
pub mod middleware;
pub mod password;
pub mod token;

use std::time::Duration;

use thiserror::Error;

pub use lockout::{LockoutPolicy, LockoutState, LockoutStore};
pub use login::AuthGate;
pub use middleware::{require_bearer, Actor};
pub use token::{Claims, IssuedToken, TokenIssuer};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("account is disabled")]
    Inactive,

    #[error("too many failed logins, retry in {}s", .retry_after.as_secs().max(1))]
    Locked { retry_after: Duration },

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,

    #[error("token expired")]
    TokenExpired,

    #[error("token signed with an unexpected algorithm")]
    InvalidAlgorithm,

    #[error("operator authentication is not configured")]
    NotConfigured,

    #[error("user lookup failed: {0}")]
    Backend(String),

    #[error("password hashing failed: {0}")]
    Hash(String),
}
