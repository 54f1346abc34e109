//! bcrypt hashing, run off the async executor.

use super::AuthError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub async fn hash(password: &str, cost: u32) -> Result<String, AuthError> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// A malformed stored hash verifies as `false`.
pub async fn verify(password: &str, password_hash: &str) -> Result<bool, AuthError> {
    let password = password.to_string();
    let password_hash = password_hash.to_string();
    let result = tokio::task::spawn_blocking(move || bcrypt::verify(password, &password_hash))
        .await
        .map_err(|e| AuthError::Hash(e.to_string()))?;

    match result {
        Ok(ok) => Ok(ok),
        Err(e) => {
            tracing::warn!("Stored password hash is unreadable: {e}");
            Ok(false)
        }
    }
}
