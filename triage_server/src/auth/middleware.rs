//! Bearer-token middleware for the operator API.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use super::{AuthError, AuthGate};
use crate::routes::error::ApiError;

/// The authenticated operator, inserted into request extensions.
#[derive(Debug, Clone)]
pub struct Actor(pub String);

pub async fn require_bearer(
    State(gate): State<Arc<AuthGate>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let claims = {
        let token = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or(AuthError::MissingToken)?;

        gate.tokens().verify(token).inspect_err(|e| {
            tracing::debug!("Rejected bearer token: {e}");
        })?
    };

    request.extensions_mut().insert(Actor(claims.sub));
    Ok(next.run(request).await)
}
