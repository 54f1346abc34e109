//! HTTP error mapping.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use thiserror::Error;

use crate::auth::AuthError;
use crate::services::failure_service::RetryFailureError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Internal(String),
}

impl From<RetryFailureError> for ApiError {
    fn from(e: RetryFailureError) -> Self {
        match e {
            RetryFailureError::NotFound(_) => ApiError::NotFound(e.to_string()),
            RetryFailureError::PayloadMissing(_) => {
                tracing::error!("Failure ledger references a missing delivery: {e}");
                ApiError::NotFound(e.to_string())
            }
            RetryFailureError::Unsupported(_) => ApiError::BadRequest(e.to_string()),
            RetryFailureError::Store(inner) => ApiError::Store(inner),
        }
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Auth(e) => match e {
                AuthError::InvalidCredentials
                | AuthError::MissingToken
                | AuthError::InvalidToken
                | AuthError::TokenExpired
                | AuthError::InvalidAlgorithm => StatusCode::UNAUTHORIZED,
                AuthError::Inactive => StatusCode::FORBIDDEN,
                AuthError::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
                AuthError::NotConfigured => StatusCode::SERVICE_UNAVAILABLE,
                AuthError::Backend(_) | AuthError::Hash(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Store(StoreError::Conflict(_)) => StatusCode::CONFLICT,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!("Request failed: {self}");
            "internal server error".to_string()
        } else {
            self.to_string()
        };

        let mut response = (
            status,
            Json(serde_json::json!({ "ok": false, "error": message })),
        )
            .into_response();

        if let ApiError::Auth(AuthError::Locked { retry_after }) = &self {
            let secs = retry_after.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
