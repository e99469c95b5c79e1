//! API error types with HTTP response mapping.

use application::ApplicationError;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use domain::ErrorCategory;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Use case failure.
    #[error(transparent)]
    App(#[from] ApplicationError),
    /// Resource not found.
    #[error("{0}")]
    NotFound(String),
    /// Bad request from the client.
    #[error("{0}")]
    BadRequest(String),
    /// Internal server error.
    #[error("{0}")]
    Internal(String),
}

impl From<messaging::MessagingError> for ApiError {
    fn from(err: messaging::MessagingError) -> Self {
        ApiError::App(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let retry_after = match &self {
            ApiError::App(err) => err.retry_after_secs(),
            _ => None,
        };

        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::App(err) => application_error_to_response(err),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg)
            }
        };

        let body = serde_json::json!({ "error": message, "code": code });
        let mut response = (status, axum::Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

fn application_error_to_response(err: ApplicationError) -> (StatusCode, &'static str, String) {
    if let Some(user_err) = err.user_error() {
        let status = match user_err.category() {
            ErrorCategory::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            ErrorCategory::Uniqueness => StatusCode::CONFLICT,
            ErrorCategory::AccountSecurity => StatusCode::LOCKED,
        };
        return (status, user_err.code(), err.to_string());
    }

    match &err {
        ApplicationError::Validation(_) => {
            (StatusCode::UNPROCESSABLE_ENTITY, "validation_failed", err.to_string())
        }
        ApplicationError::UserNotFound(_) => (StatusCode::NOT_FOUND, "user_not_found", err.to_string()),
        ApplicationError::InvalidToken => (StatusCode::BAD_REQUEST, "invalid_token", err.to_string()),
        ApplicationError::InvalidCredentials => {
            (StatusCode::UNAUTHORIZED, "invalid_credentials", err.to_string())
        }
        ApplicationError::NotActivated => (StatusCode::FORBIDDEN, "not_activated", err.to_string()),
        ApplicationError::Conflict => (StatusCode::CONFLICT, "conflict", err.to_string()),
        _ => {
            tracing::error!(error = %err, "internal server error");
            (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", err.to_string())
        }
    }
}
