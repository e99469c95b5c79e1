//! Password reset endpoints.

use std::sync::Arc;

use application::ResetPassword;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Deserialize;

use super::AppState;
use super::users::{AcceptedResponse, EmailRequest};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct ConfirmResetRequest {
    pub email: String,
    pub token: String,
    pub new_password: String,
}

/// POST /password-reset: queues a reset email.
///
/// Answers 202 whether or not the address has an account.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn request(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    state.users.request_password_reset(&req.email).await?;
    Ok(AcceptedResponse::accepted())
}

/// POST /password-reset/confirm
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConfirmResetRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .users
        .reset_password(ResetPassword {
            email: req.email,
            token: req.token,
            new_password: req.new_password,
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
