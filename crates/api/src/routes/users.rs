//! Account registration, activation, and login endpoints.

use std::sync::Arc;

use application::RegisterUser;
use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::UserId;
use domain::User;
use serde::{Deserialize, Serialize};

use super::AppState;
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Deserialize)]
pub struct ActivateRequest {
    pub token: String,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub email: String,
    pub username: String,
    pub status: String,
    pub created_at: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id().to_string(),
            email: user.email().to_string(),
            username: user.username().to_string(),
            status: user.status().to_string(),
            created_at: user.created_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct AcceptedResponse {
    pub status: &'static str,
}

impl AcceptedResponse {
    pub(crate) fn accepted() -> (StatusCode, Json<Self>) {
        (StatusCode::ACCEPTED, Json(Self { status: "accepted" }))
    }
}

// -- Handlers --

/// POST /users: creates an account and queues its activation email.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .users
        .register(RegisterUser {
            email: req.email,
            username: req.username,
            password: req.password,
        })
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// POST /users/activation-email: resends the activation email.
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn request_activation_email(
    State(state): State<Arc<AppState>>,
    Json(req): Json<EmailRequest>,
) -> Result<(StatusCode, Json<AcceptedResponse>), ApiError> {
    state.users.request_activation_email(&req.email).await?;
    Ok(AcceptedResponse::accepted())
}

/// GET /users/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.get_user(parse_user_id(&id)?).await?;
    Ok(Json(UserResponse::from(&user)))
}

/// POST /users/{id}/activate
#[tracing::instrument(skip(state, req))]
pub async fn activate(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<ActivateRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state
        .users
        .activate(parse_user_id(&id)?, &req.token)
        .await?;
    Ok(Json(UserResponse::from(&user)))
}

/// POST /login
#[tracing::instrument(skip(state, req), fields(email = %req.email))]
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    let user = state.users.authenticate(&req.email, &req.password).await?;
    Ok(Json(UserResponse::from(&user)))
}

fn parse_user_id(id: &str) -> Result<UserId, ApiError> {
    id.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid user ID: {id}")))
}
