//! Dead-letter inspection and requeue.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use messaging::{DeadLetter, MessageId, MessagingError};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct DeadLetterResponse {
    pub id: String,
    pub message_type: String,
    pub payload: serde_json::Value,
    pub attempts: u32,
    pub error: String,
    pub failed_at: String,
}

impl From<DeadLetter> for DeadLetterResponse {
    fn from(dead: DeadLetter) -> Self {
        Self {
            id: dead.envelope.id.to_string(),
            message_type: dead.envelope.message_type,
            payload: dead.envelope.payload,
            attempts: dead.envelope.attempts,
            error: dead.error,
            failed_at: dead.failed_at.to_rfc3339(),
        }
    }
}

/// GET /admin/dead-letters
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<DeadLetterResponse>>, ApiError> {
    let dead = state.queue.dead_letters().await?;
    Ok(Json(dead.into_iter().map(DeadLetterResponse::from).collect()))
}

/// POST /admin/dead-letters/{id}/requeue
#[tracing::instrument(skip(state))]
pub async fn requeue(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id: MessageId = id
        .parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid message ID: {id}")))?;

    state
        .queue
        .requeue_dead_letter(id)
        .await
        .map_err(|err| match err {
            MessagingError::MessageNotFound(_) => {
                ApiError::NotFound(format!("Dead letter not found: {id}"))
            }
            other => other.into(),
        })?;
    tracing::info!(message_id = %id, "dead letter requeued");
    Ok(StatusCode::ACCEPTED)
}
