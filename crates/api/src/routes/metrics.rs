//! Prometheus metrics endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::AppState;

/// GET /metrics: returns Prometheus-formatted metrics.
pub async fn get(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if let Ok(pending) = state.queue.pending_count().await {
        metrics::gauge!("queue_pending_messages").set(pending as f64);
    }

    (
        StatusCode::OK,
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        state.metrics.render(),
    )
}
