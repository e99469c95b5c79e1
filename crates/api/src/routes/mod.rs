//! HTTP route handlers and shared state.

pub mod admin;
pub mod health;
pub mod metrics;
pub mod password_reset;
pub mod users;

use std::sync::Arc;

use application::UserService;
use messaging::MessageQueue;
use metrics_exporter_prometheus::PrometheusHandle;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub users: UserService,
    pub queue: Arc<dyn MessageQueue>,
    pub metrics: PrometheusHandle,
}
