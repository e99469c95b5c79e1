//! HTTP API server with observability for the user notification backend.
//!
//! Provides REST endpoints for account registration, activation, login and
//! password reset, plus dead-letter administration, with structured logging
//! (tracing) and Prometheus metrics. Emails are queued by event subscribers
//! and sent by the worker pool started in `main`.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use application::{
    Argon2PasswordHasher, EventBus, InMemoryUserRepository, Mailer, NotificationDispatchHandler,
    UserNotificationSubscriber, UserService, UuidV4Generator,
};
use axum::Router;
use axum::routing::{get, post};
use common::Clock;
use domain::{DomainError, NotificationMessage, UserEvent};
use messaging::{HandlerRegistry, MessageQueue};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use routes::AppState;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(routes::health::check))
        .route("/metrics", get(routes::metrics::get))
        .route("/users", post(routes::users::register))
        .route(
            "/users/activation-email",
            post(routes::users::request_activation_email),
        )
        .route("/login", post(routes::users::login))
        .route("/users/{id}", get(routes::users::get))
        .route("/users/{id}/activate", post(routes::users::activate))
        .route("/password-reset", post(routes::password_reset::request))
        .route(
            "/password-reset/confirm",
            post(routes::password_reset::confirm),
        )
        .route("/admin/dead-letters", get(routes::admin::list))
        .route(
            "/admin/dead-letters/{id}/requeue",
            post(routes::admin::requeue),
        )
        .with_state(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the user service, event bus, and notification handler.
///
/// Returns the HTTP state and the registry the worker pool should consume
/// with. Users are kept in memory; the queue is whatever the caller passes.
pub fn create_default_state(
    config: &Config,
    queue: Arc<dyn MessageQueue>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    metrics: PrometheusHandle,
) -> Result<(Arc<AppState>, HandlerRegistry), DomainError> {
    let mut bus = EventBus::<UserEvent>::new();
    Arc::new(UserNotificationSubscriber::new(Arc::clone(&queue))).register(&mut bus);

    let hasher = Argon2PasswordHasher::with_params(
        config.argon2_memory_kib,
        config.argon2_iterations,
        config.argon2_parallelism,
    )?;

    let users = UserService::new(
        Arc::new(InMemoryUserRepository::new()),
        Arc::new(hasher),
        Arc::new(UuidV4Generator),
        Arc::new(bus),
        clock,
    )
    .with_activation_policy(config.activation_policy())
    .with_reset_policy(config.reset_policy())
    .with_max_failed_logins(config.max_failed_logins);

    let mut registry = HandlerRegistry::new();
    registry.register::<NotificationMessage, _>(NotificationDispatchHandler::new(mailer));

    let state = Arc::new(AppState {
        users,
        queue,
        metrics,
    });

    Ok((state, registry))
}
