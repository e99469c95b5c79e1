//! API server entry point.

use std::sync::Arc;

use api::config::{Config, LogFormat};
use application::TracingMailer;
use common::{Clock, SystemClock};
use messaging::{InMemoryMessageQueue, MessageQueue, PostgresMessageQueue, WorkerPool};
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn build_queue(config: &Config, clock: Arc<dyn Clock>) -> Arc<dyn MessageQueue> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using in-memory queue");
        return Arc::new(
            InMemoryMessageQueue::new()
                .with_clock(clock)
                .with_visibility_timeout(config.visibility_timeout()),
        );
    };

    let pool = PgPoolOptions::new()
        .max_connections(
            u32::try_from(config.worker_concurrency)
                .unwrap_or(u32::MAX)
                .saturating_add(5),
        )
        .connect(url)
        .await
        .expect("failed to connect to PostgreSQL");
    let queue = PostgresMessageQueue::new(pool)
        .with_clock(clock)
        .with_visibility_timeout(config.visibility_timeout());
    queue
        .run_migrations()
        .await
        .expect("failed to run queue migrations");
    tracing::info!("using PostgreSQL queue");
    Arc::new(queue)
}

#[tokio::main]
async fn main() {
    // 1. Load configuration and initialize tracing
    let config = Config::from_env().expect("invalid configuration");
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    // 3. Create the queue and application state
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let queue = build_queue(&config, Arc::clone(&clock)).await;
    let (state, registry) = api::create_default_state(
        &config,
        Arc::clone(&queue),
        Arc::new(TracingMailer),
        Arc::clone(&clock),
        metrics_handle,
    )
    .expect("failed to build application state");

    // 4. Start notification workers
    let workers = WorkerPool::spawn(
        config.worker_concurrency,
        queue,
        Arc::new(registry),
        config.worker_config(),
        clock,
    );
    tracing::info!(workers = workers.size(), "notification workers started");

    // 5. Start server
    let app = api::create_app(state);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");

    // 6. Let in-flight messages settle
    workers.shutdown().await;
    tracing::info!("server shut down gracefully");
}
