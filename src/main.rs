use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use blogpress::{
    app_state::AppState,
    config::AppConfig,
    db, routes,
    services::{
        content::PgContentStore,
        queue::RedisJobQueue,
        result_store::{RedisStore, ResultStore},
    },
};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing blogpress server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");
    let prometheus_handle = Arc::new(prometheus_handle);

    metrics::describe_counter!("artifact_jobs_total", "Total artifact jobs dispatched");
    metrics::describe_counter!("artifact_downloads_total", "Total artifacts claimed");
    metrics::describe_gauge!(
        "artifact_queue_depth",
        "Current number of pending jobs in the queue"
    );

    tracing::info!("Connecting to PostgreSQL database");
    let db_pool = db::init_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running database migrations");
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Connecting to Redis");
    let results = RedisStore::new(&config.redis_url).expect("Failed to initialize result store");
    let queue = RedisJobQueue::connect_with_retry(&config.redis_url, config.broker_connect_attempts)
        .await
        .expect("Job broker unreachable");

    let state = AppState::new(
        Arc::new(PgContentStore::new(db_pool)),
        ResultStore::new(Arc::new(results)),
        Arc::new(queue),
        config.surface_job_failures,
    );

    let app = routes::router(state, Some(prometheus_handle));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
