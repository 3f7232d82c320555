use blogpress::{
    config::AppConfig,
    db,
    services::{
        content::{ContentStore, PgContentStore},
        pdf::{fonts::FontResolver, PdfRenderer},
        queue::{JobQueue, RedisJobQueue},
        result_store::{RedisStore, ResultStore},
        worker::{process_next_job, ArtifactWorker},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting artifact worker");

    let config = AppConfig::from_env().expect("Failed to load configuration");

    if let Some(addr) = config.worker_metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .expect("Failed to install Prometheus exporter");
        tracing::info!(%addr, "Worker metrics listener started");
    }
    metrics::describe_histogram!(
        "artifact_generation_seconds",
        "Time to render and store one artifact"
    );
    metrics::describe_counter!("artifact_jobs_completed", "Total artifact jobs completed");
    metrics::describe_counter!("artifact_jobs_failed", "Total artifact jobs that failed");

    tracing::info!("Connecting to PostgreSQL");
    let db_pool = db::init_pool(&config.database_url, config.worker_concurrency as u32 + 1)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Connecting to Redis");
    let queue = RedisJobQueue::connect_with_retry(&config.redis_url, config.broker_connect_attempts)
        .await
        .expect("Job broker unreachable")
        .with_lease(config.queue_lease());
    tracing::info!(consumer_id = queue.consumer_id(), "Registered as queue consumer");
    let queue: Arc<dyn JobQueue> = Arc::new(queue);
    let results = RedisStore::new(&config.redis_url).expect("Failed to initialize result store");

    let fonts = FontResolver::new(config.font_dir.clone(), config.use_system_fonts).resolve();
    let content: Arc<dyn ContentStore> = Arc::new(PgContentStore::new(db_pool));
    let worker = ArtifactWorker::new(
        content,
        ResultStore::new(Arc::new(results)),
        PdfRenderer::new(fonts),
        config.artifact_ttl(),
        config.job_timeout(),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Keeps this process's lease alive and requeues jobs held by workers
    // whose lease lapsed. The first tick runs immediately.
    let lease_keeper = tokio::spawn(keep_lease(
        Arc::clone(&queue),
        config.queue_lease() / 3,
        shutdown_rx.clone(),
    ));

    let concurrency = config.worker_concurrency;
    let mut consumers = Vec::with_capacity(concurrency);
    for consumer in 0..concurrency {
        consumers.push(tokio::spawn(consume(
            consumer,
            Arc::clone(&queue),
            worker.clone(),
            config.poll_interval(),
            shutdown_rx.clone(),
        )));
    }

    tracing::info!(concurrency, "Worker ready, starting job processing loop");

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    tracing::info!("Shutdown requested, finishing in-flight jobs");
    let _ = shutdown_tx.send(true);

    for handle in consumers {
        if let Err(e) = handle.await {
            tracing::error!(error = %e, "Consumer task ended abnormally");
        }
    }
    if let Err(e) = lease_keeper.await {
        tracing::error!(error = %e, "Lease task ended abnormally");
    }
    tracing::info!("Worker stopped");
}

/// One consumer loop. A job in progress always runs to completion; the
/// shutdown flag is only checked between jobs.
async fn consume(
    consumer: usize,
    queue: Arc<dyn JobQueue>,
    worker: ArtifactWorker,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    while !*shutdown.borrow() {
        let idle = match process_next_job(queue.as_ref(), &worker).await {
            Ok(true) => {
                tracing::debug!(consumer, "Job processed, checking for next job");
                false
            }
            Ok(false) => {
                tracing::trace!(consumer, "No jobs available, sleeping");
                true
            }
            Err(e) => {
                tracing::error!(consumer, error = %e, "Error processing job, will retry");
                true
            }
        };

        if idle {
            tokio::select! {
                _ = sleep(poll_interval) => {}
                _ = shutdown.changed() => {}
            }
        }
    }
}

/// Heartbeat and dead-consumer recovery, until shutdown.
async fn keep_lease(
    queue: Arc<dyn JobQueue>,
    every: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    while !*shutdown.borrow() {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => continue,
        }

        if let Err(e) = queue.heartbeat().await {
            tracing::error!(error = %e, "Failed to renew queue lease");
        }
        match queue.recover_in_flight().await {
            Ok(0) => {}
            Ok(recovered) => tracing::warn!(recovered, "Requeued jobs from expired consumers"),
            Err(e) => tracing::error!(error = %e, "Failed to recover in-flight jobs"),
        }
    }
}
