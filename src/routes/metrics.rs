use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::services::queue::JobQueue;

pub type MetricsState = (Arc<PrometheusHandle>, Arc<dyn JobQueue>);

/// Prometheus scrape endpoint. Refreshes the queue depth gauge first so
/// the server reports it even when no worker is running.
pub async fn prometheus_metrics(State((handle, queue)): State<MetricsState>) -> impl IntoResponse {
    if let Ok(depth) = queue.depth().await {
        metrics::gauge!("artifact_queue_depth").set(depth as f64);
    }
    handle.render()
}
