pub mod artifacts;
pub mod blogs;
pub mod health;
pub mod metrics;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::{middleware, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::app_state::AppState;
use crate::middleware::set_request_context;

const BODY_LIMIT: usize = 1024 * 1024;

/// Build the HTTP router. `/metrics` is mounted only when a Prometheus
/// recorder was installed.
pub fn router(state: AppState, prometheus: Option<Arc<PrometheusHandle>>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health_check))
        .route("/blogs", get(blogs::list_blogs))
        .route("/blogs/{id}", get(blogs::get_blog))
        .route("/download/{id}", get(blogs::download_text))
        .route("/artifacts/{content_id}/start", post(artifacts::start))
        .route(
            "/artifacts/{content_id}/check/{job_id}",
            get(artifacts::check),
        )
        .route(
            "/artifacts/{content_id}/download/{job_id}",
            get(artifacts::download),
        )
        .with_state(state.clone());

    if let Some(handle) = prometheus {
        app = app.route(
            "/metrics",
            get(metrics::prometheus_metrics).with_state((handle, state.queue)),
        );
    }

    // The last layer added runs first.
    app.layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(set_request_context))
}
